//! Prompt-based translation on top of any generator.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::instrument;

use stride_core::language::language_name;
use stride_core::model::DomainContext;
use stride_core::traits::{FeedbackGenerator, Translator};

use crate::error::ProviderError;

/// Translates feedback by asking a generator for a faithful rendering.
pub struct PromptTranslator {
    generator: Arc<dyn FeedbackGenerator>,
}

impl PromptTranslator {
    pub fn new(generator: Arc<dyn FeedbackGenerator>) -> Self {
        Self { generator }
    }
}

fn build_translation_prompt(
    text: &str,
    target_language: &str,
    domain_context: Option<&DomainContext>,
) -> String {
    let mut prompt = format!(
        "Translate the following learning feedback into {}.\n\
         Keep the Markdown structure, numbers, and any skill names intact. \
         Return only the translation.\n",
        language_name(target_language)
    );
    if let Some(ctx) = domain_context.filter(|c| !c.title.is_empty()) {
        prompt.push_str(&format!(
            "The feedback concerns the field of {}; use its standard terminology.\n",
            ctx.title
        ));
    }
    prompt.push_str("\n---\n");
    prompt.push_str(text);
    prompt
}

#[async_trait]
impl Translator for PromptTranslator {
    #[instrument(skip(self, text, domain_context), fields(generator = self.generator.name()))]
    async fn translate_feedback(
        &self,
        text: &str,
        target_language: &str,
        domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String> {
        let prompt = build_translation_prompt(text, target_language, domain_context);
        let response = self.generator.send_message(&prompt).await?;
        let translated = response.content.trim();
        if translated.is_empty() {
            return Err(ProviderError::EmptyResponse("translator").into());
        }
        Ok(translated.to_string())
    }
}
