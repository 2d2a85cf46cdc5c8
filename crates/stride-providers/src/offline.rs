//! Stand-ins used when no backend is configured.
//!
//! Both always fail, so the engine serves its fallback content: canned task
//! feedback, empty qualitative feedback, and untranslated text.

use async_trait::async_trait;

use stride_core::model::DomainContext;
use stride_core::traits::{FeedbackGenerator, GeneratedMessage, Translator};

use crate::error::ProviderError;

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

#[async_trait]
impl FeedbackGenerator for OfflineGenerator {
    fn name(&self) -> &str {
        "offline"
    }

    async fn send_message(&self, _prompt: &str) -> anyhow::Result<GeneratedMessage> {
        Err(ProviderError::NotConfigured("feedback generator").into())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineTranslator;

#[async_trait]
impl Translator for OfflineTranslator {
    async fn translate_feedback(
        &self,
        _text: &str,
        _target_language: &str,
        _domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String> {
        Err(ProviderError::NotConfigured("translator").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_backends_always_fail() {
        let err = OfflineGenerator.send_message("hi").await.unwrap_err();
        assert_eq!(err.to_string(), "no feedback generator backend configured");
        assert!(OfflineTranslator
            .translate_feedback("hi", "ja", None)
            .await
            .is_err());
    }
}
