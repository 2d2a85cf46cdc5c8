//! Mock generator and translator for testing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use stride_core::model::DomainContext;
use stride_core::traits::{FeedbackGenerator, GeneratedMessage, Translator};

/// A mock generator for exercising the engine without real API calls.
///
/// Returns configurable responses based on prompt content matching.
pub struct MockGenerator {
    /// Map of prompt substring → response text.
    responses: HashMap<String, String>,
    /// Default response if no prompt matches.
    default_response: String,
    /// When set, every call fails with this message.
    failure: Option<String>,
    call_count: AtomicU32,
    last_prompt: Mutex<Option<String>>,
}

impl MockGenerator {
    /// Create a mock with the given prompt→response mappings.
    pub fn new(responses: HashMap<String, String>) -> Self {
        Self {
            responses,
            default_response: "Well done. Keep building on this progress.".to_string(),
            failure: None,
            call_count: AtomicU32::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            default_response: response.to_string(),
            ..Self::new(HashMap::new())
        }
    }

    /// Create a mock whose every call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(HashMap::new())
        }
    }

    /// Number of calls made to this generator.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The last prompt received.
    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl FeedbackGenerator for MockGenerator {
    fn name(&self) -> &str {
        "mock"
    }

    async fn send_message(&self, prompt: &str) -> anyhow::Result<GeneratedMessage> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_prompt.lock().unwrap_or_else(|e| e.into_inner()) = Some(prompt.to_string());

        if let Some(message) = &self.failure {
            anyhow::bail!("{message}");
        }

        let content = self
            .responses
            .iter()
            .find(|(key, _)| prompt.contains(key.as_str()))
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(GeneratedMessage { content })
    }
}

/// A mock translator that tags text with the target language.
///
/// `"Good"` translated to `ja` becomes `"[ja] Good"`.
#[derive(Default)]
pub struct MockTranslator {
    /// Texts containing this marker fail to translate.
    fail_on: Option<String>,
    call_count: AtomicU32,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail for any text containing `marker`.
    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_on: Some(marker.to_string()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate_feedback(
        &self,
        text: &str,
        target_language: &str,
        _domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(marker) = &self.fail_on {
            if text.contains(marker.as_str()) {
                anyhow::bail!("mock translation failure");
            }
        }
        Ok(format!("[{target_language}] {text}"))
    }
}
