//! Test doubles and fixtures shared by the unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;
use crate::model::{
    DomainContext, Evaluation, Mode, NewEvaluation, Program, ProgramMetadata, ProgramStatus, Task,
    TaskMetadata, TaskStatus,
};
use crate::store::InMemoryStore;
use crate::traits::{EvaluationStore, FeedbackGenerator, GeneratedMessage, Translator};

/// Fixed base time plus `secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    "2026-03-02T09:00:00Z".parse::<DateTime<Utc>>().unwrap() + Duration::seconds(secs)
}

pub fn fixture_program(id: &str, user_id: &str) -> Program {
    Program {
        id: id.into(),
        user_id: user_id.into(),
        scenario_id: "data-analyst".into(),
        mode: Mode::Discovery,
        status: ProgramStatus::Active,
        created_at: Some(ts(0)),
        started_at: None,
        metadata: ProgramMetadata::default(),
    }
}

pub fn fixture_task(id: &str, program_id: &str, status: TaskStatus) -> Task {
    Task {
        id: id.into(),
        program_id: program_id.into(),
        title: format!("Task {id}"),
        status,
        interactions: vec![],
        metadata: TaskMetadata::default(),
    }
}

/// Generator that replies with fixed text or fails.
pub struct ScriptedGenerator {
    reply: Result<String, String>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Self {
        Self::with(Ok(text.to_string()))
    }

    pub fn failing(error: &str) -> Self {
        Self::with(Err(error.to_string()))
    }

    fn with(reply: Result<String, String>) -> Self {
        Self {
            reply,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl FeedbackGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn send_message(&self, prompt: &str) -> anyhow::Result<GeneratedMessage> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.reply {
            Ok(text) => Ok(GeneratedMessage {
                content: text.clone(),
            }),
            Err(e) => Err(anyhow::anyhow!("{e}")),
        }
    }
}

/// Translator that prefixes the text with the target language.
#[derive(Default)]
pub struct EchoTranslator {
    calls: AtomicU32,
}

impl EchoTranslator {
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate_feedback(
        &self,
        text: &str,
        target_language: &str,
        _domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(format!("[{target_language}] {text}"))
    }
}

/// Translator that fails for every text, or only for texts containing a marker.
pub struct FailingTranslator {
    marker: Option<String>,
}

impl FailingTranslator {
    pub fn always() -> Self {
        Self { marker: None }
    }

    pub fn on_text_containing(marker: &str) -> Self {
        Self {
            marker: Some(marker.to_string()),
        }
    }
}

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate_feedback(
        &self,
        text: &str,
        target_language: &str,
        _domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String> {
        match &self.marker {
            Some(marker) if !text.contains(marker.as_str()) => {
                Ok(format!("[{target_language}] {text}"))
            }
            _ => anyhow::bail!("translation backend unavailable"),
        }
    }
}

/// Evaluation store that only supports create, delegating to an in-memory store.
pub struct CreateOnlyEvaluations(pub Arc<InMemoryStore>);

#[async_trait]
impl EvaluationStore for CreateOnlyEvaluations {
    async fn find_by_program(&self, program_id: &str) -> Result<Vec<Evaluation>, StoreError> {
        EvaluationStore::find_by_program(self.0.as_ref(), program_id).await
    }

    async fn create(&self, input: NewEvaluation) -> Result<Evaluation, StoreError> {
        self.0.create(input).await
    }
}
