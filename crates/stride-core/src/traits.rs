//! Capability traits the engine consumes.
//!
//! Stores are implemented by the persistence layer (see [`crate::store`] for
//! the in-memory reference implementation); the feedback generator and
//! translator are implemented by the `stride-providers` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{
    DomainContext, Evaluation, NewEvaluation, Program, ProgramStatus, Task, TaskEvaluationSummary,
    TaskStatus,
};

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

/// Partial update for a program. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProgramPatch {
    pub status: Option<ProgramStatus>,
    pub total_xp: Option<u32>,
    pub final_score: Option<u32>,
    pub evaluation_id: Option<String>,
    pub language: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_regenerated_at: Option<DateTime<Utc>>,
}

impl ProgramPatch {
    /// Apply this patch to a program in place.
    pub fn apply(self, program: &mut Program) {
        if let Some(status) = self.status {
            program.status = status;
        }
        let meta = &mut program.metadata;
        if let Some(v) = self.total_xp {
            meta.total_xp = v;
        }
        if let Some(v) = self.final_score {
            meta.final_score = v;
        }
        if let Some(v) = self.evaluation_id {
            meta.evaluation_id = Some(v);
        }
        if let Some(v) = self.language {
            meta.language = Some(v);
        }
        if let Some(v) = self.completed_at {
            meta.completed_at = Some(v);
        }
        if let Some(v) = self.last_regenerated_at {
            meta.last_regenerated_at = Some(v);
        }
    }
}

/// Partial update for a task. Interactions are append-only and never patched.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub completed_at: Option<DateTime<Utc>>,
    pub evaluation: Option<TaskEvaluationSummary>,
}

impl TaskPatch {
    /// Apply this patch to a task in place.
    pub fn apply(self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(v) = self.completed_at {
            task.metadata.completed_at = Some(v);
        }
        if let Some(v) = self.evaluation {
            task.metadata.evaluation = Some(v);
        }
    }
}

#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Program>, StoreError>;

    async fn update(&self, id: &str, patch: ProgramPatch) -> Result<Program, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, StoreError>;

    /// All tasks of a program, in creation order.
    async fn find_by_program(&self, program_id: &str) -> Result<Vec<Task>, StoreError>;

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError>;
}

/// How an upsert resolves a concurrent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertPolicy {
    /// The latest write replaces whatever is stored.
    #[default]
    LastWriteWins,
    /// Only write if the stored version still equals the one read.
    IfVersion(u32),
}

#[async_trait]
pub trait EvaluationStore: Send + Sync {
    async fn find_by_program(&self, program_id: &str) -> Result<Vec<Evaluation>, StoreError>;

    async fn create(&self, input: NewEvaluation) -> Result<Evaluation, StoreError>;

    /// Create or refresh the evaluation identified by (program, subtype).
    ///
    /// Stores that cannot update records keep this default.
    async fn upsert(
        &self,
        program_id: &str,
        subtype: &str,
        input: NewEvaluation,
        policy: UpsertPolicy,
    ) -> Result<Evaluation, StoreError> {
        let _ = (program_id, subtype, input, policy);
        Err(StoreError::Unsupported("evaluation upsert"))
    }
}

// ---------------------------------------------------------------------------
// Text generation
// ---------------------------------------------------------------------------

/// Response from the natural-language feedback generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedMessage {
    pub content: String,
}

/// Opaque natural-language generation capability.
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    /// Human-readable backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send a single prompt and return the generated text.
    async fn send_message(&self, prompt: &str) -> anyhow::Result<GeneratedMessage>;
}

/// Feedback translation capability.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate feedback text into `target_language` (a normalized code).
    async fn translate_feedback(
        &self,
        text: &str,
        target_language: &str,
        domain_context: Option<&DomainContext>,
    ) -> anyhow::Result<String>;
}
