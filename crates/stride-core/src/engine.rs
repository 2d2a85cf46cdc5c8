//! Engine facade.
//!
//! Wires the stores and text capabilities into the evaluator, feedback
//! aggregator, and program coordinator, and resolves ids into records for
//! callers that only hold identifiers (the CLI, request handlers).

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinator::{EvaluationCoordinator, RegenerationResult};
use crate::error::EngineError;
use crate::evaluator::{TaskCompletionEvaluator, TaskCompletionResult};
use crate::feedback::FeedbackAggregator;
use crate::language::{negotiate_language, DEFAULT_CANONICAL_LANGUAGE};
use crate::metrics::{compute_program_metrics, ProgramMetrics};
use crate::model::{DomainContext, Program};
use crate::traits::{EvaluationStore, FeedbackGenerator, ProgramStore, TaskStore, Translator};

/// How concurrent program evaluation refreshes are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    #[default]
    LastWriteWins,
    /// Refresh only if the record is unchanged since it was read.
    Optimistic,
}

/// Engine settings, read from the `[engine]` table of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Language whose text fills `feedbackText` and is always materialized.
    pub canonical_language: String,
    pub conflict_resolution: ConflictResolution,
    /// Translate feedback into other languages. When off, only the caller's
    /// language is stored and served.
    pub translate_feedback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            canonical_language: DEFAULT_CANONICAL_LANGUAGE.to_string(),
            conflict_resolution: ConflictResolution::default(),
            translate_feedback: true,
        }
    }
}

/// Entry point for all evaluation operations.
pub struct Engine {
    programs: Arc<dyn ProgramStore>,
    tasks: Arc<dyn TaskStore>,
    feedback: Arc<FeedbackAggregator>,
    evaluator: TaskCompletionEvaluator,
    coordinator: EvaluationCoordinator,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        programs: Arc<dyn ProgramStore>,
        tasks: Arc<dyn TaskStore>,
        evaluations: Arc<dyn EvaluationStore>,
        generator: Arc<dyn FeedbackGenerator>,
        translator: Arc<dyn Translator>,
        config: EngineConfig,
    ) -> Self {
        let feedback = Arc::new(FeedbackAggregator::new(
            generator.clone(),
            translator.clone(),
            tasks.clone(),
            config.canonical_language.clone(),
        ));
        let evaluator = TaskCompletionEvaluator::new(
            tasks.clone(),
            evaluations.clone(),
            feedback.clone(),
            config.canonical_language.clone(),
        );
        let coordinator = EvaluationCoordinator::new(
            programs.clone(),
            tasks.clone(),
            evaluations,
            generator,
            translator,
            config.clone(),
        );

        Self {
            programs,
            tasks,
            feedback,
            evaluator,
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evaluator(&self) -> &TaskCompletionEvaluator {
        &self.evaluator
    }

    pub fn coordinator(&self) -> &EvaluationCoordinator {
        &self.coordinator
    }

    /// Complete a task identified by id on behalf of `user_id`.
    pub async fn complete_task(
        &self,
        task_id: &str,
        user_id: &str,
        accept_language: Option<&str>,
        domain_context: Option<&DomainContext>,
    ) -> Result<TaskCompletionResult, EngineError> {
        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))?;
        let program = self.load_program(&task.program_id).await?;
        let language = negotiate_language(accept_language, &self.config.canonical_language);

        self.evaluator
            .complete_task_with_evaluation(&task, &program, user_id, &language, domain_context)
            .await
    }

    pub async fn complete_program(
        &self,
        program_id: &str,
        user_id: &str,
        accept_language: Option<&str>,
    ) -> Result<RegenerationResult, EngineError> {
        self.coordinator
            .complete_program(program_id, user_id, accept_language)
            .await
    }

    pub async fn regenerate_program_evaluation(
        &self,
        program_id: &str,
        accept_language: Option<&str>,
    ) -> Result<RegenerationResult, EngineError> {
        self.coordinator
            .regenerate_program_evaluation(program_id, accept_language)
            .await
    }

    /// Current metrics for a program, computed from its tasks.
    pub async fn program_metrics(&self, program_id: &str) -> Result<ProgramMetrics, EngineError> {
        let program = self.load_program(program_id).await?;
        let tasks = self.tasks.find_by_program(program_id).await?;
        Ok(compute_program_metrics(&program, &tasks))
    }

    /// Task feedback in the caller's preferred language.
    pub async fn task_feedback(
        &self,
        task_id: &str,
        accept_language: Option<&str>,
        domain_context: Option<&DomainContext>,
    ) -> Result<String, EngineError> {
        let language = negotiate_language(accept_language, &self.config.canonical_language);
        if self.config.translate_feedback {
            return self
                .feedback
                .localized_task_feedback(task_id, &language, domain_context)
                .await;
        }

        let task = self
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))?;
        let summary = task.metadata.evaluation.ok_or_else(|| {
            EngineError::Validation(format!("task {task_id} has not been evaluated"))
        })?;
        Ok(summary
            .feedback_versions
            .get(&language)
            .cloned()
            .unwrap_or(summary.feedback))
    }

    async fn load_program(&self, program_id: &str) -> Result<Program, EngineError> {
        self.programs
            .find_by_id(program_id)
            .await?
            .ok_or_else(|| EngineError::not_found("program", program_id))
    }
}
