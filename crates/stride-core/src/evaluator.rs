//! Task completion: pass detection, best-of scoring, and evaluation records.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::EngineError;
use crate::feedback::{build_learning_journey, fallback_message, FeedbackAggregator};
use crate::language::normalize_language;
use crate::model::{
    DomainContext, Evaluation, EvaluationType, FeedbackBody, Interaction, ModeBlock, ModeData,
    NewEvaluation, Program, Task, TaskEvaluationSummary, TaskStatus, MAX_SCORE,
};
use crate::traits::{EvaluationStore, TaskPatch, TaskStore};

/// XP credited when a task is completed without any passing attempt.
pub const DEFAULT_BEST_XP: u32 = 100;

/// True iff at least one AI response marked the task as completed.
pub fn has_task_passed(task: &Task) -> bool {
    task.responses().any(|r| r.completed)
}

/// Highest XP among passing responses, or [`DEFAULT_BEST_XP`] if none passed.
pub fn find_best_xp_earned(interactions: &[Interaction]) -> u32 {
    interactions
        .iter()
        .filter_map(Interaction::response)
        .filter(|r| r.completed)
        .map(|r| r.xp_earned)
        .max()
        .unwrap_or(DEFAULT_BEST_XP)
}

/// Number of passing AI responses.
pub fn count_passed_attempts(interactions: &[Interaction]) -> u32 {
    interactions
        .iter()
        .filter_map(Interaction::response)
        .filter(|r| r.completed)
        .count() as u32
}

/// Union of improved skills across all responses, first-seen order.
pub fn extract_skills_improved(interactions: &[Interaction]) -> Vec<String> {
    let mut skills: Vec<String> = Vec::new();
    for skill in interactions
        .iter()
        .filter_map(Interaction::response)
        .flat_map(|r| r.skills_improved.iter())
    {
        if !skills.contains(skill) {
            skills.push(skill.clone());
        }
    }
    skills
}

/// Outcome of completing a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCompletionResult {
    pub evaluation: Evaluation,
    #[serde(rename = "xpEarned")]
    pub xp_earned: u32,
    pub feedback: String,
    pub feedback_versions: BTreeMap<String, String>,
}

/// Scores a task from its interactions and records the evaluation.
pub struct TaskCompletionEvaluator {
    tasks: Arc<dyn TaskStore>,
    evaluations: Arc<dyn EvaluationStore>,
    feedback: Arc<FeedbackAggregator>,
    canonical_language: String,
}

impl TaskCompletionEvaluator {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        evaluations: Arc<dyn EvaluationStore>,
        feedback: Arc<FeedbackAggregator>,
        canonical_language: impl Into<String>,
    ) -> Self {
        Self {
            tasks,
            evaluations,
            feedback,
            canonical_language: canonical_language.into(),
        }
    }

    /// Complete a task and persist its evaluation.
    ///
    /// Feedback generation failures fall back to canned text; store failures
    /// propagate. Completing an already-evaluated task returns the stored
    /// evaluation unchanged.
    #[instrument(skip_all, fields(task_id = %task.id, program_id = %program.id))]
    pub async fn complete_task_with_evaluation(
        &self,
        task: &Task,
        program: &Program,
        user_id: &str,
        language: &str,
        domain_context: Option<&DomainContext>,
    ) -> Result<TaskCompletionResult, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("user id is required".into()));
        }
        if task.program_id != program.id {
            return Err(EngineError::not_found("task", &task.id));
        }
        if program.user_id != user_id {
            return Err(EngineError::not_found("program", &program.id));
        }

        let subtype = program.mode.task_subtype();
        let existing = self
            .evaluations
            .find_by_program(&program.id)
            .await?
            .into_iter()
            .find(|e| e.task_id.as_deref() == Some(task.id.as_str()) && e.evaluation_subtype == subtype);

        if let (TaskStatus::Completed, Some(summary)) = (task.status, &task.metadata.evaluation) {
            let evaluation = existing
                .filter(|e| e.id == summary.evaluation_id)
                .ok_or_else(|| EngineError::not_found("evaluation", &summary.evaluation_id))?;
            tracing::info!("task already completed, returning stored evaluation");
            return Ok(TaskCompletionResult {
                evaluation,
                xp_earned: summary.actual_xp,
                feedback: summary.feedback.clone(),
                feedback_versions: summary.feedback_versions.clone(),
            });
        }
        if task.status == TaskStatus::Pending {
            return Err(EngineError::Validation(format!(
                "task {} has not been started",
                task.id
            )));
        }

        let language = normalize_language(language, &self.canonical_language);
        let best_xp = find_best_xp_earned(&task.interactions);
        let passed_attempts = count_passed_attempts(&task.interactions);
        let skills_improved = extract_skills_improved(&task.interactions);
        let total_attempts = build_learning_journey(&task.interactions).len() as u32;

        let feedback = match self
            .feedback
            .generate_comprehensive_feedback(task, program, domain_context, &language)
            .await
        {
            Ok(generated) => generated.feedback,
            Err(e) => {
                let err = EngineError::external("task feedback", &e);
                tracing::warn!("{err}; using fallback message");
                fallback_message(&language).to_string()
            }
        };

        let feedback_versions = BTreeMap::from([(language.clone(), feedback.clone())]);

        let evaluation = match existing {
            // A previous run persisted the evaluation but never updated the task.
            Some(evaluation) => evaluation,
            None => {
                let now = Utc::now();
                self.evaluations
                    .create(NewEvaluation {
                        user_id: user_id.to_string(),
                        program_id: program.id.clone(),
                        task_id: Some(task.id.clone()),
                        mode: program.mode,
                        evaluation_type: EvaluationType::Task,
                        evaluation_subtype: subtype,
                        score: best_xp.min(MAX_SCORE),
                        max_score: MAX_SCORE,
                        feedback_text: feedback.clone(),
                        feedback_data: feedback_versions
                            .iter()
                            .map(|(lang, text)| (lang.clone(), FeedbackBody::Text(text.clone())))
                            .collect(),
                        mode_data: ModeBlock::new(
                            program.mode,
                            ModeData {
                                xp_earned: best_xp,
                                total_attempts,
                                passed_attempts,
                                skills_improved,
                                created_at: now,
                                metrics: None,
                            },
                        ),
                    })
                    .await?
            }
        };

        let evaluated_at = Utc::now();
        let mut patch = TaskPatch {
            evaluation: Some(TaskEvaluationSummary {
                evaluation_id: evaluation.id.clone(),
                score: evaluation.score,
                actual_xp: best_xp,
                feedback: feedback.clone(),
                feedback_versions: feedback_versions.clone(),
                evaluated_at,
            }),
            ..Default::default()
        };
        if task.status.can_transition_to(TaskStatus::Completed) {
            patch.status = Some(TaskStatus::Completed);
            patch.completed_at = Some(evaluated_at);
        }
        self.tasks.update(&task.id, patch).await?;

        tracing::info!(
            evaluation_id = %evaluation.id,
            score = evaluation.score,
            passed_attempts,
            "task completed"
        );

        Ok(TaskCompletionResult {
            evaluation,
            xp_earned: best_xp,
            feedback,
            feedback_versions,
        })
    }
}
