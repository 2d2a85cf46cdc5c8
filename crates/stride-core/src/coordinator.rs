//! Program-level evaluation: create on first completion, refresh on
//! regeneration.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::engine::{ConflictResolution, EngineConfig};
use crate::error::EngineError;
use crate::evaluator::{count_passed_attempts, extract_skills_improved};
use crate::feedback::build_learning_journey;
use crate::language::negotiate_language;
use crate::metrics::{compute_program_metrics, ProgramMetrics};
use crate::model::{
    Evaluation, EvaluationType, FeedbackBody, ModeBlock, ModeData, NewEvaluation, Program,
    ProgramStatus, QualitativeFeedback, Task, TaskStatus, MAX_SCORE,
};
use crate::qualitative::{generate_qualitative_feedback, materialize_versions};
use crate::traits::{
    EvaluationStore, FeedbackGenerator, ProgramPatch, ProgramStore, TaskStore, Translator,
    UpsertPolicy,
};

/// Whether a run created the program evaluation or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Created,
    Regenerated,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Regenerated => write!(f, "regenerated"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerationResult {
    pub evaluation_id: String,
    pub outcome: UpsertOutcome,
    pub metrics: ProgramMetrics,
}

/// Builds and persists the single program-level evaluation.
pub struct EvaluationCoordinator {
    programs: Arc<dyn ProgramStore>,
    tasks: Arc<dyn TaskStore>,
    evaluations: Arc<dyn EvaluationStore>,
    generator: Arc<dyn FeedbackGenerator>,
    translator: Arc<dyn Translator>,
    config: EngineConfig,
}

impl EvaluationCoordinator {
    pub fn new(
        programs: Arc<dyn ProgramStore>,
        tasks: Arc<dyn TaskStore>,
        evaluations: Arc<dyn EvaluationStore>,
        generator: Arc<dyn FeedbackGenerator>,
        translator: Arc<dyn Translator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            programs,
            tasks,
            evaluations,
            generator,
            translator,
            config,
        }
    }

    /// Mark a program completed and evaluate it.
    #[instrument(skip(self))]
    pub async fn complete_program(
        &self,
        program_id: &str,
        user_id: &str,
        accept_language: Option<&str>,
    ) -> Result<RegenerationResult, EngineError> {
        if user_id.trim().is_empty() {
            return Err(EngineError::Validation("user id is required".into()));
        }
        let mut program = self.load_program(program_id).await?;
        if program.user_id != user_id {
            return Err(EngineError::not_found("program", program_id));
        }

        if program.status != ProgramStatus::Completed {
            program = self
                .programs
                .update(
                    program_id,
                    ProgramPatch {
                        status: Some(ProgramStatus::Completed),
                        completed_at: Some(Utc::now()),
                        ..Default::default()
                    },
                )
                .await?;
        }

        self.evaluate(program, accept_language).await
    }

    /// Rebuild the program evaluation from current task data.
    ///
    /// Refreshes the stored record through the store's upsert primitive when
    /// one already exists; never creates a second record.
    #[instrument(skip(self))]
    pub async fn regenerate_program_evaluation(
        &self,
        program_id: &str,
        accept_language: Option<&str>,
    ) -> Result<RegenerationResult, EngineError> {
        let program = self.load_program(program_id).await?;
        self.evaluate(program, accept_language).await
    }

    async fn load_program(&self, program_id: &str) -> Result<Program, EngineError> {
        self.programs
            .find_by_id(program_id)
            .await?
            .ok_or_else(|| EngineError::not_found("program", program_id))
    }

    async fn evaluate(
        &self,
        program: Program,
        accept_language: Option<&str>,
    ) -> Result<RegenerationResult, EngineError> {
        let canonical = self.config.canonical_language.as_str();
        let language = negotiate_language(accept_language, canonical);
        let tasks = self.tasks.find_by_program(&program.id).await?;
        let metrics = compute_program_metrics(&program, &tasks);
        let subtype = program.mode.program_subtype();

        let existing = self
            .evaluations
            .find_by_program(&program.id)
            .await?
            .into_iter()
            .find(|e| e.evaluation_subtype == subtype && e.task_id.is_none());

        let feedback = generate_qualitative_feedback(
            self.generator.as_ref(),
            &program,
            &tasks,
            &metrics,
            None,
            &language,
        )
        .await;
        let versions = if self.config.translate_feedback {
            materialize_versions(self.translator.as_ref(), feedback, &language, canonical, None)
                .await
        } else {
            BTreeMap::from([(language.clone(), feedback)])
        };

        let draft = build_program_evaluation(&program, &tasks, &metrics, versions, canonical);
        let score = draft.score;

        let (evaluation, outcome) = match existing {
            None => (self.evaluations.create(draft).await?, UpsertOutcome::Created),
            Some(current) => (
                self.refresh(&program, &subtype, draft, &current).await?,
                UpsertOutcome::Regenerated,
            ),
        };

        let mut patch = ProgramPatch {
            total_xp: Some(metrics.total_xp),
            final_score: Some(score),
            evaluation_id: Some(evaluation.id.clone()),
            language: Some(language),
            ..Default::default()
        };
        if outcome == UpsertOutcome::Regenerated {
            patch.last_regenerated_at = Some(Utc::now());
        }
        self.programs.update(&program.id, patch).await?;

        tracing::info!(
            program_id = %program.id,
            evaluation_id = %evaluation.id,
            %outcome,
            score,
            "program evaluation stored"
        );

        Ok(RegenerationResult {
            evaluation_id: evaluation.id,
            outcome,
            metrics,
        })
    }

    async fn refresh(
        &self,
        program: &Program,
        subtype: &str,
        draft: NewEvaluation,
        current: &Evaluation,
    ) -> Result<Evaluation, EngineError> {
        let policy = match self.config.conflict_resolution {
            ConflictResolution::LastWriteWins => UpsertPolicy::LastWriteWins,
            ConflictResolution::Optimistic => UpsertPolicy::IfVersion(current.version),
        };
        let refreshed = self
            .evaluations
            .upsert(&program.id, subtype, draft, policy)
            .await?;
        Ok(refreshed)
    }
}

fn build_program_evaluation(
    program: &Program,
    tasks: &[Task],
    metrics: &ProgramMetrics,
    versions: BTreeMap<String, QualitativeFeedback>,
    canonical: &str,
) -> NewEvaluation {
    let completed: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();
    let total_attempts = completed
        .iter()
        .map(|t| build_learning_journey(&t.interactions).len() as u32)
        .sum();
    let passed_attempts = completed
        .iter()
        .map(|t| count_passed_attempts(&t.interactions))
        .sum();
    let all_interactions: Vec<_> = completed
        .iter()
        .flat_map(|t| t.interactions.iter().cloned())
        .collect();

    let feedback_text = versions
        .get(canonical)
        .or_else(|| versions.values().next())
        .map(|f| f.overall_assessment.clone())
        .unwrap_or_default();

    NewEvaluation {
        user_id: program.user_id.clone(),
        program_id: program.id.clone(),
        task_id: None,
        mode: program.mode,
        evaluation_type: EvaluationType::Program,
        evaluation_subtype: program.mode.program_subtype(),
        score: metrics.avg_score.min(MAX_SCORE),
        max_score: MAX_SCORE,
        feedback_text,
        feedback_data: versions
            .into_iter()
            .map(|(lang, body)| (lang, FeedbackBody::Qualitative(body)))
            .collect(),
        mode_data: ModeBlock::new(
            program.mode,
            ModeData {
                xp_earned: metrics.total_xp,
                total_attempts,
                passed_attempts,
                skills_improved: extract_skills_improved(&all_interactions),
                created_at: Utc::now(),
                metrics: Some(metrics.clone()),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AiResponse, Interaction, TaskEvaluationSummary};
    use crate::store::InMemoryStore;
    use crate::testing::{
        fixture_program, fixture_task, ts, CreateOnlyEvaluations, EchoTranslator,
        FailingTranslator, ScriptedGenerator,
    };

    const REPLY: &str = r#"{"overallAssessment": "Solid finish", "careerAlignment": "Good fit",
        "strengths": ["Rigor"], "growthAreas": ["Speed"], "nextSteps": ["Practice"]}"#;

    fn completed_task(id: &str, score: u32) -> Task {
        let mut task = fixture_task(id, "p1", TaskStatus::Completed);
        task.interactions = vec![
            Interaction::user_input("answer", ts(60)),
            Interaction::ai_response(
                AiResponse {
                    completed: true,
                    xp_earned: score,
                    skills_improved: vec!["sql".into()],
                    ..Default::default()
                },
                ts(120),
            )
            .with_time_spent(90),
        ];
        task.metadata.completed_at = Some(ts(120));
        task.metadata.evaluation = Some(TaskEvaluationSummary {
            evaluation_id: format!("e-{id}"),
            score,
            actual_xp: score,
            feedback: "ok".into(),
            feedback_versions: Default::default(),
            evaluated_at: ts(120),
        });
        task
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.insert_program(fixture_program("p1", "u1")).await;
        store.insert_task(completed_task("t1", 85)).await;
        store.insert_task(completed_task("t2", 90)).await;
        store
    }

    fn coordinator(
        store: &Arc<InMemoryStore>,
        evaluations: Arc<dyn EvaluationStore>,
        generator: Arc<dyn FeedbackGenerator>,
        translator: Arc<dyn Translator>,
        config: EngineConfig,
    ) -> EvaluationCoordinator {
        EvaluationCoordinator::new(
            store.clone(),
            store.clone(),
            evaluations,
            generator,
            translator,
            config,
        )
    }

    fn default_coordinator(store: &Arc<InMemoryStore>) -> EvaluationCoordinator {
        coordinator(
            store,
            store.clone(),
            Arc::new(ScriptedGenerator::replying(REPLY)),
            Arc::new(EchoTranslator::default()),
            EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn first_run_creates_evaluation() {
        let store = seeded_store().await;
        let result = default_coordinator(&store)
            .regenerate_program_evaluation("p1", None)
            .await
            .unwrap();

        assert_eq!(result.outcome, UpsertOutcome::Created);
        assert_eq!(result.metrics.avg_score, 88);
        assert_eq!(result.metrics.total_xp, 175);
        assert_eq!(store.create_calls(), 1);

        let program = store.program("p1").await.unwrap();
        assert_eq!(program.metadata.evaluation_id.as_deref(), Some(result.evaluation_id.as_str()));
        assert_eq!(program.metadata.total_xp, 175);
        assert_eq!(program.metadata.final_score, 88);
        assert!(program.metadata.last_regenerated_at.is_none());

        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].feedback_text, "Solid finish");
        assert_eq!(stored[0].evaluation_subtype, "discovery_complete");
        let data = stored[0].mode_data.data();
        assert_eq!(data.total_attempts, 2);
        assert_eq!(data.passed_attempts, 2);
        assert_eq!(data.skills_improved, vec!["sql".to_string()]);
        assert_eq!(data.metrics.as_ref().unwrap().completed_tasks, 2);
    }

    #[tokio::test]
    async fn regenerate_refreshes_without_create() {
        let store = seeded_store().await;
        let coordinator = default_coordinator(&store);
        let first = coordinator
            .regenerate_program_evaluation("p1", None)
            .await
            .unwrap();

        store.insert_task(completed_task("t3", 100)).await;
        let second = coordinator
            .regenerate_program_evaluation("p1", None)
            .await
            .unwrap();

        assert_eq!(second.outcome, UpsertOutcome::Regenerated);
        assert_eq!(second.evaluation_id, first.evaluation_id);
        assert_eq!(store.create_calls(), 1);
        assert_eq!(store.upsert_calls(), 1);

        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].version, 2);
        assert_eq!(stored[0].score, 92);

        let program = store.program("p1").await.unwrap();
        assert_eq!(program.metadata.final_score, 92);
        assert!(program.metadata.last_regenerated_at.is_some());
    }

    #[tokio::test]
    async fn store_without_upsert_is_reported() {
        let store = seeded_store().await;
        let coordinator = coordinator(
            &store,
            Arc::new(CreateOnlyEvaluations(store.clone())),
            Arc::new(ScriptedGenerator::replying(REPLY)),
            Arc::new(EchoTranslator::default()),
            EngineConfig::default(),
        );

        let first = coordinator.regenerate_program_evaluation("p1", None).await;
        assert_eq!(first.unwrap().outcome, UpsertOutcome::Created);

        let err = coordinator
            .regenerate_program_evaluation("p1", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedOperation(_)));
        assert_eq!(store.create_calls(), 1);
    }

    #[tokio::test]
    async fn optimistic_policy_passes_read_version() {
        let store = seeded_store().await;
        let config = EngineConfig {
            conflict_resolution: ConflictResolution::Optimistic,
            ..Default::default()
        };
        let coordinator = coordinator(
            &store,
            store.clone(),
            Arc::new(ScriptedGenerator::replying(REPLY)),
            Arc::new(EchoTranslator::default()),
            config,
        );

        coordinator.regenerate_program_evaluation("p1", None).await.unwrap();
        coordinator.regenerate_program_evaluation("p1", None).await.unwrap();
        coordinator.regenerate_program_evaluation("p1", None).await.unwrap();

        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        assert_eq!(stored[0].version, 3);
    }

    #[tokio::test]
    async fn generator_failure_still_persists() {
        let store = seeded_store().await;
        let coordinator = coordinator(
            &store,
            store.clone(),
            Arc::new(ScriptedGenerator::failing("timeout")),
            Arc::new(EchoTranslator::default()),
            EngineConfig::default(),
        );

        let result = coordinator
            .regenerate_program_evaluation("p1", Some("fr-FR,fr;q=0.9"))
            .await
            .unwrap();
        assert_eq!(result.outcome, UpsertOutcome::Created);

        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        assert_eq!(stored[0].feedback_text, "");
        assert_eq!(
            stored[0].feedback_data.get("fr"),
            Some(&FeedbackBody::Qualitative(QualitativeFeedback::default()))
        );
    }

    #[tokio::test]
    async fn non_canonical_language_stores_both_versions() {
        let store = seeded_store().await;
        let coordinator = coordinator(
            &store,
            store.clone(),
            Arc::new(ScriptedGenerator::replying(REPLY)),
            Arc::new(FailingTranslator::on_text_containing("Rigor")),
            EngineConfig::default(),
        );

        coordinator
            .regenerate_program_evaluation("p1", Some("ja,en;q=0.5"))
            .await
            .unwrap();

        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        let evaluation = &stored[0];
        assert_eq!(evaluation.feedback_text, "[en] Solid finish");
        let Some(FeedbackBody::Qualitative(en)) = evaluation.feedback_data.get("en") else {
            panic!("missing canonical version");
        };
        assert_eq!(en.strengths, vec!["Rigor".to_string()]);
        assert_eq!(en.next_steps, vec!["[en] Practice".to_string()]);
        let Some(FeedbackBody::Qualitative(ja)) = evaluation.feedback_data.get("ja") else {
            panic!("missing caller version");
        };
        assert_eq!(ja.overall_assessment, "Solid finish");
        assert_eq!(
            store.program("p1").await.unwrap().metadata.language.as_deref(),
            Some("ja")
        );
    }

    #[tokio::test]
    async fn translation_toggle_skips_translator() {
        let store = seeded_store().await;
        let translator = Arc::new(EchoTranslator::default());
        let config = EngineConfig {
            translate_feedback: false,
            ..Default::default()
        };
        let coordinator = coordinator(
            &store,
            store.clone(),
            Arc::new(ScriptedGenerator::replying(REPLY)),
            translator.clone(),
            config,
        );

        coordinator
            .regenerate_program_evaluation("p1", Some("ko"))
            .await
            .unwrap();

        assert_eq!(translator.call_count(), 0);
        let stored = EvaluationStore::find_by_program(store.as_ref(), "p1").await.unwrap();
        assert_eq!(stored[0].feedback_data.len(), 1);
        assert_eq!(stored[0].feedback_text, "Solid finish");
    }

    #[tokio::test]
    async fn complete_program_checks_owner_and_marks_completed() {
        let store = seeded_store().await;
        let coordinator = default_coordinator(&store);

        let err = coordinator
            .complete_program("p1", "someone-else", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "program", .. }));
        assert!(matches!(
            coordinator.complete_program("p1", " ", None).await,
            Err(EngineError::Validation(_))
        ));

        let result = coordinator.complete_program("p1", "u1", None).await.unwrap();
        assert_eq!(result.outcome, UpsertOutcome::Created);
        let program = store.program("p1").await.unwrap();
        assert_eq!(program.status, ProgramStatus::Completed);
        assert!(program.metadata.completed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_program_is_not_found() {
        let store = seeded_store().await;
        let err = default_coordinator(&store)
            .regenerate_program_evaluation("missing", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "program", .. }));
    }
}
