//! End-to-end pipeline tests: task completion through program regeneration,
//! with mock text capabilities over the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use stride_core::coordinator::UpsertOutcome;
use stride_core::engine::{Engine, EngineConfig};
use stride_core::error::EngineError;
use stride_core::model::{
    AiResponse, FeedbackBody, Interaction, Mode, Program, ProgramMetadata, ProgramStatus, Task,
    TaskMetadata, TaskStatus,
};
use stride_core::store::InMemoryStore;
use stride_core::traits::EvaluationStore;
use stride_providers::mock::{MockGenerator, MockTranslator};

const PROGRAM_REPLY: &str = r#"```json
{
  "overallAssessment": "プログラムを最後までやり遂げました",
  "careerAlignment": "データ分析職に向いています",
  "strengths": ["粘り強さ"],
  "growthAreas": ["可視化"],
  "nextSteps": ["ダッシュボードを作る"]
}
```"#;

fn attempt(answer: &str, completed: bool, xp: u32, skills: &[&str], minute: i64) -> [Interaction; 2] {
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap() + Duration::minutes(minute);
    [
        Interaction::user_input(answer, at),
        Interaction::ai_response(
            AiResponse {
                completed,
                xp_earned: xp,
                skills_improved: skills.iter().map(|s| s.to_string()).collect(),
                feedback: format!("feedback for {answer}"),
                ..Default::default()
            },
            at + Duration::minutes(1),
        )
        .with_time_spent(120),
    ]
}

async fn seed(store: &InMemoryStore) {
    store
        .insert_program(Program {
            id: "p1".into(),
            user_id: "u1".into(),
            scenario_id: "data-analyst".into(),
            mode: Mode::Pbl,
            status: ProgramStatus::Active,
            created_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()),
            started_at: None,
            metadata: ProgramMetadata::default(),
        })
        .await;

    let mut interactions = Vec::new();
    interactions.extend(attempt("first", true, 60, &["sql"], 0));
    interactions.extend(attempt("second", true, 85, &["sql", "joins"], 10));
    interactions.extend(attempt("third", false, 95, &["charts"], 20));
    store
        .insert_task(Task {
            id: "t1".into(),
            program_id: "p1".into(),
            title: "Join the sales tables".into(),
            status: TaskStatus::Active,
            interactions,
            metadata: TaskMetadata::default(),
        })
        .await;

    store
        .insert_task(Task {
            id: "t2".into(),
            program_id: "p1".into(),
            title: "Chart quarterly revenue".into(),
            status: TaskStatus::Active,
            interactions: attempt("bars", true, 90, &["charts"], 30).to_vec(),
            metadata: TaskMetadata::default(),
        })
        .await;
}

fn engine(store: &Arc<InMemoryStore>, generator: Arc<MockGenerator>, translator: Arc<MockTranslator>) -> Engine {
    Engine::new(
        store.clone(),
        store.clone(),
        store.clone(),
        generator,
        translator,
        EngineConfig::default(),
    )
}

fn program_generator() -> Arc<MockGenerator> {
    let mut responses = HashMap::new();
    responses.insert("Respond with a single JSON object".to_string(), PROGRAM_REPLY.to_string());
    Arc::new(MockGenerator::new(responses))
}

#[tokio::test]
async fn best_of_scoring_with_statistics_footer() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let generator = program_generator();
    let engine = engine(&store, generator.clone(), Arc::new(MockTranslator::new()));

    let result = engine.complete_task("t1", "u1", None, None).await.unwrap();

    assert_eq!(result.xp_earned, 85);
    assert_eq!(result.evaluation.score, 85);
    assert_eq!(result.evaluation.mode_data.data().passed_attempts, 2);
    assert_eq!(result.evaluation.mode_data.data().total_attempts, 3);
    assert_eq!(
        result.evaluation.mode_data.data().skills_improved,
        vec!["sql", "joins", "charts"]
    );
    assert!(result.feedback.contains("- Total attempts: 3"));
    assert!(result.feedback.contains("- Best score: 85/100"));
    assert!(result.feedback.contains("**Skills practiced**: sql, joins, charts"));
    assert_eq!(generator.call_count(), 1);

    let prompt = generator.last_prompt().unwrap();
    assert!(prompt.contains("Attempt 3 (not passed, 95 XP)"));

    let task = store.task("t1").await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.metadata.evaluation.unwrap().actual_xp, 85);
}

#[tokio::test]
async fn full_program_lifecycle_in_japanese() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let translator = Arc::new(MockTranslator::failing_on("可視化"));
    let engine = engine(&store, program_generator(), translator.clone());

    engine.complete_task("t1", "u1", Some("ja"), None).await.unwrap();
    engine.complete_task("t2", "u1", Some("ja"), None).await.unwrap();

    let created = engine
        .complete_program("p1", "u1", Some("ja,en;q=0.8"))
        .await
        .unwrap();
    assert_eq!(created.outcome, UpsertOutcome::Created);
    assert_eq!(created.metrics.total_xp, 175);
    assert_eq!(created.metrics.avg_score, 88);
    assert_eq!(created.metrics.time_spent_seconds, 480);

    let evaluations = EvaluationStore::find_by_program(store.as_ref(), "p1")
        .await
        .unwrap();
    let program_eval = evaluations
        .iter()
        .find(|e| e.evaluation_subtype == "pbl_complete")
        .unwrap();
    assert_eq!(program_eval.feedback_text, "[en] プログラムを最後までやり遂げました");
    let Some(FeedbackBody::Qualitative(en)) = program_eval.feedback_data.get("en") else {
        panic!("canonical version missing");
    };
    // The failed field keeps its original text.
    assert_eq!(en.growth_areas, vec!["可視化"]);
    assert_eq!(en.strengths, vec!["[en] 粘り強さ"]);
    assert!(matches!(
        program_eval.feedback_data.get("ja"),
        Some(FeedbackBody::Qualitative(ja)) if ja.next_steps == vec!["ダッシュボードを作る"]
    ));

    let regenerated = engine
        .regenerate_program_evaluation("p1", Some("ja"))
        .await
        .unwrap();
    assert_eq!(regenerated.outcome, UpsertOutcome::Regenerated);
    assert_eq!(regenerated.evaluation_id, created.evaluation_id);
    assert_eq!(store.create_calls(), 3);
    assert_eq!(store.upsert_calls(), 1);

    let program = store.program("p1").await.unwrap();
    assert_eq!(program.status, ProgramStatus::Completed);
    assert_eq!(program.metadata.evaluation_id, Some(created.evaluation_id));
    assert_eq!(program.metadata.language.as_deref(), Some("ja"));
    assert!(program.metadata.last_regenerated_at.is_some());
}

#[tokio::test]
async fn generator_outage_still_persists_everything() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let engine = engine(
        &store,
        Arc::new(MockGenerator::failing("service unavailable")),
        Arc::new(MockTranslator::new()),
    );

    let result = engine.complete_task("t2", "u1", Some("de"), None).await.unwrap();
    assert!(result.feedback.starts_with("Großartig"));
    assert_eq!(result.xp_earned, 90);

    let outcome = engine.regenerate_program_evaluation("p1", None).await.unwrap();
    assert_eq!(outcome.outcome, UpsertOutcome::Created);
    assert_eq!(outcome.metrics.completed_tasks, 1);
}

#[tokio::test]
async fn store_failure_propagates_as_persistence() {
    let store = Arc::new(InMemoryStore::new());
    seed(&store).await;
    let engine = engine(&store, program_generator(), Arc::new(MockTranslator::new()));

    store.fail_next_create("disk full");
    let err = engine.complete_task("t1", "u1", None, None).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(ref m) if m.contains("disk full")));
    assert_eq!(store.task("t1").await.unwrap().status, TaskStatus::Active);

    engine.complete_task("t1", "u1", None, None).await.unwrap();
}
