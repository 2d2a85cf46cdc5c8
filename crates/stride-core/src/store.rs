//! In-memory store implementation with JSON snapshot persistence.
//!
//! Implements all three store traits behind one lock-protected snapshot.
//! Used by the CLI (load snapshot → run pipeline → save snapshot) and by tests.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Evaluation, NewEvaluation, Program, Task};
use crate::traits::{
    EvaluationStore, ProgramPatch, ProgramStore, TaskPatch, TaskStore, UpsertPolicy,
};

/// Serializable contents of a store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub programs: Vec<Program>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
}

impl Snapshot {
    /// Save the snapshot as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize snapshot")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write snapshot to {}", path.display()))?;
        Ok(())
    }

    /// Load a snapshot from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read snapshot from {}", path.display()))?;
        serde_json::from_str(&content).context("failed to parse snapshot JSON")
    }
}

/// Store backed by an in-memory [`Snapshot`].
///
/// Enforces one evaluation per (program, subtype, task).
pub struct InMemoryStore {
    data: RwLock<Snapshot>,
    #[cfg(any(test, feature = "test-util"))]
    hooks: hooks::TestHooks,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::from_snapshot(Snapshot::default())
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            data: RwLock::new(snapshot),
            #[cfg(any(test, feature = "test-util"))]
            hooks: hooks::TestHooks::default(),
        }
    }

    /// Copy of the current contents.
    pub async fn snapshot(&self) -> Snapshot {
        self.data.read().await.clone()
    }

    pub async fn insert_program(&self, program: Program) {
        let mut data = self.data.write().await;
        data.programs.retain(|p| p.id != program.id);
        data.programs.push(program);
    }

    pub async fn insert_task(&self, task: Task) {
        let mut data = self.data.write().await;
        data.tasks.retain(|t| t.id != task.id);
        data.tasks.push(task);
    }

    pub async fn program(&self, id: &str) -> Option<Program> {
        self.data.read().await.programs.iter().find(|p| p.id == id).cloned()
    }

    pub async fn task(&self, id: &str) -> Option<Task> {
        self.data.read().await.tasks.iter().find(|t| t.id == id).cloned()
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn before_create(&self) -> Result<(), StoreError> {
        Ok(())
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn before_upsert(&self) {}
}

fn same_slot(e: &Evaluation, program_id: &str, subtype: &str, task_id: Option<&str>) -> bool {
    e.program_id == program_id && e.evaluation_subtype == subtype && e.task_id.as_deref() == task_id
}

#[async_trait]
impl ProgramStore for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Program>, StoreError> {
        Ok(self.program(id).await)
    }

    async fn update(&self, id: &str, patch: ProgramPatch) -> Result<Program, StoreError> {
        let mut data = self.data.write().await;
        let program = data
            .programs
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "program",
                id: id.to_string(),
            })?;
        patch.apply(program);
        Ok(program.clone())
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn find_by_id(&self, id: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.task(id).await)
    }

    async fn find_by_program(&self, program_id: &str) -> Result<Vec<Task>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .tasks
            .iter()
            .filter(|t| t.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn update(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let mut data = self.data.write().await;
        let task = data
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "task",
                id: id.to_string(),
            })?;
        if let Some(next) = patch.status {
            if next != task.status && !task.status.can_transition_to(next) {
                return Err(StoreError::Conflict(format!(
                    "task {id} cannot move from {} to {next}",
                    task.status
                )));
            }
        }
        patch.apply(task);
        Ok(task.clone())
    }
}

#[async_trait]
impl EvaluationStore for InMemoryStore {
    async fn find_by_program(&self, program_id: &str) -> Result<Vec<Evaluation>, StoreError> {
        Ok(self
            .data
            .read()
            .await
            .evaluations
            .iter()
            .filter(|e| e.program_id == program_id)
            .cloned()
            .collect())
    }

    async fn create(&self, input: NewEvaluation) -> Result<Evaluation, StoreError> {
        self.before_create()?;

        let mut data = self.data.write().await;
        if data.evaluations.iter().any(|e| {
            same_slot(
                e,
                &input.program_id,
                &input.evaluation_subtype,
                input.task_id.as_deref(),
            )
        }) {
            return Err(StoreError::Conflict(format!(
                "evaluation {} already exists for program {}",
                input.evaluation_subtype, input.program_id
            )));
        }

        let evaluation = Evaluation::from_new(Uuid::new_v4().to_string(), input, Utc::now());
        data.evaluations.push(evaluation.clone());
        Ok(evaluation)
    }

    async fn upsert(
        &self,
        program_id: &str,
        subtype: &str,
        input: NewEvaluation,
        policy: UpsertPolicy,
    ) -> Result<Evaluation, StoreError> {
        self.before_upsert();
        let now = Utc::now();
        let mut data = self.data.write().await;

        let position = data
            .evaluations
            .iter()
            .position(|e| same_slot(e, program_id, subtype, input.task_id.as_deref()));
        let Some(idx) = position else {
            let evaluation = Evaluation::from_new(Uuid::new_v4().to_string(), input, now);
            data.evaluations.push(evaluation.clone());
            return Ok(evaluation);
        };
        let existing = &mut data.evaluations[idx];

        if let UpsertPolicy::IfVersion(expected) = policy {
            if existing.version != expected {
                return Err(StoreError::Conflict(format!(
                    "evaluation {} is at version {}, expected {expected}",
                    existing.id, existing.version
                )));
            }
        }

        existing.refresh(input, now);
        Ok(existing.clone())
    }
}

/// Call counters and failure injection for tests, enabled by the
/// `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
mod hooks {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::InMemoryStore;
    use crate::error::StoreError;

    #[derive(Default)]
    pub(super) struct TestHooks {
        create_calls: AtomicU32,
        upsert_calls: AtomicU32,
        fail_next_create: Mutex<Option<String>>,
    }

    impl InMemoryStore {
        /// Number of `create` calls received, including failed ones.
        pub fn create_calls(&self) -> u32 {
            self.hooks.create_calls.load(Ordering::Relaxed)
        }

        /// Number of `upsert` calls received, including failed ones.
        pub fn upsert_calls(&self) -> u32 {
            self.hooks.upsert_calls.load(Ordering::Relaxed)
        }

        /// Make the next `create` fail with a backend error.
        pub fn fail_next_create(&self, message: &str) {
            *self
                .hooks
                .fail_next_create
                .lock()
                .unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
        }

        pub(super) fn before_create(&self) -> Result<(), StoreError> {
            self.hooks.create_calls.fetch_add(1, Ordering::Relaxed);
            let injected = self
                .hooks
                .fail_next_create
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            match injected {
                Some(message) => Err(StoreError::Backend(message)),
                None => Ok(()),
            }
        }

        pub(super) fn before_upsert(&self) {
            self.hooks.upsert_calls.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EvaluationType, Mode, ModeBlock, ModeData, TaskStatus, MAX_SCORE};
    use crate::testing::{fixture_program, fixture_task};

    fn new_eval(program_id: &str, score: u32) -> NewEvaluation {
        NewEvaluation {
            user_id: "u1".into(),
            program_id: program_id.into(),
            task_id: None,
            mode: Mode::Pbl,
            evaluation_type: EvaluationType::Program,
            evaluation_subtype: Mode::Pbl.program_subtype(),
            score,
            max_score: MAX_SCORE,
            feedback_text: format!("score {score}"),
            feedback_data: Default::default(),
            mode_data: ModeBlock::new(Mode::Pbl, ModeData::default()),
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_slot() {
        let store = InMemoryStore::new();
        store.create(new_eval("p1", 70)).await.unwrap();
        let err = store.create(new_eval("p1", 80)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        store.create(new_eval("p2", 80)).await.unwrap();
        assert_eq!(store.create_calls(), 3);
    }

    #[tokio::test]
    async fn upsert_refreshes_in_place() {
        let store = InMemoryStore::new();
        let created = store.create(new_eval("p1", 70)).await.unwrap();

        let refreshed = store
            .upsert("p1", "pbl_complete", new_eval("p1", 90), UpsertPolicy::LastWriteWins)
            .await
            .unwrap();

        assert_eq!(refreshed.id, created.id);
        assert_eq!(refreshed.score, 90);
        assert_eq!(refreshed.version, 2);
        assert_eq!(refreshed.created_at, created.created_at);
        assert_eq!(EvaluationStore::find_by_program(&store, "p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upsert_with_stale_version_conflicts() {
        let store = InMemoryStore::new();
        store.create(new_eval("p1", 70)).await.unwrap();
        store
            .upsert("p1", "pbl_complete", new_eval("p1", 75), UpsertPolicy::IfVersion(1))
            .await
            .unwrap();

        let err = store
            .upsert("p1", "pbl_complete", new_eval("p1", 99), UpsertPolicy::IfVersion(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let stored = EvaluationStore::find_by_program(&store, "p1").await.unwrap();
        assert_eq!(stored[0].score, 75);
    }

    #[tokio::test]
    async fn task_update_guards_status_transitions() {
        let store = InMemoryStore::new();
        store.insert_task(fixture_task("t1", "p1", TaskStatus::Pending)).await;

        let err = TaskStore::update(
            &store,
            "t1",
            TaskPatch {
                status: Some(TaskStatus::Completed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let missing = TaskStore::update(&store, "nope", TaskPatch::default()).await;
        assert!(matches!(missing, Err(StoreError::NotFound { entity: "task", .. })));
    }

    #[tokio::test]
    async fn snapshot_json_roundtrip() {
        let store = InMemoryStore::new();
        store.insert_program(fixture_program("p1", "u1")).await;
        store.insert_task(fixture_task("t1", "p1", TaskStatus::Active)).await;
        store.create(new_eval("p1", 70)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");
        store.snapshot().await.save_json(&path).unwrap();

        let loaded = InMemoryStore::from_snapshot(Snapshot::load_json(&path).unwrap());
        assert!(loaded.program("p1").await.is_some());
        assert_eq!(
            TaskStore::find_by_program(&loaded, "p1").await.unwrap().len(),
            1
        );
        assert_eq!(
            EvaluationStore::find_by_program(&loaded, "p1").await.unwrap()[0].score,
            70
        );
    }

    #[test]
    fn load_json_skips_unknown_interaction_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{
              "tasks": [{
                "id": "t1",
                "programId": "p1",
                "status": "active",
                "interactions": [
                  {"type": "system_event", "content": {}, "timestamp": "2026-03-02T09:00:00Z"},
                  {"type": "ai_response", "content": {"completed": true, "xpEarned": 70}, "timestamp": "2026-03-02T09:01:00Z"}
                ]
              }]
            }"#,
        )
        .unwrap();

        let snapshot = Snapshot::load_json(&path).unwrap();
        assert_eq!(snapshot.tasks[0].interactions.len(), 1);
        assert!(snapshot.tasks[0].responses().all(|r| r.completed));
    }
}
