//! Subcommand implementations.
//!
//! Every command that touches data loads the snapshot into an
//! [`InMemoryStore`], runs one engine operation, and writes the snapshot back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use stride_core::engine::Engine;
use stride_core::store::{InMemoryStore, Snapshot};
use stride_providers::config::{create_generator, create_translator, load_config_from};

pub mod init;
pub mod metrics;
pub mod program;
pub mod task;

/// Paths given on the command line.
pub struct Paths {
    pub config: Option<PathBuf>,
    pub store: Option<PathBuf>,
}

/// An engine over a snapshot file.
pub struct Workspace {
    pub engine: Engine,
    store: Arc<InMemoryStore>,
    snapshot_path: PathBuf,
}

impl Workspace {
    pub fn open(paths: &Paths) -> Result<Self> {
        let config = load_config_from(paths.config.as_deref())?;
        let snapshot_path = paths
            .store
            .clone()
            .unwrap_or_else(|| config.store_path.clone());
        if !snapshot_path.exists() {
            anyhow::bail!(
                "snapshot not found: {} (run `stride init` to create one)",
                snapshot_path.display()
            );
        }
        let snapshot = Snapshot::load_json(&snapshot_path)?;
        let store = Arc::new(InMemoryStore::from_snapshot(snapshot));

        let generator = create_generator(&config)?;
        let translator = create_translator(&config, generator.clone())?;
        tracing::debug!(generator = generator.name(), "engine ready");

        let engine = Engine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            generator,
            translator,
            config.engine,
        );

        Ok(Self {
            engine,
            store,
            snapshot_path,
        })
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write the store back to the snapshot file.
    pub async fn save(&self) -> Result<()> {
        self.store
            .snapshot()
            .await
            .save_json(&self.snapshot_path)
            .context("failed to save snapshot")
    }
}
