//! The `stride complete-program` and `stride regenerate` commands.

use anyhow::Result;

use stride_core::coordinator::RegenerationResult;

use super::metrics::metrics_table;
use super::{Paths, Workspace};

pub async fn complete(
    paths: &Paths,
    program_id: &str,
    user_id: &str,
    accept_language: Option<&str>,
) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let result = workspace
        .engine
        .complete_program(program_id, user_id, accept_language)
        .await?;
    workspace.save().await?;
    report(program_id, &result);
    Ok(())
}

pub async fn regenerate(
    paths: &Paths,
    program_id: &str,
    accept_language: Option<&str>,
) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let result = workspace
        .engine
        .regenerate_program_evaluation(program_id, accept_language)
        .await?;
    workspace.save().await?;
    report(program_id, &result);
    tracing::debug!("snapshot saved to {}", workspace.snapshot_path().display());
    Ok(())
}

fn report(program_id: &str, result: &RegenerationResult) {
    println!(
        "Program {program_id}: evaluation {} {}",
        result.evaluation_id, result.outcome
    );
    println!("{}", metrics_table(program_id, &result.metrics));
}
