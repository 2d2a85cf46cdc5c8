//! The `stride complete-task` and `stride feedback` commands.

use anyhow::Result;

use stride_core::model::DomainContext;

use super::{Paths, Workspace};

/// Domain context from the `--domain` and `--skills` flags.
pub fn domain_context(domain: Option<String>, skills: Option<String>) -> Option<DomainContext> {
    if domain.is_none() && skills.is_none() {
        return None;
    }
    Some(DomainContext {
        title: domain.unwrap_or_default(),
        description: String::new(),
        skill_focus: skills
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
    })
}

pub async fn complete(
    paths: &Paths,
    task_id: &str,
    user_id: &str,
    accept_language: Option<&str>,
    domain_context: Option<DomainContext>,
    json: bool,
) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let result = workspace
        .engine
        .complete_task(task_id, user_id, accept_language, domain_context.as_ref())
        .await?;
    workspace.save().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Task {task_id} completed: {} XP (evaluation {})\n",
            result.xp_earned, result.evaluation.id
        );
        println!("{}", result.feedback);
    }
    Ok(())
}

pub async fn feedback(paths: &Paths, task_id: &str, accept_language: Option<&str>) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let text = workspace
        .engine
        .task_feedback(task_id, accept_language, None)
        .await?;
    // Newly translated versions are cached in the snapshot.
    workspace.save().await?;
    println!("{text}");
    Ok(())
}
