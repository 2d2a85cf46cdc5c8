//! Program-level metric aggregation.
//!
//! Rolls completed task evaluations up into the totals stored on a program
//! and its program-level evaluation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Program, Task, TaskStatus};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Aggregate statistics for one program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMetrics {
    /// Sum of positive scores over completed tasks.
    #[serde(rename = "totalXP")]
    pub total_xp: u32,
    /// Rounded mean of positive scores over completed tasks.
    pub avg_score: u32,
    pub completed_tasks: u32,
    pub total_tasks: u32,
    pub time_spent_seconds: u64,
    /// Whole days from program start to the latest task completion, rounded up.
    pub days_used: u32,
}

/// Compute program metrics from the full task list.
pub fn compute_program_metrics(program: &Program, tasks: &[Task]) -> ProgramMetrics {
    let completed: Vec<&Task> = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Completed)
        .collect();

    let total_tasks = tasks.len() as u32;
    if completed.is_empty() {
        return ProgramMetrics {
            total_tasks,
            ..Default::default()
        };
    }

    let scores: Vec<u32> = completed
        .iter()
        .map(|t| t.score())
        .filter(|&s| s > 0)
        .collect();
    let total_score: u32 = scores.iter().sum();
    let avg_score = if scores.is_empty() {
        0
    } else {
        (total_score as f64 / scores.len() as f64).round() as u32
    };

    let time_spent_seconds = completed
        .iter()
        .flat_map(|t| t.interactions.iter())
        .map(|i| i.context.time_spent)
        .sum();

    let latest_completion = completed
        .iter()
        .filter_map(|t| t.metadata.completed_at)
        .max();

    ProgramMetrics {
        total_xp: total_score,
        avg_score,
        completed_tasks: completed.len() as u32,
        total_tasks,
        time_spent_seconds,
        days_used: days_between(program.start_time(), latest_completion),
    }
}

/// Days from `start` to `end`, rounded up; 0 when either is missing or `end`
/// is not after `start`.
fn days_between(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> u32 {
    let (Some(start), Some(end)) = (start, end) else {
        return 0;
    };
    let elapsed_ms = (end - start).num_milliseconds();
    if elapsed_ms <= 0 {
        return 0;
    }
    ((elapsed_ms + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY) as u32
}
