//! The `stride metrics` command.

use anyhow::Result;
use comfy_table::{Cell, Table};

use stride_core::metrics::ProgramMetrics;

use super::{Paths, Workspace};

pub async fn execute(paths: &Paths, program_id: &str, format: &str) -> Result<()> {
    let workspace = Workspace::open(paths)?;
    let metrics = workspace.engine.program_metrics(program_id).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&metrics)?),
        "table" => println!("{}", metrics_table(program_id, &metrics)),
        other => anyhow::bail!("unknown format: {other} (expected table or json)"),
    }
    Ok(())
}

pub fn metrics_table(program_id: &str, metrics: &ProgramMetrics) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        "Program",
        "Completed",
        "Total XP",
        "Avg Score",
        "Time Spent",
        "Days",
    ]);
    table.add_row(vec![
        Cell::new(program_id),
        Cell::new(format!("{}/{}", metrics.completed_tasks, metrics.total_tasks)),
        Cell::new(metrics.total_xp),
        Cell::new(format!("{}/100", metrics.avg_score)),
        Cell::new(format_duration(metrics.time_spent_seconds)),
        Cell::new(metrics.days_used),
    ]);
    table
}

fn format_duration(seconds: u64) -> String {
    let (h, m) = (seconds / 3600, (seconds % 3600) / 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else {
        format!("{m}m {:02}s", seconds % 60)
    }
}
