//! The `stride init` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{Duration, Utc};

use stride_core::model::{
    AiResponse, Interaction, Mode, Program, ProgramMetadata, ProgramStatus, Task, TaskMetadata,
    TaskStatus,
};
use stride_core::store::Snapshot;

use super::Paths;

pub fn execute(paths: &Paths) -> Result<()> {
    let config_path = paths
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from("stride.toml"));
    if config_path.exists() {
        println!("{} already exists, skipping.", config_path.display());
    } else {
        std::fs::write(&config_path, SAMPLE_CONFIG)?;
        println!("Created {}", config_path.display());
    }

    let store_path = paths
        .store
        .clone()
        .unwrap_or_else(|| PathBuf::from("stride-data/store.json"));
    if store_path.exists() {
        println!("{} already exists, skipping.", store_path.display());
    } else {
        demo_snapshot().save_json(&store_path)?;
        println!("Created {}", store_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Edit {} with your API keys (optional)", config_path.display());
    println!("  2. Run: stride metrics --program demo-program");
    println!("  3. Run: stride complete-task --task demo-task-1 --user demo-user");
    print_store_hint(&store_path);

    Ok(())
}

fn print_store_hint(store_path: &Path) {
    if store_path != Path::new("stride-data/store.json") {
        println!("  (pass --store {} to every command)", store_path.display());
    }
}

fn demo_snapshot() -> Snapshot {
    let start = Utc::now() - Duration::days(2);
    let at = |minutes: i64| start + Duration::minutes(minutes);

    let program = Program {
        id: "demo-program".into(),
        user_id: "demo-user".into(),
        scenario_id: "data-analyst".into(),
        mode: Mode::Discovery,
        status: ProgramStatus::Active,
        created_at: Some(start),
        started_at: Some(start),
        metadata: ProgramMetadata::default(),
    };

    let explore = Task {
        id: "demo-task-1".into(),
        program_id: program.id.clone(),
        title: "Explore the sales dataset".into(),
        status: TaskStatus::Active,
        interactions: vec![
            Interaction::user_input("Revenue is highest in Q4.", at(5)),
            Interaction::ai_response(
                AiResponse {
                    completed: false,
                    xp_earned: 40,
                    feedback: "Good start. Check for missing values before drawing conclusions."
                        .into(),
                    improvements: vec!["Validate data quality first".into()],
                    ..Default::default()
                },
                at(6),
            )
            .with_time_spent(300),
            Interaction::user_input(
                "After dropping 12 rows with null totals, Q4 still leads with 31% of revenue.",
                at(20),
            ),
            Interaction::ai_response(
                AiResponse {
                    completed: true,
                    xp_earned: 85,
                    skills_improved: vec!["data cleaning".into()],
                    feedback: "Well reasoned, and the cleaning step is documented.".into(),
                    strengths: vec!["Careful validation".into()],
                    ..Default::default()
                },
                at(21),
            )
            .with_time_spent(840),
        ],
        metadata: TaskMetadata::default(),
    };

    let report = Task {
        id: "demo-task-2".into(),
        program_id: program.id.clone(),
        title: "Build a summary report".into(),
        status: TaskStatus::Active,
        interactions: vec![
            Interaction::user_input("GROUP BY region with a bar chart per quarter.", at(60)),
            Interaction::ai_response(
                AiResponse {
                    completed: true,
                    xp_earned: 90,
                    skills_improved: vec!["sql".into(), "visualization".into()],
                    feedback: "Clear aggregation and a readable chart.".into(),
                    ..Default::default()
                },
                at(61),
            )
            .with_time_spent(1200),
        ],
        metadata: TaskMetadata::default(),
    };

    let present = Task {
        id: "demo-task-3".into(),
        program_id: program.id.clone(),
        title: "Present your findings".into(),
        status: TaskStatus::Pending,
        interactions: vec![],
        metadata: TaskMetadata::default(),
    };

    Snapshot {
        programs: vec![program],
        tasks: vec![explore, report, present],
        evaluations: vec![],
    }
}

const SAMPLE_CONFIG: &str = r#"# stride configuration
#
# Without a usable provider, stride runs offline: task feedback uses canned
# text and program feedback is left empty.

# feedback_provider = "anthropic"
# translator_provider = "openai"
store_path = "./stride-data/store.json"

[providers.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"
# model = "claude-sonnet-4-20250514"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"
# model = "gpt-4.1-mini"

[engine]
canonical_language = "en"
# last_write_wins or optimistic
conflict_resolution = "last_write_wins"
translate_feedback = true
"#;
