//! The `stride` command-line interface: evaluate learner progress from a snapshot file.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "stride", version, about = "Learning progress evaluation engine")]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot file (overrides `store_path` from the config)
    #[arg(long, global = true)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a starter config and a demo snapshot
    Init,

    /// Show program metrics
    Metrics {
        #[arg(long)]
        program: String,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Complete a task and record its evaluation
    CompleteTask {
        #[arg(long)]
        task: String,

        #[arg(long)]
        user: String,

        /// Accept-Language value (e.g. "ja,en;q=0.5")
        #[arg(long)]
        lang: Option<String>,

        /// Field the learner is working towards
        #[arg(long)]
        domain: Option<String>,

        /// Key skills of the field (comma-separated)
        #[arg(long)]
        skills: Option<String>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show task feedback in a language, translating it if needed
    Feedback {
        #[arg(long)]
        task: String,

        #[arg(long)]
        lang: Option<String>,
    },

    /// Mark a program completed and create its evaluation
    CompleteProgram {
        #[arg(long)]
        program: String,

        #[arg(long)]
        user: String,

        #[arg(long)]
        lang: Option<String>,
    },

    /// Rebuild a program's evaluation from current task data
    Regenerate {
        #[arg(long)]
        program: String,

        #[arg(long)]
        lang: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so JSON output on stdout stays parseable.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stride=info")),
        )
        .init();

    let cli = Cli::parse();
    let paths = commands::Paths {
        config: cli.config,
        store: cli.store,
    };

    let result = match cli.command {
        Commands::Init => commands::init::execute(&paths),
        Commands::Metrics { program, format } => {
            commands::metrics::execute(&paths, &program, &format).await
        }
        Commands::CompleteTask {
            task,
            user,
            lang,
            domain,
            skills,
            json,
        } => {
            commands::task::complete(
                &paths,
                &task,
                &user,
                lang.as_deref(),
                commands::task::domain_context(domain, skills),
                json,
            )
            .await
        }
        Commands::Feedback { task, lang } => {
            commands::task::feedback(&paths, &task, lang.as_deref()).await
        }
        Commands::CompleteProgram {
            program,
            user,
            lang,
        } => commands::program::complete(&paths, &program, &user, lang.as_deref()).await,
        Commands::Regenerate { program, lang } => {
            commands::program::regenerate(&paths, &program, lang.as_deref()).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
