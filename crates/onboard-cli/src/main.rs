//! Onboard CLI — command-line interface for the onboarding workflow.
//!
//! Reuses the same core domain logic (onboard-core) and server bootstrap
//! (onboard-server) that back the HTTP API.

use clap::{Parser, Subcommand};

use onboard_cli::commands;
use onboard_core::models::instance::WorkflowStatus;

/// Onboard CLI — Multi-step onboarding workflow
#[derive(Parser)]
#[command(name = "onboard", version, about = "Onboard CLI — Multi-step onboarding workflow")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, env = "ONBOARD_DB_PATH", default_value = "onboard.db")]
    db: String,

    /// Workflow definition YAML (defaults to the built-in onboarding flow)
    #[arg(long, env = "ONBOARD_DEFINITION")]
    definition: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the onboarding HTTP backend server
    Server {
        /// Host to bind to
        #[arg(long, env = "ONBOARD_HOST", default_value = "127.0.0.1")]
        host: String,
        /// Port to listen on
        #[arg(long, env = "ONBOARD_PORT", default_value_t = 3210)]
        port: u16,
    },

    /// Show the ordered steps of the active workflow
    Steps,

    /// Show a subject's progress
    Status {
        /// Subject (user) ID
        #[arg(long)]
        subject: String,
    },

    /// Submit a step payload for a subject
    Submit {
        /// Subject (user) ID
        #[arg(long)]
        subject: String,
        /// Step name (e.g. "userInfo")
        #[arg(long)]
        step: String,
        /// Step payload as a JSON object string
        #[arg(long, default_value = "{}")]
        payload: String,
    },

    /// Reset a subject's workflow to NOT_STARTED
    Reset {
        /// Subject (user) ID
        #[arg(long)]
        subject: String,
    },

    /// List every stored subject with its status
    List {
        /// Only subjects in this status (NOT_STARTED, IN_PROGRESS, COMPLETE)
        #[arg(long)]
        status: Option<WorkflowStatus>,
    },

    /// Validate a workflow definition YAML file
    Validate {
        /// Path to the YAML file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onboard_core=warn,onboard_server=warn,onboard_cli=info".into()),
        )
        .init();

    let definition = cli.definition.as_deref();

    let result = match cli.command {
        Commands::Server { host, port } => {
            commands::server::run(host, port, cli.db.clone(), cli.definition.clone()).await
        }

        Commands::Steps => {
            let state = commands::init_state(&cli.db, definition).await;
            commands::workflow::steps(&state)
        }

        Commands::Status { subject } => {
            let state = commands::init_state(&cli.db, definition).await;
            commands::workflow::status(&state, &subject).await
        }

        Commands::Submit {
            subject,
            step,
            payload,
        } => {
            let state = commands::init_state(&cli.db, definition).await;
            commands::workflow::submit(&state, &subject, &step, &payload).await
        }

        Commands::Reset { subject } => {
            let state = commands::init_state(&cli.db, definition).await;
            commands::workflow::reset(&state, &subject).await
        }

        Commands::List { status } => {
            let state = commands::init_state(&cli.db, definition).await;
            commands::workflow::list(&state, status).await
        }

        Commands::Validate { file } => commands::workflow::validate(&file),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
