use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use atomic_commit::adapter::config::AppConfig;
use atomic_commit::adapter::init::AppInitializer;
use atomic_commit::adapter::web::create_router::create_router;
use atomic_commit::adapter::web::presenter::recover_transaction::RecoverTransactionPresenter;
use atomic_commit::core::domain::decision_log::Decision;
use atomic_commit::core::port::recover_transaction::{
    RecoverTransactionInputBoundary, UnvalidatedRecoverInput,
};
use atomic_commit::error::ApplicationError;

#[derive(Parser)]
#[command(name = "atomic-commit")]
#[command(about = "Two-phase commit coordinator for Postgres and MySQL XA")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API
    Serve,
    /// Resolve prepared transactions left behind for one global id
    Sweep {
        global_id: String,
        /// Override the decision log
        #[arg(long, value_enum)]
        decision: Option<DecisionArg>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DecisionArg {
    Commit,
    Abort,
}

impl From<DecisionArg> for Decision {
    fn from(value: DecisionArg) -> Self {
        match value {
            DecisionArg::Commit => Decision::Commit,
            DecisionArg::Abort => Decision::Abort,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("atomic_commit=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = AppConfig::load()?;
    let state = AppInitializer::initialize(&config)
        .await
        .map_err(ApplicationError::from)?;

    match args.command {
        Command::Serve => {
            let app = create_router(state);
            let listener = tokio::net::TcpListener::bind(config.bind())
                .await
                .map_err(|source| ApplicationError::BindError {
                    bind: config.bind().to_string(),
                    source,
                })?;
            info!(bind = config.bind(), "Server running");
            axum::serve(listener, app)
                .await
                .map_err(ApplicationError::ServerError)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Sweep { global_id, decision } => {
            let mut presenter = RecoverTransactionPresenter::new();
            let input = UnvalidatedRecoverInput {
                global_id,
                decision: decision.map(Decision::from),
            };
            state
                .recover_transaction_use_case
                .execute(input, &mut presenter)
                .await?;
            let report = presenter.take_output().context("sweep produced no report")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.is_resolved() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
