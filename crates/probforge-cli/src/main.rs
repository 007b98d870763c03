//! probforge CLI — serve the API and operate on the problem bank.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod commands;

const DEFAULT_LOG_DIRECTIVE: &str = "probforge=info,tower_http=info";

#[derive(Parser)]
#[command(
    name = "probforge",
    version,
    about = "Problem bank with LLM-generated variants and exam composition"
)]
struct Cli {
    /// Config file path (default: ./probforge.toml, then ~/.config/probforge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on (overrides [server].bind)
        #[arg(long)]
        bind: Option<String>,

        /// Database URL (overrides [server].database_url)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Create a starter probforge.toml
    Init,

    /// Validate the configuration without starting anything
    CheckConfig,

    /// List models of the configured providers
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Generate one variant of a stored problem and print it as JSON
    Generate {
        /// Problem to derive the variant from
        #[arg(long)]
        problem_id: Uuid,

        /// Subject for the variant instead of the parent's
        #[arg(long)]
        subject: Option<String>,

        /// Difficulty (1-5) for the variant instead of the parent's
        #[arg(long)]
        difficulty: Option<i32>,

        /// Database URL (overrides [server].database_url)
        #[arg(long)]
        database_url: Option<String>,
    },

    /// Show the ancestors and direct variants of a problem
    Lineage {
        #[arg(long)]
        problem_id: Uuid,

        /// Database URL (overrides [server].database_url)
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.config.as_deref());

    let config = cli.config;
    let result = match cli.command {
        Commands::Serve { bind, database_url } => {
            commands::serve::execute(config, bind, database_url).await
        }
        Commands::Init => commands::init::execute(),
        Commands::CheckConfig => commands::check_config::execute(config),
        Commands::ListModels { provider } => commands::list_models::execute(provider, config).await,
        Commands::Generate {
            problem_id,
            subject,
            difficulty,
            database_url,
        } => {
            commands::generate::execute(config, problem_id, subject, difficulty, database_url)
                .await
        }
        Commands::Lineage {
            problem_id,
            database_url,
        } => commands::lineage::execute(config, problem_id, database_url).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// `RUST_LOG` wins, then `[server].log_level`, then the built-in default.
fn init_tracing(config_path: Option<&std::path::Path>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let configured = probforge_providers::load_config_from(config_path)
            .ok()
            .and_then(|c| c.server.log_level);
        configured
            .and_then(|level| EnvFilter::try_new(level).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVE))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
