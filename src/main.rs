use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use sitegen::config::SiteGenConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "sitegen")]
#[command(version, about = "Turn a site brief into a built, published static site")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a TOML config file (defaults to ./sitegen.toml when present)
    #[arg(long, global = true, env = "SITEGEN_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite job database. Overrides the config file and SITEGEN_DB_PATH.
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value = "text", env = "SITEGEN_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the worker pool until interrupted
    Worker {
        /// Number of jobs processed in parallel
        #[arg(short, long)]
        concurrency: Option<usize>,
    },
    /// Queue a site generation job
    Submit {
        #[arg(long)]
        client_id: String,

        /// Free-text site brief
        #[arg(long)]
        prompt: String,

        #[arg(long)]
        owner: Option<String>,
    },
    /// Show a job record
    Status {
        job_id: String,

        #[arg(long)]
        json: bool,
    },
    /// Show a job's log, oldest first
    Logs {
        job_id: String,

        /// Maximum entries (capped at 500)
        #[arg(short, long, default_value = "100")]
        limit: usize,
    },
    /// Create the job database schema
    InitDb,
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose { "sitegen=debug" } else { "sitegen=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    let mut config = SiteGenConfig::load(cli.config.as_deref())?;
    if let Some(db_path) = &cli.db_path {
        config.worker.db_path = db_path.clone();
    }

    match &cli.command {
        Commands::Worker { concurrency } => cmd::cmd_worker(config, *concurrency).await?,
        Commands::Submit {
            client_id,
            prompt,
            owner,
        } => cmd::cmd_submit(&config, client_id, prompt, owner.as_deref()).await?,
        Commands::Status { job_id, json } => cmd::cmd_status(&config, job_id, *json).await?,
        Commands::Logs { job_id, limit } => cmd::cmd_logs(&config, job_id, *limit).await?,
        Commands::InitDb => cmd::cmd_init_db(&config)?,
    }

    Ok(())
}
