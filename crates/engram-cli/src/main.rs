use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engram::{Config, MemoryManager};
use engram_cli::commands::{CompactCommand, GraphCommand, MemoryCommand, StatsCommand};
use engram_cli::error::CliResult;
use engram_cli::output::OutputFormat;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "engram")]
#[command(about = "Engram - capacity-bounded semantic memory")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'd', global = true, help = "Path to data directory")]
    pub data_dir: Option<PathBuf>,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Memory management commands")]
    Memory(MemoryCommand),

    #[clap(about = "Knowledge graph commands")]
    Graph(GraphCommand),

    #[clap(about = "Shrink the store to a target size")]
    Compact(CompactCommand),

    #[clap(about = "Show memory statistics")]
    Stats(StatsCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    let manager = MemoryManager::from_config(&config).await?;

    match &cli.command {
        Command::Memory(cmd) => cmd.execute(&manager, format).await,
        Command::Graph(cmd) => cmd.execute(&manager, format).await,
        Command::Compact(cmd) => cmd.execute(&manager, format).await,
        Command::Stats(cmd) => cmd.execute(&manager, format).await,
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,engram=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
