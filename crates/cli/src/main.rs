mod commands;
mod factory;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use folio_utils::output::OutputFormat;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "folio",
    about = "Folio — Ethereum wallet portfolio aggregator.\nDiscovers held tokens, prices them through a cached provider, outputs a table or JSON.",
    version,
    propagate_version = true
)]
struct Cli {
    #[arg(long, short = 'o', global = true, default_value = "table")]
    output: CliOutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliOutputFormat { Table, Json, JsonPretty }

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> OutputFormat {
        match f {
            CliOutputFormat::Table => OutputFormat::Table,
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::JsonPretty => OutputFormat::JsonPretty,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a wallet's native and token holdings.
    Portfolio {
        /// Wallet address (0x + 40 hex chars, any case).
        address: String,
        /// Only show the N largest holdings in the table.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Show which data providers are configured.
    Status,

    /// Check an address without touching the network.
    Validate { address: String },

    /// Inspect or reset the local price cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached prices with their age.
    Show,
    /// Remove every cached price.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fmt: OutputFormat = cli.output.into();

    match cli.command {
        Commands::Portfolio { address, top } => commands::portfolio::run(&address, top, fmt).await,
        Commands::Status => commands::status::run(fmt),
        Commands::Validate { address } => commands::validate::run(&address, fmt),
        Commands::Cache { action } => match action {
            CacheAction::Show => commands::cache::show(fmt),
            CacheAction::Clear => commands::cache::clear(fmt),
        },
    }
}
