use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use sensorlink::commands::{self, fetch::View};
use sensorlink::config::Config;
use sensorlink::logging::{LogFormat, init_tracing};

#[derive(Parser)]
#[command(name = "sensorlink")]
#[command(about = "Encrypted sensor telemetry: device delivery, storage server and consumer")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.sensorlink/sensorlink.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the telemetry server
    Serve {
        /// Listen address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
        /// "memory" or a directory (overrides server.storage)
        #[arg(long)]
        storage: Option<String>,
    },
    /// Encrypt and deliver one reading, flushing the outbox on success
    Deliver {
        /// Reading JSON file, or "-" for stdin
        reading: PathBuf,
    },
    /// Deliver the reading in a file every interval until Ctrl+C
    Run {
        /// Reading JSON file, re-read on every tick
        reading_file: PathBuf,
    },
    /// Inspect or drain the device outbox
    Outbox {
        #[command(subcommand)]
        action: OutboxAction,
    },
    /// Fetch and decrypt readings
    Fetch {
        #[arg(value_enum)]
        view: View,
        /// Look back this many minutes
        #[arg(long)]
        minutes: Option<i64>,
        /// Maximum entries to request
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Delete stored blobs for the configured device
    Purge {
        /// Only blobs that arrived before this RFC 3339 time or date
        #[arg(long)]
        before: Option<String>,
        /// Delete every blob for the device
        #[arg(long)]
        all: bool,
    },
}

#[derive(Subcommand)]
enum OutboxAction {
    /// Number of buffered blobs
    Count,
    /// Send buffered blobs now
    Flush,
}

impl Commands {
    /// Commands whose stdout is a JSON envelope.
    fn prints_json(&self) -> bool {
        !matches!(self, Self::Serve { .. })
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let json = cli.command.prints_json();
    if let Err(e) = dispatch(cli).await {
        if json {
            commands::print_failure(&e);
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind, storage } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if storage.is_some() {
                config.server.storage = storage;
            }
            commands::serve::execute(config.server).await
        },
        Commands::Deliver { reading } => commands::deliver::execute(&config.client, &reading).await,
        Commands::Run { reading_file } => commands::run::execute(&config.client, reading_file).await,
        Commands::Outbox { action } => match action {
            OutboxAction::Count => commands::outbox::count(&config.client),
            OutboxAction::Flush => commands::outbox::flush(&config.client).await,
        },
        Commands::Fetch {
            view,
            minutes,
            limit,
        } => commands::fetch::execute(&config.client, view, minutes, limit).await,
        Commands::Purge { before, all } => {
            commands::purge::execute(&config.client, before.as_deref(), all).await
        },
    }
}
