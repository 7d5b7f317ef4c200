use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use lookup_loader::{CancelToken, LookupConfig, MappingSource, init_logger, run_load};

#[derive(Parser, Debug)]
#[command(
    name = "lookup-loader",
    about = "Load identifier mapping files into the lookup store"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load one mapping file (plain or .gz).
    Load(LoadArgs),
}

#[derive(clap::Args, Debug)]
struct LoadArgs {
    /// Mapping format: `pmid`, `pmc-ids` or `istex`.
    #[arg(long)]
    source: MappingSource,

    /// Input file; a `.gz` suffix enables gzip decoding.
    #[arg(long)]
    input: PathBuf,

    /// Store directory (overrides LOOKUP_STORE_PATH).
    #[arg(long)]
    store: Option<PathBuf>,

    /// Records per transaction (overrides LOOKUP_BATCH_SIZE).
    #[arg(long)]
    batch_size: Option<usize>,

    /// Parse on worker threads while the main thread writes.
    #[arg(long)]
    pipelined: bool,

    /// Parsed chunks buffered between parser and writer.
    #[arg(long)]
    queue_depth: Option<usize>,

    /// Print the final statistics as JSON.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logger();

    let cli = Cli::parse();
    let Command::Load(args) = cli.command;

    let mut config = match LookupConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            writeln!(io::stderr(), "error: configuration: {err}")?;
            std::process::exit(2);
        }
    };
    if let Some(store) = args.store {
        config.store_path = store;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(queue_depth) = args.queue_depth {
        config.queue_depth = queue_depth;
    }
    config.pipelined |= args.pipelined;

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupt received, stopping after the current line");
            signal_token.cancel();
        }
    });

    let source = args.source;
    let input = args.input;
    let outcome =
        tokio::task::spawn_blocking(move || run_load(&config, source, &input, cancel)).await?;

    match outcome {
        Ok(stats) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{source}: {stats}");
            }
            Ok(())
        }
        Err(err) => {
            writeln!(io::stderr(), "error: {}: {err}", err.stage())?;
            if let Some(stats) = err.cancelled_stats() {
                writeln!(io::stderr(), "committed before stop: {stats}")?;
            }
            std::process::exit(1);
        }
    }
}
