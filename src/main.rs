//! Binary entrypoint for the Guildledger CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and sample catalogs
//! - `start [--identity <id>] [--name <name>]` - run sweeps and read `!commands` from stdin
//! - `sweep [tasks|trades|cleanup|all]` - run one sweep pass and exit
//! - `status` - print a short summary of the stored economy
//!
//! See the library crate docs for module-level details: `guildledger::`.
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{info, warn};
use tokio::io::BufReader;

use guildledger::config::Config;
use guildledger::economy::catalog::{PROJECTS_FILE, RECIPES_FILE, SCAVENGE_FILE, VALUES_FILE};
use guildledger::economy::{
    execute_lines, start_sweeps, Catalog, Economy, EconomyStore, Invoker, LogNotifier, StaticIdentity,
};

const SAMPLE_RECIPES: &str = include_str!("../data/recipes.json");
const SAMPLE_SCAVENGE: &str = include_str!("../data/scavenge.json");
const SAMPLE_PROJECTS: &str = include_str!("../data/projects.json");
const SAMPLE_VALUES: &str = include_str!("../data/values.json");

#[derive(Parser)]
#[command(name = "guildledger")]
#[command(about = "Persistent game economy for chat-driven campaigns")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Clone, Copy, ValueEnum)]
enum SweepTarget {
    Tasks,
    Trades,
    Cleanup,
    All,
}

#[derive(Subcommand)]
enum Commands {
    /// Run background sweeps and execute commands read from stdin
    Start {
        /// Identity commands are issued as
        #[arg(long, default_value = "console")]
        identity: String,
        /// Display name for that identity
        #[arg(long, default_value = "console")]
        name: String,
    },
    /// Write a default configuration and sample catalogs
    Init,
    /// Run a single sweep pass and exit
    Sweep {
        #[arg(value_enum, default_value_t = SweepTarget::All)]
        target: SweepTarget,
    },
    /// Show a summary of the stored economy
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            info!("Initializing new economy configuration");
            let cfg = Config::default();
            let serialized = toml::to_string_pretty(&cfg)?;
            tokio::fs::write(&cli.config, serialized).await?;
            info!("Configuration file created at {}", cli.config);

            let catalog_dir = cfg.catalog_dir();
            tokio::fs::create_dir_all(&catalog_dir).await?;
            for (file, body) in [
                (RECIPES_FILE, SAMPLE_RECIPES),
                (SCAVENGE_FILE, SAMPLE_SCAVENGE),
                (PROJECTS_FILE, SAMPLE_PROJECTS),
                (VALUES_FILE, SAMPLE_VALUES),
            ] {
                write_if_missing(&catalog_dir.join(file), body).await?;
            }
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            println!("Initialized. Edit {} and run `guildledger start`.", cli.config);
        }
        Commands::Start { identity, name } => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            info!("Starting Guildledger v{}", env!("CARGO_PKG_VERSION"));
            let economy = build_economy(&config)?;
            let sweeps = start_sweeps(&economy, &config.sweep_config());
            let invoker = Invoker::new(identity, name);

            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = execute_lines(&economy, &invoker, stdin, |reply| println!("{}", reply)) => {
                    match result {
                        Ok(count) => info!("stdin closed after {} commands", count),
                        Err(e) => warn!("stdin read failed: {}", e),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupt received, shutting down");
                }
            }
            sweeps.shutdown().await;
            economy.store().flush()?;
            info!("Guildledger stopped");
        }
        Commands::Sweep { target } => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let economy = build_economy(&config)?;
            if matches!(target, SweepTarget::Tasks | SweepTarget::All) {
                let report = economy.sweep_due_tasks().await;
                println!("tasks: {} completed, {} skipped", report.completed, report.skipped);
            }
            if matches!(target, SweepTarget::Trades | SweepTarget::All) {
                let expired = economy.expire_trades().await?;
                println!("trades: {} expired", expired);
            }
            if matches!(target, SweepTarget::Cleanup | SweepTarget::All) {
                let cleaned = economy.cleanup_inventories().await;
                println!("cleanup: {} inventories changed", cleaned);
            }
        }
        Commands::Status => {
            let config = match pre_config {
                Some(c) => c,
                None => Config::load(&cli.config).await?,
            };
            let economy = build_economy(&config)?;
            let characters = economy.store().list_character_names();
            let projects = economy.list_projects()?;
            let trades = economy.list_trades()?;
            println!("Guildledger v{}", env!("CARGO_PKG_VERSION"));
            println!("Database: {}", config.db_path().display());
            println!("Characters: {}", characters.len());
            println!("Active projects: {}", projects.len());
            println!("Open trades: {}", trades.len());
            println!(
                "Catalog: {} recipes, {} scavenge groups",
                economy.catalog().recipes().count(),
                economy.catalog().scavenge_table().len()
            );
        }
    }

    Ok(())
}

fn build_economy(config: &Config) -> Result<Economy> {
    let db_path = config.db_path();
    let store = EconomyStore::open(&db_path)
        .with_context(|| format!("opening economy store at {}", db_path.display()))?;
    let catalog = Catalog::load_dir(config.catalog_dir()).context("loading catalog")?;
    let identity = StaticIdentity::new(
        config.permissions.superusers.clone(),
        config.permissions.honor_admins.clone(),
        config.permissions.auto_confirm,
    );
    Ok(Economy::new(
        Arc::new(store),
        Arc::new(catalog),
        Arc::new(LogNotifier),
        Arc::new(identity),
    )
    .with_rules(config.rules()))
}

async fn write_if_missing(path: &Path, body: &str) -> Result<()> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        info!("{} already exists; leaving it alone", path.display());
        return Ok(());
    }
    tokio::fs::write(path, body).await?;
    info!("Wrote sample catalog {}", path.display());
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level: config level, raised by CLI verbosity
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.clone())
        .and_then(|file| std::fs::OpenOptions::new().create(true).append(true).open(file).ok());

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Mirror to the console only when attached to a terminal
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
