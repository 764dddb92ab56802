//! Cement Plant Real-time Data Uploader
//!
//! Replays plant readings into the realtime database every few seconds.
//!
//! Usage:
//!   cement_uploader --data-file cement_plant_data.json stream
//!   cement_uploader --data-file cement_plant_data.json single --index 3
//!   cement_uploader --store sqlite --synthetic 100 once
//!   cement_uploader generate --output cement_plant_data.json --rows 100
//!
//! Environment:
//!   FIREBASE_DATABASE_URL - Realtime Database URL (firebase store)
//!   FIREBASE_AUTH_TOKEN   - Database secret or ID token (optional)
//!   DATA_FILE_PATH        - JSON / JSON Lines dataset
//!   UPLOADER_STORE        - firebase | sqlite | memory (default: firebase)
//!   SQLITE_PATH           - Database file for the sqlite store
//!   HISTORY_MAX_SIZE      - Retention cap (default: 1000)
//!   UPDATE_INTERVAL_SECS  - Seconds between ticks (default: 5)
//!   UPLOADER_LOG_FILE     - Log file (default: data_upload.log)

use anyhow::{Context, Result};
use cement_uploader::{
    config::{StoreBackend, UploaderConfig},
    models::RawRecord,
    normalize::SystemClock,
    replay::{ReplayPhase, ReplayScheduler},
    source::{self, SyntheticGenerator},
    store::{FirebaseStore, MemoryStore, SqliteStore, TelemetryStore},
    telemetry,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "cement_uploader")]
#[command(about = "Replay cement plant readings into a realtime database")]
struct Args {
    /// Optional TOML config file (flags and env vars override it)
    #[arg(long, env = "UPLOADER_CONFIG")]
    config: Option<PathBuf>,

    /// Store backend
    #[arg(long, env = "UPLOADER_STORE", value_enum)]
    store: Option<StoreBackend>,

    /// Firebase Realtime Database URL
    #[arg(long, env = "FIREBASE_DATABASE_URL")]
    database_url: Option<String>,

    /// Firebase database secret / ID token
    #[arg(long, env = "FIREBASE_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// SQLite database path (sqlite store)
    #[arg(long, env = "SQLITE_PATH")]
    sqlite_path: Option<PathBuf>,

    /// Dataset to replay (.json or .jsonl)
    #[arg(long, env = "DATA_FILE_PATH")]
    data_file: Option<PathBuf>,

    /// Replay N generated rows instead of a data file
    #[arg(long)]
    synthetic: Option<usize>,

    /// Maximum number of history entries kept
    #[arg(long, env = "HISTORY_MAX_SIZE")]
    history_max_size: Option<usize>,

    /// Seconds between ticks
    #[arg(long, env = "UPDATE_INTERVAL_SECS")]
    interval_secs: Option<u64>,

    /// Log file (appended to)
    #[arg(long, env = "UPLOADER_LOG_FILE", default_value = "data_upload.log")]
    log_file: PathBuf,

    /// Log to stdout only
    #[arg(long)]
    no_log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Real-time streaming (continuous, loops over the data)
    Stream,

    /// Upload a single record (for testing)
    Single {
        /// Zero-based record index
        #[arg(long)]
        index: usize,
    },

    /// Upload all records once (no looping)
    Once,

    /// Write a synthetic plant dataset
    Generate {
        #[arg(long, default_value = "cement_plant_data.json")]
        output: PathBuf,

        #[arg(long, default_value = "100")]
        rows: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenv::dotenv();
    let args = Args::parse();

    let log_file = (!args.no_log_file).then(|| args.log_file.clone());
    let logs = match telemetry::init(log_file.as_deref()) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("🏭 Cement Plant Real-time Data Uploader");
    println!("{}", "=".repeat(50));

    let code = match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Application error: {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    };

    logs.shutdown();
    code
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Generate { ref output, rows, seed } => {
            let records = SyntheticGenerator::new(rows, seed).generate()?;
            source::write_records(output, &records)?;
            info!("✅ Sample data file created with {} records: {}", rows, output.display());
        }
        Commands::Stream => replay(&args, true).await?,
        Commands::Once => replay(&args, false).await?,
        Commands::Single { index } => {
            let scheduler = build_scheduler(&args, false)?;
            scheduler.upload_single(index).await?;
        }
    }

    Ok(())
}

async fn replay(args: &Args, loop_enabled: bool) -> Result<()> {
    let mut scheduler = build_scheduler(args, loop_enabled)?;
    if loop_enabled {
        println!("\n🚀 Starting continuous real-time streaming...");
        println!("Press Ctrl+C to stop");
    } else {
        println!("\n📊 Uploading all records once...");
    }

    let stop = scheduler.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutdown signal received");
        stop.stop();
    });

    let phase = scheduler.run().await;
    info!(?phase, ticks = scheduler.ticks(), "Replay finished");
    if phase == ReplayPhase::Stopped {
        println!("\n⏹️ Operation stopped by user");
    }
    Ok(())
}

fn build_scheduler(args: &Args, loop_enabled: bool) -> Result<ReplayScheduler> {
    let config = resolve_config(args)?;
    config.validate()?;

    let records = load_sequence(&config)?;
    let store = build_store(&config)?;
    info!(
        store = store.name(),
        cap = config.history_max_size,
        interval_secs = config.update_interval_secs,
        "✅ Store initialized"
    );

    Ok(ReplayScheduler::new(
        config.replay_config(loop_enabled),
        records,
        store,
        Arc::new(SystemClock::new()),
    ))
}

/// Defaults < TOML file < env / flags.
fn resolve_config(args: &Args) -> Result<UploaderConfig> {
    let mut config = match &args.config {
        Some(path) => UploaderConfig::load(path)?,
        None => UploaderConfig::default(),
    };

    if let Some(store) = args.store {
        config.store = store;
    }
    if let Some(url) = &args.database_url {
        config.database_url = Some(url.clone());
    }
    if let Some(token) = &args.auth_token {
        config.auth_token = Some(token.clone());
    }
    if let Some(path) = &args.sqlite_path {
        config.sqlite_path = path.clone();
    }
    if let Some(path) = &args.data_file {
        config.data_file = Some(path.clone());
    }
    if let Some(rows) = args.synthetic {
        config.synthetic_rows = Some(rows);
    }
    if let Some(cap) = args.history_max_size {
        config.history_max_size = cap;
    }
    if let Some(secs) = args.interval_secs {
        config.update_interval_secs = secs;
    }

    Ok(config)
}

fn load_sequence(config: &UploaderConfig) -> Result<Vec<RawRecord>> {
    if let Some(path) = &config.data_file {
        return Ok(source::load_records(path)?);
    }

    let rows = config.synthetic_rows.unwrap_or_default();
    info!("📊 Generating {} synthetic records (seed {})", rows, config.synthetic_seed);
    let records = SyntheticGenerator::new(rows, config.synthetic_seed)
        .generate()
        .context("Failed to generate synthetic records")?;
    source::warn_missing_columns(&records);
    Ok(records)
}

fn build_store(config: &UploaderConfig) -> Result<Arc<dyn TelemetryStore>> {
    let store: Arc<dyn TelemetryStore> = match config.store {
        StoreBackend::Firebase => {
            let url = config.database_url.as_deref().unwrap_or_default();
            Arc::new(FirebaseStore::new(url, config.auth_token.clone())?)
        }
        StoreBackend::Sqlite => Arc::new(SqliteStore::open(&config.sqlite_path)?),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
