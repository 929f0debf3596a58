//! sqlite-pg-migrate CLI - one-shot SQLite to PostgreSQL migration.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::error::Side;
use sqlite_pg_migrate::{
    health_check, Config, ConnectionPair, JsonLinesProgress, MigrateError, NoopProgress,
    Orchestrator, ProgressSink, SourceReader, SqliteReader,
};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "One-shot SQLite to PostgreSQL migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Override the source SQLite file
    #[arg(long, global = true)]
    source: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Also write the full log, without colors, to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print progress updates as JSON lines to stderr
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate every table from the source file into PostgreSQL
    Run {
        /// Override target schema
        #[arg(long)]
        target_schema: Option<String>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Continue even if the source fails its integrity checks
        #[arg(long)]
        force: bool,

        /// Skip the source integrity checks
        #[arg(long)]
        skip_integrity_check: bool,
    },

    /// Run integrity checks on the source file
    Check,

    /// Test source and target connections
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<u8, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_ref())?;

    let mut config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            target_schema,
            batch_size,
            force,
            skip_integrity_check,
        } => {
            if let Some(schema) = target_schema {
                config.target.schema = schema;
            }
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if skip_integrity_check {
                config.migration.integrity_check = false;
            }
            config.validate()?;

            let cancel_token = setup_signal_handler();

            let pair = ConnectionPair::acquire(&config.source, &config.target).await?;

            if config.migration.integrity_check {
                let report = pair.source.integrity_check().await;
                if !report.passed() {
                    eprintln!("Source integrity check failed:\n{}", report);
                    if !force {
                        pair.close().await;
                        return Err(MigrateError::Integrity(format!(
                            "{} (use --force to migrate anyway)",
                            report.failures().join(", ")
                        )));
                    }
                    warn!("Continuing despite failed integrity checks (--force)");
                }
            }

            let progress: Arc<dyn ProgressSink> = if cli.progress {
                Arc::new(JsonLinesProgress)
            } else {
                Arc::new(NoopProgress)
            };

            let result = Orchestrator::from_pair(&pair, &config)
                .with_progress(progress)
                .with_cancellation(cancel_token)
                .run()
                .await;
            pair.close().await;
            let summary = result?;

            if cli.output_json {
                println!("{}", summary.to_json()?);
            } else {
                println!("\n{}", summary);
                if summary.coercion.nulled_booleans + summary.coercion.nulled_json > 0 {
                    println!(
                        "  values set to NULL: {} booleans, {} JSON",
                        summary.coercion.nulled_booleans, summary.coercion.nulled_json
                    );
                }
                if !summary.failed_tables.is_empty() {
                    println!("  Failed tables: {:?}", summary.failed_tables);
                }
            }

            Ok(summary.exit_code())
        }

        Commands::Check => {
            let reader = SqliteReader::open(&config.source).await?;
            let report = reader.integrity_check().await;
            reader.close().await;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Integrity check of {}:", config.source.path.display());
                print!("{}", report);
                println!(
                    "\n  Overall: {}",
                    if report.passed() { "PASSED" } else { "FAILED" }
                );
            }

            if !report.passed() {
                return Err(MigrateError::Integrity(report.failures().join(", ")));
            }
            Ok(0)
        }

        Commands::HealthCheck => {
            let result = health_check(&config).await;

            if cli.output_json {
                println!("{}", result.to_json()?);
            } else {
                println!("Health Check Results:");
                for (name, side) in [
                    ("Source (SQLite)", &result.source),
                    ("Target (PostgreSQL)", &result.target),
                ] {
                    println!(
                        "  {}: {} ({}ms)",
                        name,
                        if side.connected { "OK" } else { "FAILED" },
                        side.latency_ms
                    );
                    if let Some(ref info) = side.info {
                        println!("    {}", info);
                    }
                    if let Some(ref err) = side.error {
                        println!("    Error: {}", err);
                    }
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                let side = if result.source.connected {
                    Side::Target
                } else {
                    Side::Source
                };
                return Err(MigrateError::connection(side, "health check failed"));
            }
            Ok(0)
        }
    }
}

/// Load the configuration file, or build one from `--source` when the file
/// does not exist.
fn load_config(cli: &Cli) -> Result<Config, MigrateError> {
    let mut config = if cli.config.exists() {
        let config = Config::load(&cli.config)?;
        info!("Loaded configuration from {:?}", cli.config);
        config
    } else if let Some(ref source) = cli.source {
        let mut config = Config::for_source(source);
        config.target.apply_env_password();
        config
    } else {
        return Err(MigrateError::Config(format!(
            "configuration file {:?} not found (pass --config or --source)",
            cli.config
        )));
    };

    if let Some(ref source) = cli.source {
        config.source.path = source.clone();
    }
    config.validate()?;
    Ok(config)
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: Option<&PathBuf>,
) -> Result<(), MigrateError> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if format == "json" {
        fmt::layer()
            .json()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match log_file {
        Some(path) => {
            let file = File::create(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| MigrateError::Config(format!("cannot install logger: {}", e)))
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM. The running batch or replayed
/// row finishes before the migration stops.
#[cfg(unix)]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();

    let token_int = cancel_token.clone();
    let token_term = cancel_token.clone();

    tokio::spawn(async move {
        match signal(SignalKind::interrupt()) {
            Ok(mut sigint) => {
                sigint.recv().await;
                eprintln!("\nReceived SIGINT. Stopping after the current batch...");
                token_int.cancel();
            }
            Err(e) => warn!("Cannot install SIGINT handler: {}", e),
        }
    });

    tokio::spawn(async move {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                eprintln!("\nReceived SIGTERM. Stopping after the current batch...");
                token_term.cancel();
            }
            Err(e) => warn!("Cannot install SIGTERM handler: {}", e),
        }
    });

    cancel_token
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> CancellationToken {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
            token.cancel();
        }
    });

    cancel_token
}
