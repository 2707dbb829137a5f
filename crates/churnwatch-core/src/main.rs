//! ChurnWatch CLI
//!
//! Command-line interface for the ChurnWatch churn monitoring service.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

use churnwatch::alerting::{AlertDispatcher, WebhookNotifier};
use churnwatch::api::{AppState, AuthConfig, HttpServer};
use churnwatch::config::LoggingConfig;
use churnwatch::db::{AlertLog, ConfigStore, Database, Stores};
use churnwatch::models::{AlertConfigInput, AlertHistoryFilter, AlertKind, PageRequest};
use churnwatch::monitor::{Monitor, MonitorScheduler, RunSummary};
use churnwatch::scoring::ModelHandle;
use churnwatch::Config;

/// ChurnWatch - Customer churn risk monitoring
#[derive(Parser)]
#[command(name = "churnwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "CHURNWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format (for commands that support it)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API and the periodic monitor
    Serve {
        /// HTTP API port (overrides the configuration file)
        #[arg(long, env = "CHURNWATCH_HTTP_PORT")]
        http_port: Option<u16>,

        /// Apply pending migrations before serving
        #[arg(long)]
        migrate: bool,

        /// Do not start the periodic monitor
        #[arg(long)]
        no_scheduler: bool,
    },

    /// Run one monitoring pass and print its summary
    Monitor,

    /// Manage alerting
    Alerts {
        #[command(subcommand)]
        command: AlertsCommands,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },

    /// Check database, Redis and model health
    Health,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Subcommand)]
enum AlertsCommands {
    /// Show or change the alert configuration
    Config {
        #[command(subcommand)]
        command: AlertConfigCommands,
    },

    /// Show recent alert records
    History {
        /// Only this alert kind (HIGH_RISK, RISK_INCREASE, SUMMARY)
        #[arg(long)]
        kind: Option<String>,

        /// Only records that were not delivered
        #[arg(long)]
        failed_only: bool,

        /// Maximum number of records
        #[arg(long, default_value = "20")]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum AlertConfigCommands {
    /// Print the current configuration
    Show,

    /// Update selected fields
    Set {
        /// Webhook URL
        #[arg(long)]
        webhook_url: Option<String>,

        /// Enable alert delivery
        #[arg(long, conflicts_with = "disable")]
        enable: bool,

        /// Disable alert delivery
        #[arg(long)]
        disable: bool,

        /// Probability above which a customer is high risk (0..1)
        #[arg(long)]
        high_risk_threshold: Option<f64>,

        /// Relative increase, in percent, that counts as significant
        #[arg(long)]
        risk_increase_threshold: Option<f64>,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging; the guard flushes file logs on exit
    let _guard = match init_logging(&config.logging, cli.verbose) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error initializing logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Execute command
    let result = match cli.command {
        Commands::Serve {
            http_port,
            migrate,
            no_scheduler,
        } => run_serve(config, http_port, migrate, no_scheduler).await,
        Commands::Monitor => run_monitor(config, cli.format).await,
        Commands::Alerts { command } => run_alerts(config, command, cli.format).await,
        Commands::Db { command } => run_db(config, command).await,
        Commands::Health => run_health(config, cli.format).await,
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(config: &LoggingConfig, verbose: bool) -> anyhow::Result<Option<WorkerGuard>> {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (writer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "churnwatch.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stdout), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.directory.is_none())
        .with_writer(writer);

    if config.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(guard)
}

/// Load the model bundle; a missing or broken bundle leaves the handle empty
fn load_model(config: &Config) -> ModelHandle {
    let model = ModelHandle::empty();
    if let Err(e) = model.reload(&config.model.path) {
        warn!(
            path = %config.model.path.display(),
            error = %e,
            "Churn model not loaded; scoring is unavailable until reload"
        );
    }
    model
}

fn build_monitor(config: &Config, stores: Stores, model: ModelHandle) -> anyhow::Result<Monitor> {
    let notifier = WebhookNotifier::new(config.alerting.clone())?;
    let dispatcher = AlertDispatcher::new(notifier, stores.alerts.clone(), config.alerting.clone());
    Ok(Monitor::new(stores, model, dispatcher, config.monitor.clone()))
}

fn install_metrics() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install Prometheus recorder");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down...");
}

async fn run_serve(
    config: Config,
    http_port: Option<u16>,
    migrate: bool,
    no_scheduler: bool,
) -> anyhow::Result<()> {
    let metrics = install_metrics();

    let db = Database::new(&config).await?;
    if migrate {
        db.migrate().await?;
        info!("Migrations applied");
    }

    let stores = db.stores();
    let model = load_model(&config);
    let monitor = Arc::new(build_monitor(&config, stores.clone(), model.clone())?);

    if config.monitor.enabled && !no_scheduler {
        MonitorScheduler::new(monitor.clone(), config.monitor.interval).spawn();
    }

    let state = AppState {
        stores,
        model,
        model_path: config.model.path.clone(),
        monitor,
        cache: db.prediction_cache(&config),
        auth: AuthConfig {
            api_key: config.server.admin_api_key.clone(),
        },
        metrics,
    };
    if state.auth.api_key.is_none() {
        warn!("No admin API key configured; admin endpoints will reject every request");
    }

    let addr = format!(
        "{}:{}",
        config.server.host,
        http_port.unwrap_or(config.server.http_port)
    );
    info!(%addr, "Starting ChurnWatch");

    HttpServer::new(state).serve(&addr, shutdown_signal()).await?;
    Ok(())
}

async fn run_monitor(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    let model = load_model(&config);
    let monitor = build_monitor(&config, db.stores(), model)?;

    let summary = monitor.run().await?;
    print_summary(&summary, format)
}

fn print_summary(summary: &RunSummary, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Run {}", summary.run_id);
    println!("  Customers checked:     {}", summary.total_checked);
    println!("  High risk:             {}", summary.high_risk_count);
    println!("  Significant increases: {}", summary.significant_increases);
    println!("  Skipped:               {}", summary.skipped);
    println!("  Alerts sent / failed:  {} / {}", summary.alerts_sent, summary.alerts_failed);
    println!("  Summary delivered:     {}", summary.summary_delivered);
    if summary.timed_out {
        println!("  Stopped early: run timeout reached");
    }
    Ok(())
}

async fn run_alerts(
    config: Config,
    command: AlertsCommands,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let db = Database::new(&config).await?;
    let stores = db.stores();

    match command {
        AlertsCommands::Config { command } => {
            let settings = match command {
                AlertConfigCommands::Show => stores.config.load_config().await?,
                AlertConfigCommands::Set {
                    webhook_url,
                    enable,
                    disable,
                    high_risk_threshold,
                    risk_increase_threshold,
                } => {
                    let is_enabled = match (enable, disable) {
                        (true, _) => Some(true),
                        (_, true) => Some(false),
                        _ => None,
                    };
                    let input = AlertConfigInput {
                        webhook_url,
                        is_enabled,
                        high_risk_threshold,
                        risk_increase_threshold,
                    };
                    input.validate()?;
                    if let Some(url) = input.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
                        WebhookNotifier::new(config.alerting.clone())?.validate_url(url)?;
                    }
                    stores.config.update_config(&input).await?
                }
            };

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&settings)?);
            } else {
                println!("Enabled:                 {}", settings.is_enabled);
                println!("Webhook URL:             {}", settings.webhook_url);
                println!("High-risk threshold:     {}", settings.high_risk_threshold);
                println!("Risk-increase threshold: {}%", settings.risk_increase_threshold);
            }
        }
        AlertsCommands::History {
            kind,
            failed_only,
            limit,
        } => {
            let kind = kind
                .map(|k| {
                    AlertKind::parse(&k.to_uppercase())
                        .with_context(|| format!("unknown alert kind '{k}'"))
                })
                .transpose()?;
            let filter = AlertHistoryFilter {
                kind,
                failed_only,
                ..Default::default()
            };
            let page = stores
                .alerts
                .list_alerts(&filter, PageRequest::new(Some(1), Some(limit)))
                .await?;

            if format == OutputFormat::Json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                println!("{} matching record(s), showing {}", page.count, page.results.len());
                for record in &page.results {
                    let status = if record.was_sent { "sent" } else { "failed" };
                    let customer = record
                        .customer_id
                        .map_or_else(|| "-".to_string(), |id| id.to_string());
                    println!(
                        "{}  {:<13} customer={:<8} {:<6} {}",
                        record.sent_at.format("%Y-%m-%d %H:%M:%S"),
                        record.kind.as_str(),
                        customer,
                        status,
                        record.error_message.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_db(config: Config, command: DbCommands) -> anyhow::Result<()> {
    match command {
        DbCommands::Migrate => {
            let db = Database::new(&config).await?;
            db.migrate().await?;
            println!("Migrations applied");
        }
    }
    Ok(())
}

async fn run_health(config: Config, format: OutputFormat) -> anyhow::Result<()> {
    let database = match Database::new(&config).await {
        Ok(db) => db.health_check().await.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    let model = ModelHandle::empty()
        .reload(&config.model.path)
        .map(|_| ())
        .map_err(|e| e.to_string());

    if format == OutputFormat::Json {
        let report = serde_json::json!({
            "database": database.as_ref().err(),
            "model": model.as_ref().err(),
            "healthy": database.is_ok() && model.is_ok(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("System Health Check");
        println!("-------------------");
        match &database {
            Ok(()) => println!("Database:  ok"),
            Err(e) => println!("Database:  FAILED ({e})"),
        }
        match &model {
            Ok(()) => println!("Model:     ok"),
            Err(e) => println!("Model:     FAILED ({e})"),
        }
    }

    if database.is_err() || model.is_err() {
        anyhow::bail!("health check failed");
    }
    Ok(())
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    use clap_complete::generate;
    use std::io;

    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "churnwatch", &mut io::stdout());
}
