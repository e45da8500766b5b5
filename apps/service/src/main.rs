#![warn(clippy::all)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};
use uptrack::{
    Catalog, CheckKind, DefaultProbeFactory, InspectionScheduler, NewReport, Service,
    StateLogPublisher, StatusService,
};
use uuid::Uuid;

mod config;
mod database;
mod error;
mod pool;

use config::Config;
use database::{DatabaseImpl, initialize_database};
use error::AppError;

#[derive(Debug, Parser)]
#[command(name = "uptrack-service", version, about = "Service health monitoring")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the inspection scheduler until interrupted
    Run,
    /// List tracked services
    Services,
    /// Add a service to the catalog
    AddService {
        #[arg(long)]
        name: String,
        /// URL for http checks, host:port for tcp checks
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "http")]
        kind: CheckKind,
        #[arg(long)]
        university: Option<String>,
    },
    /// Stop tracking a service; its history is kept
    Untrack { service: Uuid },
    /// Show the uptime of a service
    Uptime {
        service: Uuid,
        #[arg(long)]
        json: bool,
    },
    /// Show reports raised during the current outage of a service
    Reports { service: Uuid },
    /// Report a service as online or offline
    Report {
        service: Uuid,
        #[arg(long)]
        issuer: String,
        #[arg(long)]
        content: String,
        /// Claim the service is online (default: offline)
        #[arg(long)]
        online: bool,
    },
    /// Mark a report as solved
    Resolve { service: Uuid, report: i64 },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref())?;
    logger::init_with_level(&config.logging.level);

    if let Command::Config = cli.command {
        print!("{}", config);
        return Ok(());
    }

    let pool = pool::open_pool(&config.database.path, config.database.max_connections).await?;
    {
        let conn = pool.get().await.map_err(anyhow::Error::from)?;
        initialize_database(&conn).await?;
    }
    let database = Arc::new(DatabaseImpl::new_from_pool(pool));
    let status = Arc::new(StatusService::new(database.clone(), database.clone(), database.clone()));

    match cli.command {
        Command::Run => run(&config, database, status).await?,
        Command::Services => {
            for service in database.list_tracked_services().await? {
                println!(
                    "{}  {:<4} {:<32} {}",
                    service.id,
                    service.kind,
                    service.name,
                    service.target
                );
            }
        }
        Command::AddService { name, target, kind, university } => {
            let mut service = Service::new(name, target, kind);
            service.university = university;
            database.save_service(&service).await?;
            println!("{}", service.id);
        }
        Command::Untrack { service } => {
            if !database.set_tracked(service, false).await? {
                return Err(AppError::UnknownService(service));
            }
            println!("{} is no longer tracked", service);
        }
        Command::Uptime { service, json } => match status.uptime_report(service).await? {
            Some(report) if json => {
                println!("{}", serde_json::to_string_pretty(&report).map_err(anyhow::Error::from)?)
            }
            Some(report) => println!(
                "{:.2} ({}s online of {}s, currently {})",
                report.ratio,
                report.online_seconds,
                report.total_seconds,
                if report.is_online { "online" } else { "offline" }
            ),
            None => println!("no history"),
        },
        Command::Reports { service } => {
            for report in status.open_reports(service).await? {
                println!(
                    "#{} {} [{}] {}: {}",
                    report.id.unwrap_or_default(),
                    report.created_at.to_rfc3339(),
                    if report.is_solved { "solved" } else { "open" },
                    report.issuer_id,
                    report.content
                );
            }
        }
        Command::Report { service, issuer, content, online } => {
            let report = status
                .record_report(NewReport {
                    service_id: service,
                    issuer_id: issuer,
                    content,
                    claimed_online: online,
                })
                .await?;
            println!(
                "report #{} recorded ({})",
                report.id.unwrap_or_default(),
                if report.is_solved { "solved" } else { "open" }
            );
        }
        Command::Resolve { service, report } => {
            if !status.resolve_report(service, report).await? {
                return Err(AppError::UnknownReport { service, report });
            }
            println!("report #{} resolved", report);
        }
        // printed before the database was opened
        Command::Config => {}
    }

    Ok(())
}

async fn run(
    config: &Config,
    database: Arc<DatabaseImpl>,
    status: Arc<StatusService>,
) -> Result<(), AppError> {
    let probes = Arc::new(DefaultProbeFactory::new(
        config.monitoring.probe_timeout_seconds,
        config.monitoring.failure_threshold,
    )?);
    let scheduler = InspectionScheduler::new(
        database.clone(),
        database,
        Arc::new(StateLogPublisher::new(status)),
        probes,
        config.monitoring.scheduler(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
            if let Err(e) = handle.await {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
        joined = &mut handle => {
            if let Err(e) = joined {
                warn!("Scheduler task ended abnormally: {}", e);
            }
        }
    }

    Ok(())
}
