use clap::Parser;
use futures::future::join_all;
use servicewatch::db::{DbRecordStore, MemoryRecordStore, RecordStore};
use servicewatch::monitor::{NetworkProbe, ServiceManager, StatisticsEngine};
use servicewatch::notifications::{NotificationDispatcher, WebhookNotifier};
use servicewatch::server::config::ServerConfig;
use servicewatch::version::VERSION;
use std::sync::Arc;
use tokio::time::{Duration, interval};
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const STATUS_REPORT_INTERVAL_SECONDS: u64 = 60;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Keep records in memory instead of the database
    #[arg(long)]
    memory: bool,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "servicewatch.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    // Log to stdout: human-readable format
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sea_orm=warn,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn report_status(manager: &ServiceManager) {
    let services = manager.registry().all().await;
    let summaries = join_all(services.iter().map(|s| manager.stats().summary(s))).await;
    for (service, summary) in services.iter().zip(summaries) {
        match summary {
            Ok(summary) => info!(
                service_id = summary.id,
                service_name = %summary.name,
                online = summary.online,
                avg_latency_ms = summary.avg_latency,
                uptime_24h = %summary.avg_uptime_24,
                status = %summary.small_text,
                "Service status."
            ),
            Err(e) => warn!(service_id = service.id, error = %e, "Failed to summarize service."),
        }
    }
    let total = manager.services_count().await;
    let online = manager.count_online().await;
    info!(services = total, online, "Status report.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&config.log_dir);
    info!("Starting servicewatch, version: {}", VERSION);

    let store: Arc<dyn RecordStore> = if args.memory {
        warn!("Using the in-memory record store; history is lost on exit.");
        Arc::new(MemoryRecordStore::new())
    } else {
        let database_url = config.database_url()?;
        match DbRecordStore::connect(database_url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                error!(error = %e, "Failed to connect to the database.");
                return Err(e.into());
            }
        }
    };

    let probe = Arc::new(NetworkProbe::new()?.with_default_timeout(config.probe_timeout()));

    let mut notifier = NotificationDispatcher::new();
    if let Some(webhook) = config.webhook.clone() {
        info!(url = %webhook.url, "Webhook notifications enabled.");
        notifier = notifier.with_notifier(Arc::new(WebhookNotifier::new(webhook)?));
    }
    if notifier.is_empty() {
        info!("No notifiers configured.");
    } else {
        info!(notifiers = notifier.len(), "Notifications configured.");
    }

    let stats = StatisticsEngine::new(store.clone())
        .with_limited_window(config.limited_window)
        .with_timezone(config.timezone());
    let manager = Arc::new(ServiceManager::new(store, probe, notifier, stats));

    let loaded = manager.load_all().await?;
    info!(count = loaded, "Checking services.");

    let reporter_manager = manager.clone();
    let reporter = tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(STATUS_REPORT_INTERVAL_SECONDS));
        interval.tick().await;
        loop {
            interval.tick().await;
            report_status(&reporter_manager).await;
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    reporter.abort();
    manager.shutdown().await;
    Ok(())
}
