use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use api_monitor::{
    actors::{DispatcherHandle, ProberHandle, RetentionHandle, retention::CLEANUP_INTERVAL},
    alerts::AlertDispatcher,
    api::{ApiServerConfig, ApiState, spawn_api_server},
    config::{Config, NotifierConfig, StorageConfig, read_config_file},
    notify::{DiscordNotifier, FanoutNotifier, Notifier, WebhookNotifier},
    prober::{ProbeInvocation, Prober},
    queue::{FailureQueue, MemoryQueue, sqlite::SqliteQueue},
    storage::{MemoryStore, MetricsStore, sqlite::SqliteStore},
    util::{get_addr, get_log_level, get_port},
    writer::MetricsWriter,
};
use clap::Parser;
use tracing::{debug, info, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let level = get_log_level();
    let filter = filter::Targets::new().with_targets(vec![
        ("api_monitor", level),
        ("monitor_hub", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

struct Backends {
    store: Arc<dyn MetricsStore>,
    queue: Arc<dyn FailureQueue>,
    retention: Option<RetentionHandle>,
}

async fn open_backends(config: &Config) -> anyhow::Result<Backends> {
    let policy = config.queue.policy();

    match &config.storage {
        StorageConfig::None => {
            warn!("storage backend is `none`: records and queued failures are kept in memory only");
            Ok(Backends {
                store: Arc::new(MemoryStore::new()),
                queue: Arc::new(MemoryQueue::new(policy)),
                retention: None,
            })
        }
        StorageConfig::Sqlite {
            path,
            retention_days,
        } => {
            let store = SqliteStore::new(path)
                .await
                .with_context(|| format!("failed to open database {}", path.display()))?;
            let queue = SqliteQueue::new(store.pool(), policy);
            let store: Arc<dyn MetricsStore> = Arc::new(store);

            debug!("retention: {} days", retention_days);
            let retention = RetentionHandle::spawn(store.clone(), *retention_days, CLEANUP_INTERVAL);

            Ok(Backends {
                store,
                queue: Arc::new(queue),
                retention: Some(retention),
            })
        }
    }
}

fn build_notifier(config: &Config) -> FanoutNotifier {
    let client = reqwest::Client::new();

    let subscribers = config
        .notifiers
        .iter()
        .enumerate()
        .map(|(i, notifier)| -> Arc<dyn Notifier> {
            match notifier {
                NotifierConfig::Webhook(webhook) => Arc::new(WebhookNotifier::new(
                    client.clone(),
                    webhook.name.clone().unwrap_or_else(|| format!("webhook-{i}")),
                    webhook.url.clone(),
                )),
                NotifierConfig::Discord(discord) => Arc::new(DiscordNotifier::new(
                    client.clone(),
                    discord.name.clone().unwrap_or_else(|| format!("discord-{i}")),
                    discord.url.clone(),
                    discord.user_id.clone(),
                )),
            }
        })
        .collect();

    FanoutNotifier::new(subscribers)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    let Backends {
        store,
        queue,
        retention,
    } = open_backends(&config).await?;

    let notifier = build_notifier(&config);
    if notifier.is_empty() {
        warn!("no notifiers configured, alerts will only be logged");
    }
    let dispatcher = Arc::new(AlertDispatcher::new(
        Arc::new(notifier),
        config.alerts.clone(),
    ));
    let dispatcher = DispatcherHandle::spawn(
        queue.clone(),
        dispatcher,
        config.queue.batch_size,
        Duration::from_secs(config.queue.poll_interval),
    );

    let invocation = ProbeInvocation::new(
        Prober::new().context("failed to build HTTP client")?,
        MetricsWriter::new(store.clone()),
        queue,
    );
    let probers: Vec<ProberHandle> = config
        .targets
        .iter()
        .map(|target| {
            debug!("probing {} every {}s", target.url, target.interval);
            ProberHandle::spawn(
                target.target(),
                invocation.clone(),
                Duration::from_secs(target.interval),
            )
        })
        .collect();
    info!("monitoring {} targets", probers.len());

    let api_config = ApiServerConfig {
        bind_addr: SocketAddr::new(get_addr(config.api.bind), get_port(config.api.port)),
        enable_cors: config.api.enable_cors,
    };
    spawn_api_server(api_config, ApiState::new(store.clone())).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutting down");

    // Every actor has exited once these return, so nothing writes to the
    // store after it is closed
    futures::future::join_all(probers.into_iter().map(ProberHandle::shutdown)).await;
    dispatcher.shutdown().await;
    if let Some(retention) = retention {
        retention.shutdown().await;
    }
    store.close().await?;

    Ok(())
}
