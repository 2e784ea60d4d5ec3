use anyhow::{Context, Result};
use common::contracts::{AlertStore, NotificationChannel};
use detection_node::alert::{
    AlertDispatcher, EmailChannel, FsSnapshotStore, MemoryAlertStore, PgAlertStore,
    WebhookChannel, ALERT_QUEUE_DEPTH,
};
use detection_node::api;
use detection_node::classify::HttpClassifier;
use detection_node::session::SessionRegistry;
use detection_node::{AppState, Config};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize telemetry (logging and metrics)
    telemetry::init_with_service("detection-node");

    info!("Starting detection node...");

    // Load configuration from environment
    let config = Config::from_env().context("invalid configuration")?;
    info!(
        "Detection node configuration: bind={}, node_id={}, classifier={}",
        config.bind_addr, config.node_id, config.classifier_url
    );

    // Pick the alert store
    let store: Arc<dyn AlertStore> = match &config.database_url {
        Some(url) => {
            let store = PgAlertStore::connect(url)
                .await
                .context("connecting to alert database")?;
            info!("Alert events persisted to Postgres");
            Arc::new(store)
        }
        None => {
            info!("DATABASE_URL not set, using in-memory alert store");
            Arc::new(MemoryAlertStore::new())
        }
    };

    // Wire up notification channels
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    if let Some(smtp) = config.smtp.clone() {
        info!("Email notifications enabled via {}", smtp.host);
        channels.push(Arc::new(EmailChannel::new(smtp)));
    } else {
        info!("SMTP not configured, email notifications disabled");
    }
    if let Some(url) = config.webhook_url.clone() {
        info!("Webhook notifications enabled");
        channels.push(Arc::new(WebhookChannel::new(url)));
    }

    // Alert side effects run on their own task, off the inference path
    let snapshots = Arc::new(FsSnapshotStore::new(config.snapshot_dir.clone()));
    let dispatcher = AlertDispatcher::new(snapshots, store.clone(), channels);
    let (alert_tx, alert_rx) = mpsc::channel(ALERT_QUEUE_DEPTH);
    let dispatch_cancel = CancellationToken::new();
    let dispatcher_task = dispatcher.spawn(alert_rx, dispatch_cancel.clone());

    // Create application state
    let classifier = Arc::new(HttpClassifier::new(
        &config.classifier_url,
        config.classify_timeout,
    ));
    let registry = SessionRegistry::new(&config, classifier, alert_tx);
    let state = AppState::new(config.clone(), registry, store);
    info!(
        "Camera catalog seeded with {} cameras",
        state.camera_count().await
    );

    // Build HTTP router
    let app = api::router(state.clone());

    // Bind and serve
    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!("Detection node listening on {}", config.bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    // Sessions are already stopped; let the dispatcher drain and exit
    dispatch_cancel.cancel();
    let _ = dispatcher_task.await;

    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }

    info!("Shutting down gracefully...");
    state.shutdown().await;
}
