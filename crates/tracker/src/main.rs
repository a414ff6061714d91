//! `fwtrack-tracker` -- polls the backend for tracked automation jobs.
//!
//! Keeps a job registry in sync with the backend job store and logs every
//! tracker event until interrupted with Ctrl-C. See
//! [`TrackerConfig::from_env`] for the environment variables it reads.

use std::sync::Arc;

use fwtrack_events::{EventBus, TrackerEvent};
use fwtrack_gateway::HttpJobGateway;
use fwtrack_tracker::config::TrackerConfig;
use fwtrack_tracker::registry::JobRegistry;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fwtrack_tracker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = TrackerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let gateway = HttpJobGateway::new(config.backend_url.clone(), config.request_timeout())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        });

    tracing::info!(
        backend_url = %config.backend_url,
        user_id = %config.user_id,
        "Starting fwtrack-tracker",
    );

    let events = Arc::new(EventBus::default());
    let registry = Arc::new(JobRegistry::new(
        Arc::new(gateway),
        Arc::clone(&events),
        config.registry(),
    ));
    let cancel = CancellationToken::new();

    let logger = tokio::spawn(log_events(Arc::clone(&events), cancel.clone()));

    let poller = {
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        tokio::spawn(async move { registry.run(cancel).await })
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
    }
    tracing::info!("Shutdown signal received");
    cancel.cancel();

    let _ = poller.await;
    let _ = logger.await;
    tracing::info!(jobs = registry.len().await, "fwtrack-tracker stopped");
}

/// Log every tracker event until `cancel` fires.
async fn log_events(events: Arc<EventBus>, cancel: CancellationToken) {
    let mut rx = events.subscribe();
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return,
            received = rx.recv() => received,
        };

        match event {
            Ok(TrackerEvent::Notification(n)) => {
                tracing::info!(severity = ?n.severity, "{}", n.message);
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!(event = %json, "Tracker event"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize tracker event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event logger lagged behind");
            }
            Err(RecvError::Closed) => return,
        }
    }
}
