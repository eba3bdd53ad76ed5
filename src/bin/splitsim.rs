//! Fleet convergence simulator
//!
//! Runs several splitters over one shared in-memory store in a single
//! process, so convergence and churn behavior can be watched live.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use podsplit_core::config::SplitterConfig;
use podsplit_core::metrics::{self, PromSink};
use podsplit_core::scheduler::{run_sync_loop, ShutdownSignal};
use podsplit_core::splitter::Splitter;
use podsplit_core::store::InMemoryStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    info!("Starting podsplit fleet simulator");

    // Load configuration from environment
    let pods: usize = std::env::var("PODS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3);
    let delay_ms: u64 = std::env::var("SYNC_DELAY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1_000);
    let group = std::env::var("GROUP_NAME").unwrap_or_else(|_| "splitter".into());

    let config = SplitterConfig {
        delay: Duration::from_millis(delay_ms),
        max_unused: Duration::from_millis(delay_ms * 4),
        group,
        ..Default::default()
    };

    let store = Arc::new(InMemoryStore::new(config.max_unused));
    let shutdown = ShutdownSignal::new();

    let mut splitters = Vec::with_capacity(pods);
    let mut handles = Vec::with_capacity(pods);
    for _ in 0..pods {
        let splitter = Arc::new(Splitter::new(
            config.clone(),
            store.clone(),
            Arc::new(PromSink),
        )?);
        handles.push(tokio::spawn(run_sync_loop(
            splitter.clone(),
            shutdown.clone(),
        )));
        splitters.push(splitter);
    }

    info!("Spawned {} pods in group {}", pods, config.group);

    // Metrics endpoint
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(|| async { metrics::gather_metrics() }))
            .layer(CorsLayer::permissive());

        let addr = SocketAddr::from(([0, 0, 0, 0], 9100));
        info!("Metrics listening on {}", addr);

        if let Err(e) = axum::serve(tokio::net::TcpListener::bind(addr).await.unwrap(), app).await {
            warn!("Metrics server error: {}", e);
        }
    });

    // Periodic fleet report
    {
        let splitters = splitters.clone();
        let delay = config.delay;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(delay * 2);
            loop {
                ticker.tick().await;
                let fleet = splitters.iter().map(|s| s.count()).max().unwrap_or(0);
                metrics::GLOBAL.set_fleet_size(i64::from(fleet));
                let assignments: Vec<String> =
                    splitters.iter().map(|s| s.to_string()).collect();
                info!("fleet: {}", assignments.join(" "));
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    shutdown.trigger();
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}
