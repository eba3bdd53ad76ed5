//! Sync scheduling harness
//!
//! Drives a splitter at a fixed cadence and fans a shutdown signal out to
//! every pod loop.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};

use crate::splitter::Splitter;

/// Broadcast-based shutdown signal shared by all sync loops
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: broadcast::Sender<()>,
}

impl ShutdownSignal {
    /// Create a new shutdown signal
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }

    /// Stop every loop subscribed to this signal
    pub fn trigger(&self) {
        let _ = self.sender.send(());
    }

    /// Create a new receiver for this signal
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `splitter.sync()` every `config.delay` until shutdown.
///
/// Each sync is awaited to completion before the next tick fires, so one
/// pod never runs two reconciliations concurrently. An in-flight store
/// call is dropped when shutdown wins the race; the pod would follow the
/// normal reset path if resumed.
pub async fn run_sync_loop(splitter: Arc<Splitter>, shutdown: ShutdownSignal) {
    let mut ticker = interval(splitter.config().delay);
    let mut stop = shutdown.subscribe();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                splitter.sync().await;
                debug!("sync tick complete: {}", splitter);
            }
            _ = stop.recv() => {
                info!("sync loop stopping: {}", splitter);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SplitterConfig;
    use crate::metrics::NoopSink;
    use crate::store::InMemoryStore;
    use std::time::Duration;

    fn quick_config() -> SplitterConfig {
        SplitterConfig {
            delay: Duration::from_millis(10),
            max_unused: Duration::from_millis(40),
            full_scan_count: 0,
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_syncs_and_stops() {
        let config = quick_config();
        let store = Arc::new(InMemoryStore::new(config.max_unused));
        let splitter = Arc::new(
            Splitter::new(config, store, Arc::new(NoopSink)).expect("valid config"),
        );

        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(run_sync_loop(splitter.clone(), shutdown.clone()));

        // First tick fires immediately; the lone pod claims ordinal 1.
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(splitter.num(), 1);

        shutdown.trigger();
        handle.await.expect("loop exits cleanly");
    }

    #[tokio::test]
    async fn test_trigger_reaches_every_subscriber() {
        let shutdown = ShutdownSignal::new();
        let mut first = shutdown.subscribe();
        let mut second = shutdown.clone().subscribe();

        shutdown.trigger();
        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }
}
