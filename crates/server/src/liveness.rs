//! Durable-store liveness probe.
//!
//! The metadata store is the authority for caches and tokens; without it
//! the service can only serve stale fast-tier hits. A background probe
//! pings the store every few seconds and, on the first failure, flips the
//! health flag and triggers a graceful drain. Probes start after a random
//! splay so a fleet restarting together does not ping in lockstep.

use darkroom_metadata::MetadataStore;
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error};

const PROBE_INTERVAL: Duration = Duration::from_millis(2500);

/// Shared health flag read by `/_health`.
#[derive(Default)]
pub struct Liveness {
    unhealthy: AtomicBool,
}

impl Liveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::Relaxed)
    }

    pub fn mark_unhealthy(&self) {
        self.unhealthy.store(true, Ordering::Relaxed);
    }
}

/// Spawn the probe task. On the first failed probe it marks the service
/// unhealthy and fires `drain`, then exits.
pub fn spawn_probe(
    metadata: Arc<dyn MetadataStore>,
    liveness: Arc<Liveness>,
    drain: oneshot::Sender<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let splay = rand::rng().random_range(0..PROBE_INTERVAL.as_millis() as u64);
        tokio::time::sleep(Duration::from_millis(splay)).await;

        loop {
            match metadata.health_check().await {
                Ok(()) => debug!("metadata liveness probe ok"),
                Err(err) => {
                    error!(error = %err, "metadata store unreachable, draining");
                    liveness.mark_unhealthy();
                    let _ = drain.send(());
                    return;
                }
            }
            tokio::time::sleep(PROBE_INTERVAL).await;
        }
    })
}
