use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::QueueResult;

#[cfg(feature = "postgres")]
use super::postgres::PostgresBackend;

/// Periodic visibility-timeout sweep for the Postgres backend, run
/// alongside the worker pool per spec §4.1/§6.3. See
/// [`super::memory::LeaseReaper`] for the equivalent over `MemoryBackend`.
#[cfg(feature = "postgres")]
pub struct PostgresSweeper {
    backend: PostgresBackend,
    interval: Duration,
}

#[cfg(feature = "postgres")]
impl PostgresSweeper {
    pub fn new(backend: PostgresBackend) -> Self {
        Self {
            backend,
            interval: Duration::from_secs(30),
        }
    }

    pub fn with_interval(backend: PostgresBackend, interval: Duration) -> Self {
        Self { backend, interval }
    }

    /// Run the sweep loop forever. Intended to be spawned as its own task.
    pub async fn start(self) -> QueueResult<()> {
        let mut ticker = interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "starting postgres lease sweep");

        loop {
            ticker.tick().await;
            match self.backend.reap_expired_leases().await {
                Ok(n) if n > 0 => info!(reclaimed = n, "reclaimed expired leases"),
                Ok(_) => debug!("sweep found no expired leases"),
                Err(e) => warn!(error = %e, "lease sweep failed"),
            }
        }
    }
}
