use crate::{fs_watch, load_file, Error, ReloadMetrics, SharedPolicy};
use futures::StreamExt;
use std::{path::PathBuf, time::Duration};
use tokio::time;

/// Keeps a [`SharedPolicy`] in sync with the document on disk.
#[derive(Clone, Debug)]
pub struct Reloader {
    path: PathBuf,
    interval: Duration,
    policy: SharedPolicy,
    metrics: ReloadMetrics,
}

// === impl Reloader ===

impl Reloader {
    pub fn new(
        path: impl Into<PathBuf>,
        interval: Duration,
        policy: SharedPolicy,
        metrics: ReloadMetrics,
    ) -> Self {
        Self {
            path: path.into(),
            interval,
            policy,
            metrics,
        }
    }

    /// Loads the document and publishes it if it is valid. On failure, the
    /// generation in effect is left untouched.
    pub fn reload(&self) -> Result<(), Error> {
        self.metrics.attempted();
        match load_file(&self.path) {
            Ok(generation) => {
                tracing::debug!(
                    namespaces = generation.namespace_overrides(),
                    names = generation.name_overrides(),
                    "Publishing policy"
                );
                self.policy.publish(generation);
                Ok(())
            }
            Err(error) => {
                self.metrics.failed();
                Err(error)
            }
        }
    }

    /// Reloads the policy whenever the document changes or the refresh
    /// interval elapses, until shutdown is signaled.
    pub async fn run(self, shutdown: drain::Watch) {
        let mut changes = fs_watch::changes(&self.path);

        let mut refresh = time::interval_at(time::Instant::now() + self.interval, self.interval);
        refresh.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let shutdown = shutdown.signaled();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = refresh.tick() => tracing::trace!("Refresh interval elapsed"),
                Some(()) = changes.next() => tracing::debug!("Policy file changed"),
                _release = &mut shutdown => {
                    tracing::debug!("Shutdown signaled");
                    return;
                }
            }

            match self.reload() {
                Ok(()) => tracing::debug!(path = ?self.path, "Reloaded policy"),
                Err(error) => {
                    tracing::error!(%error, path = ?self.path, "Failed to reload policy, keeping previous policy")
                }
            }
        }
    }
}
