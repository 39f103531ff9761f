// ABOUTME: Periodic poll loop asking the release source for the newest release.
// ABOUTME: Fetch errors are logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use crate::source::ReleaseSource;
use crate::supervisor::ReleaseSupervisor;

/// Drives the supervisor from the external release feed.
pub struct ReleaseFeed {
    source: Arc<dyn ReleaseSource>,
    supervisor: Arc<ReleaseSupervisor>,
    poll_interval: Duration,
}

impl ReleaseFeed {
    pub fn new(
        source: Arc<dyn ReleaseSource>,
        supervisor: Arc<ReleaseSupervisor>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            source,
            supervisor,
            poll_interval,
        }
    }

    /// Polls forever. Runs until the owning task is dropped, which is how
    /// the binary shuts the loop down on interrupt.
    pub async fn run(&self) {
        loop {
            match self.source.latest_release().await {
                Ok(Some(release)) => {
                    self.supervisor.enqueue(release);
                }
                Ok(None) => tracing::debug!("no release published yet"),
                Err(err) => tracing::error!("unable to poll latest release: {err}"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
