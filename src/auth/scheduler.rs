// Background token refresh loop

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::AuthManager;

/// Default time between two checks (10 minutes)
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(600);

/// Default refresh margin before expiry, in seconds (30 minutes)
pub const DEFAULT_REFRESH_THRESHOLD_SECS: i64 = 1800;

/// What the expiry check of one cycle did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Pair is outside the refresh margin
    Fresh,
    /// New pair persisted and published
    Refreshed,
    /// Refresh attempted and failed; old pair kept
    Failed,
    /// No credentials on disk yet
    Unregistered,
}

/// Result of the informational verify call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    Accepted,
    Rejected,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub refresh: RefreshOutcome,
    pub verify: VerifyOutcome,
}

/// Periodically refreshes tokens before they expire
pub struct RefreshScheduler {
    manager: Arc<AuthManager>,

    /// Idle time between two checks
    poll_interval: std::time::Duration,

    /// Refresh once the pair expires within this margin
    refresh_threshold: Duration,
}

impl RefreshScheduler {
    pub fn new(
        manager: Arc<AuthManager>,
        poll_interval: std::time::Duration,
        refresh_threshold: Duration,
    ) -> Self {
        Self {
            manager,
            poll_interval,
            refresh_threshold,
        }
    }

    /// Scheduler with the default 10 minute poll and 30 minute margin
    pub fn with_defaults(manager: Arc<AuthManager>) -> Self {
        Self::new(
            manager,
            DEFAULT_POLL_INTERVAL,
            Duration::seconds(DEFAULT_REFRESH_THRESHOLD_SECS),
        )
    }

    /// Run one check: refresh if inside the margin, then verify
    ///
    /// Failures are logged and never change the current pair.
    pub async fn run_cycle(&self) -> CycleReport {
        let tokens = self.manager.current().await;

        let refresh = if !tokens.is_registered() {
            tracing::warn!("No market tokens stored, register the appliance first");
            RefreshOutcome::Unregistered
        } else if tokens.expires_within(self.refresh_threshold) {
            tracing::info!(
                "Market tokens expire at {}, refreshing...",
                tokens.expires.to_rfc3339()
            );
            match self.manager.refresh().await {
                Ok(_) => RefreshOutcome::Refreshed,
                Err(e) => {
                    // Try again on the next poll
                    tracing::warn!("Got an error when refreshing tokens: {}", e);
                    RefreshOutcome::Failed
                }
            }
        } else {
            tracing::debug!(
                "Market tokens still fresh ({}s left)",
                tokens.remaining().num_seconds()
            );
            RefreshOutcome::Fresh
        };

        // Informational only: a rejected token is not refreshed early
        let verify = match self.manager.verify().await {
            Ok(()) => VerifyOutcome::Accepted,
            Err(e) if e.is_validation() => {
                tracing::warn!("Market rejected the access token: {}", e);
                VerifyOutcome::Rejected
            }
            Err(e) => {
                tracing::warn!("Could not verify access token: {}", e);
                VerifyOutcome::Unreachable
            }
        };

        CycleReport { refresh, verify }
    }

    /// Loop until `cancel` fires
    ///
    /// Cancellation is only observed while idle; a running cycle completes.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "Token refresh loop started (poll every {}s, refresh {}s before expiry)",
            self.poll_interval.as_secs(),
            self.refresh_threshold.num_seconds()
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let report = self.run_cycle().await;
            tracing::debug!(?report, "Token refresh cycle finished");
        }

        tracing::info!("Token refresh loop stopped");
    }

    /// Start the loop on the tokio runtime
    pub fn spawn(self, cancel: CancellationToken) -> RefreshHandle {
        let task = tokio::spawn(self.run(cancel.clone()));
        RefreshHandle { cancel, task }
    }
}

/// Handle to a running refresh loop
pub struct RefreshHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Ask the loop to stop; safe to call more than once
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for the current cycle to finish
    pub async fn shutdown(self) {
        self.stop();
        if let Err(e) = self.task.await {
            tracing::error!("Token refresh loop panicked: {}", e);
        }
    }
}
