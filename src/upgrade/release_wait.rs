//! Waiting for the target executable to be released.
//!
//! YMU may still be running, or shutting down, when the updater starts. The
//! wait loop probes the file, asks the process locator to stop any running
//! instance, and gives up at a wall-clock deadline. Nothing on disk is
//! modified here.

use crate::config::UpdaterConfig;
use crate::core::UpdateError;
use crate::lock_probe::LockProbe;
use crate::process::ProcessLocator;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Timing parameters for [`wait_for_release`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseWaitPolicy {
    /// Give up once this much time has passed.
    pub deadline: Duration,
    /// Sleep between probes.
    pub poll_interval: Duration,
    /// Time a terminated instance gets before it is killed.
    pub grace_period: Duration,
}

impl Default for ReleaseWaitPolicy {
    fn default() -> Self {
        Self::from_config(&UpdaterConfig::default())
    }
}

impl ReleaseWaitPolicy {
    /// Build the policy from configuration.
    pub fn from_config(config: &UpdaterConfig) -> Self {
        Self {
            deadline: config.lock_wait_timeout(),
            poll_interval: config.lock_poll_interval(),
            grace_period: config.termination_grace(),
        }
    }
}

/// Wait until `target` is no longer held by another process.
///
/// Each round probes the file; while it is locked and the locator sees a
/// running instance, that instance is terminated. Returns how long the wait
/// took.
///
/// # Errors
///
/// Returns [`UpdateError::LockTimeout`] once `policy.deadline` has elapsed
/// with the file still locked. The error is never returned earlier.
pub async fn wait_for_release(
    target: &Path,
    probe: Arc<dyn LockProbe>,
    locator: Arc<dyn ProcessLocator>,
    policy: ReleaseWaitPolicy,
) -> Result<Duration, UpdateError> {
    let start = Instant::now();
    debug!(
        strategy = %probe.strategy(),
        deadline = ?policy.deadline,
        "Waiting for {} to be released",
        target.display()
    );
    if locator.is_degraded() {
        warn!("Cannot enumerate processes; waiting on the file lock alone");
    }

    let mut terminated = false;
    loop {
        if !probe_once(&probe, target).await {
            let waited = start.elapsed();
            debug!(?waited, "Target is free");
            return Ok(waited);
        }

        let elapsed = start.elapsed();
        if elapsed >= policy.deadline {
            warn!(waited = ?elapsed, "Target still locked at deadline");
            return Err(UpdateError::LockTimeout {
                path: target.to_path_buf(),
                waited: elapsed,
            });
        }

        if !locator.is_degraded() && terminate_running(&locator, policy.grace_period).await {
            if !terminated {
                info!("Closed running instance of {}", target.display());
            }
            terminated = true;
        }

        let remaining = policy.deadline.saturating_sub(start.elapsed());
        if !remaining.is_zero() {
            tokio::time::sleep(policy.poll_interval.min(remaining)).await;
        }
    }
}

async fn probe_once(probe: &Arc<dyn LockProbe>, target: &Path) -> bool {
    let probe = Arc::clone(probe);
    let target = target.to_path_buf();
    tokio::task::spawn_blocking(move || probe.is_locked(&target))
        .await
        .unwrap_or(true)
}

async fn terminate_running(locator: &Arc<dyn ProcessLocator>, grace_period: Duration) -> bool {
    let locator = Arc::clone(locator);
    tokio::task::spawn_blocking(move || {
        locator.is_target_running() && locator.terminate_target(grace_period)
    })
    .await
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeLocator, FakeLockProbe};

    fn policy(deadline_secs: u64) -> ReleaseWaitPolicy {
        ReleaseWaitPolicy {
            deadline: Duration::from_secs(deadline_secs),
            poll_interval: Duration::from_millis(500),
            grace_period: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_free_file_returns_immediately() {
        let probe = Arc::new(FakeLockProbe::unlocked());
        let locator = Arc::new(FakeLocator::idle());

        let waited =
            wait_for_release(Path::new("ymu.exe"), probe.clone(), locator.clone(), policy(15))
                .await
                .unwrap();

        assert_eq!(waited, Duration::ZERO);
        assert_eq!(probe.checks(), 1);
        assert_eq!(locator.terminations(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_instance_is_terminated() {
        let probe = Arc::new(FakeLockProbe::locked_for(2));
        let locator = Arc::new(FakeLocator::running());

        let waited =
            wait_for_release(Path::new("ymu.exe"), probe.clone(), locator.clone(), policy(15))
                .await
                .unwrap();

        assert_eq!(locator.terminations(), 1);
        assert_eq!(probe.checks(), 3);
        assert_eq!(waited, Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_at_deadline_not_before() {
        let probe = Arc::new(FakeLockProbe::always_locked());
        let locator = Arc::new(FakeLocator::idle());
        let start = Instant::now();

        let err = wait_for_release(Path::new("ymu.exe"), probe, locator, policy(15))
            .await
            .unwrap_err();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(15));
        assert!(elapsed < Duration::from_secs(16));
        match err {
            UpdateError::LockTimeout { waited, .. } => assert!(waited >= Duration::from_secs(15)),
            other => panic!("expected LockTimeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_just_before_deadline_succeeds() {
        // Probes run every 500ms; the 30th, at 14.5s, finds the file free.
        let probe = Arc::new(FakeLockProbe::locked_for(29));
        let locator = Arc::new(FakeLocator::idle());

        let waited = wait_for_release(Path::new("ymu.exe"), probe, locator, policy(15))
            .await
            .unwrap();
        assert_eq!(waited, Duration::from_millis(14_500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_locator_is_not_asked_to_terminate() {
        let probe = Arc::new(FakeLockProbe::locked_for(1));
        let locator = Arc::new(FakeLocator::degraded());

        wait_for_release(Path::new("ymu.exe"), probe, locator.clone(), policy(15))
            .await
            .unwrap();
        assert_eq!(locator.terminations(), 0);
    }
}
