// ABOUTME: Health gating for canaries and dependencies.
// ABOUTME: Deadline computation and a sleep-between-polls wait on container state.

use std::time::Duration;
use tokio::time::Instant;

use super::host::{ContainerProbe, probe_container};
use super::{Cancellation, DeployError};
use crate::remote::RemoteOps;
use crate::stack::HealthSpec;

/// Added to `retries × interval` to cover container start-up.
pub const HEALTH_BUFFER: Duration = Duration::from_secs(30);

/// Upper bound on any health deadline.
pub const MAX_HEALTH_DEADLINE: Duration = Duration::from_secs(300);

/// Poll interval when no health check is declared.
pub const UNCHECKED_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a container gets to become healthy.
///
/// `retries × interval + 30s`, capped at five minutes; a flat 30s without a
/// health check.
pub fn health_deadline(spec: Option<&HealthSpec>) -> Duration {
    match spec {
        Some(spec) => spec
            .interval
            .saturating_mul(spec.retries)
            .saturating_add(HEALTH_BUFFER)
            .min(MAX_HEALTH_DEADLINE),
        None => HEALTH_BUFFER,
    }
}

/// Why a wait on a container ended without success.
#[derive(Debug)]
pub enum WaitFailure {
    /// The deadline passed; carries the last probe seen, if any.
    TimedOut(Option<ContainerProbe>),
    /// The check reported a state it can never leave.
    Failed(ContainerProbe),
    Cancelled,
}

/// Outcome of checking one probe.
pub enum Check {
    Ready,
    Pending,
    Failed,
}

/// Poll `container` until `check` says it is ready.
///
/// Polls immediately, then every `interval` until `deadline` has elapsed. A
/// probe that errors counts as not ready; it does not end the wait early.
pub async fn wait_for_container<R, F>(
    remote: &R,
    container: &str,
    interval: Duration,
    deadline: Duration,
    cancel: &Cancellation,
    check: F,
) -> Result<ContainerProbe, WaitFailure>
where
    R: RemoteOps + ?Sized,
    F: Fn(&ContainerProbe) -> Check,
{
    let started = Instant::now();
    let mut last = None;
    let mut polls = 0u32;

    loop {
        polls += 1;
        match probe_container(remote, container).await {
            Ok(Some(probe)) => match check(&probe) {
                Check::Ready => {
                    tracing::debug!("{} ready after {} poll(s)", container, polls);
                    return Ok(probe);
                }
                Check::Failed => return Err(WaitFailure::Failed(probe)),
                Check::Pending => last = Some(probe),
            },
            Ok(None) => tracing::debug!("{} not found yet", container),
            Err(e) => tracing::warn!("Health poll of {} failed: {}", container, e),
        }

        let elapsed = started.elapsed();
        if elapsed >= deadline {
            return Err(WaitFailure::TimedOut(last));
        }

        let pause = interval.min(deadline - elapsed);
        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel.cancelled() => return Err(WaitFailure::Cancelled),
        }
    }
}

/// Wait for a canary to pass its health check, or just to run without one.
pub async fn wait_for_canary<R: RemoteOps + ?Sized>(
    remote: &R,
    container: &str,
    spec: Option<&HealthSpec>,
    cancel: &Cancellation,
) -> Result<(), DeployError> {
    let deadline = health_deadline(spec);
    let interval = spec.map_or(UNCHECKED_POLL_INTERVAL, |spec| spec.interval);
    let health_checked = spec.is_some();

    tracing::info!(
        "Waiting up to {}s for {} to become healthy",
        deadline.as_secs(),
        container
    );

    let result = wait_for_container(remote, container, interval, deadline, cancel, |probe| {
        let ready = if health_checked {
            probe.is_healthy()
        } else {
            probe.is_running()
        };
        if ready { Check::Ready } else { Check::Pending }
    })
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(WaitFailure::Cancelled) => Err(DeployError::Cancelled),
        Err(WaitFailure::TimedOut(_) | WaitFailure::Failed(_)) => {
            Err(DeployError::CanaryHealthTimeout {
                container: container.to_string(),
                deadline,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(retries: u32, interval_secs: u64) -> HealthSpec {
        HealthSpec {
            command: "true".to_string(),
            interval: Duration::from_secs(interval_secs),
            timeout: Duration::from_secs(5),
            retries,
            path: None,
        }
    }

    #[test]
    fn deadline_adds_buffer_to_retry_window() {
        assert_eq!(health_deadline(Some(&spec(3, 30))), Duration::from_secs(120));
        assert_eq!(health_deadline(Some(&spec(2, 10))), Duration::from_secs(50));
    }

    #[test]
    fn deadline_is_capped() {
        assert_eq!(health_deadline(Some(&spec(10, 60))), MAX_HEALTH_DEADLINE);
        assert_eq!(health_deadline(Some(&spec(u32::MAX, 3600))), MAX_HEALTH_DEADLINE);
    }

    #[test]
    fn deadline_without_healthcheck_is_flat() {
        assert_eq!(health_deadline(None), Duration::from_secs(30));
    }
}
