//! Readiness gate — waits for the container backend to reach a running
//! replica threshold.
//!
//! The gate polls `CapacityController::get_state` once immediately and
//! then once per interval until `running >= threshold`, the deadline
//! passes, or shutdown is signalled. Consecutive unavailability errors
//! are counted; hitting the failure budget ends the wait with an error
//! instead of polling a broken dependency forever. A single successful
//! read resets the count.

use std::sync::Arc;
use std::time::Duration;

use switchyard_core::{BackendId, CapacityState};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capacity::CapacityController;
use crate::error::MigrationError;

/// Outcome of a readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The threshold was met; carries the state that met it.
    Ready(CapacityState),
    /// The deadline passed first; carries the last successful read.
    TimedOut(Option<CapacityState>),
    /// Capacity reads kept failing, or the wait was cancelled.
    Failed(MigrationError),
}

pub struct ReadinessGate {
    capacity: Arc<dyn CapacityController>,
    interval: Duration,
    max_failures: u32,
}

impl ReadinessGate {
    pub fn new(capacity: Arc<dyn CapacityController>, interval: Duration, max_failures: u32) -> Self {
        Self {
            capacity,
            interval,
            max_failures: max_failures.max(1),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Poll until `backend` has at least `threshold` running replicas.
    pub async fn wait_until_ready(
        &self,
        backend: BackendId,
        threshold: u32,
        deadline: Instant,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> Readiness {
        let mut failures = 0u32;
        let mut last = None;
        let mut polls = 0u32;

        loop {
            polls += 1;
            // Reads have no side effects, so an in-flight read is dropped
            // as soon as shutdown or the deadline wins.
            let polled = tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    info!(%backend, polls, "readiness wait cancelled");
                    return Readiness::Failed(MigrationError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(%backend, polls, threshold, "readiness deadline expired");
                    return Readiness::TimedOut(last);
                }
                polled = self.capacity.get_state(backend) => polled,
            };

            match polled {
                Ok(state) => {
                    failures = 0;
                    last = Some(state);
                    debug!(
                        %backend,
                        poll = polls,
                        desired = state.desired,
                        running = state.running,
                        threshold,
                        "readiness poll"
                    );
                    if state.meets(threshold) {
                        info!(%backend, polls, running = state.running, "backend ready");
                        return Readiness::Ready(state);
                    }
                }
                Err(e) if e.is_unavailable() => {
                    failures += 1;
                    warn!(
                        %backend,
                        error = %e,
                        failures,
                        budget = self.max_failures,
                        "capacity read failed"
                    );
                    if failures >= self.max_failures {
                        return Readiness::Failed(e);
                    }
                }
                Err(e) => return Readiness::Failed(e),
            }

            tokio::select! {
                biased;
                _ = shutdown_requested(shutdown) => {
                    info!(%backend, polls, "readiness wait cancelled");
                    return Readiness::Failed(MigrationError::Cancelled);
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(%backend, polls, threshold, "readiness deadline expired");
                    return Readiness::TimedOut(last);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Resolves once shutdown is signalled (or its sender is gone). Never
/// resolves without a shutdown channel.
pub(crate) async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCapacity, Poll};

    fn gate(fake: &Arc<FakeCapacity>, interval: Duration) -> ReadinessGate {
        ReadinessGate::new(fake.clone(), interval, 3)
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_fourth_poll() {
        let fake = Arc::new(FakeCapacity::running(&[0, 1, 2, 3]));
        let gate = gate(&fake, Duration::ZERO);

        let deadline = Instant::now() + Duration::from_secs(1);
        let outcome = gate
            .wait_until_ready(BackendId::Container, 3, deadline, &mut None)
            .await;

        assert!(matches!(outcome, Readiness::Ready(s) if s.running == 3));
        assert_eq!(fake.polls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_on_the_configured_interval() {
        let fake = Arc::new(FakeCapacity::running(&[0, 1, 2, 3]));
        let gate = gate(&fake, Duration::from_secs(5));

        let start = Instant::now();
        let outcome = gate
            .wait_until_ready(BackendId::Container, 3, start + Duration::from_secs(50), &mut None)
            .await;

        assert!(matches!(outcome, Readiness::Ready(_)));
        // First poll is immediate, then three 5s waits.
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_threshold_never_met() {
        let fake = Arc::new(FakeCapacity::running(&[0, 1, 2]));
        let gate = gate(&fake, Duration::from_secs(5));

        let start = Instant::now();
        let outcome = gate
            .wait_until_ready(BackendId::Container, 3, start + Duration::from_secs(20), &mut None)
            .await;

        assert_eq!(
            outcome,
            Readiness::TimedOut(Some(CapacityState { desired: 0, running: 2 }))
        );
        assert_eq!(start.elapsed(), Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn three_consecutive_failures_end_the_wait() {
        let fake = Arc::new(FakeCapacity::scripted([
            Poll::Unavailable,
            Poll::Unavailable,
            Poll::Unavailable,
            Poll::Running(3),
        ]));
        let gate = gate(&fake, Duration::from_secs(1));

        let outcome = gate
            .wait_until_ready(
                BackendId::Container,
                3,
                Instant::now() + Duration::from_secs(60),
                &mut None,
            )
            .await;

        assert!(matches!(
            outcome,
            Readiness::Failed(MigrationError::CapacityUnavailable(_))
        ));
        assert_eq!(fake.polls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_count() {
        let fake = Arc::new(FakeCapacity::scripted([
            Poll::Unavailable,
            Poll::Unavailable,
            Poll::Running(1),
            Poll::Unavailable,
            Poll::Unavailable,
            Poll::Running(3),
        ]));
        let gate = gate(&fake, Duration::from_secs(1));

        let outcome = gate
            .wait_until_ready(
                BackendId::Container,
                3,
                Instant::now() + Duration::from_secs(60),
                &mut None,
            )
            .await;

        assert!(matches!(outcome, Readiness::Ready(_)));
        assert_eq!(fake.polls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_promptly() {
        let fake = Arc::new(FakeCapacity::running(&[0]));
        let gate = gate(&fake, Duration::from_secs(5));
        let (tx, rx) = watch::channel(false);
        let mut shutdown = Some(rx);

        let start = Instant::now();
        let wait = gate.wait_until_ready(
            BackendId::Container,
            3,
            start + Duration::from_secs(300),
            &mut shutdown,
        );
        let signal = async {
            tokio::time::sleep(Duration::from_secs(7)).await;
            tx.send(true).unwrap();
        };
        let (outcome, ()) = tokio::join!(wait, signal);

        assert_eq!(outcome, Readiness::Failed(MigrationError::Cancelled));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
        assert_eq!(fake.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn function_backend_read_fails_immediately() {
        let store = switchyard_state::StateStore::open_in_memory().unwrap();
        let capacity = Arc::new(crate::capacity::StoreCapacity::new(store, "route1"));
        let gate = ReadinessGate::new(capacity, Duration::from_secs(1), 3);

        let outcome = gate
            .wait_until_ready(
                BackendId::Function,
                1,
                Instant::now() + Duration::from_secs(60),
                &mut None,
            )
            .await;
        assert!(matches!(
            outcome,
            Readiness::Failed(MigrationError::InvalidRequest(_))
        ));
    }
}
