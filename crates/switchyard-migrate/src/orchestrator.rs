//! Migration orchestrator — drives one route's cutover state machine.
//!
//! ```text
//! Start → SelectBranch ─┬─ ToContainer: Hydrate → AwaitReady → Cutover ─┐
//!                       ├─ ToFunction:  Cutover → Drain ────────────────┼→ Committed → Succeeded
//!                       ├─ function active, container reserved → Drain ─┘
//!                       └─ target already exclusively active ───────────────────────→ Succeeded
//! ```
//!
//! A function target whose routing is already exclusive still drains any
//! container capacity left reserved by an earlier failed drain or an
//! abandoned hydrate, so re-issuing the request retries the release.
//!
//! Hydration commits capacity first and routing last; a cutover to the
//! function backend commits routing first and drains capacity after. Any
//! failure therefore leaves traffic on a backend that can serve it.
//!
//! Transitions are a pure function of `(Phase, Event)`; the orchestrator
//! executes the side effect for the current phase and feeds the outcome
//! back in as the next event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::{
    BackendId, MigrationRequest, MigrationSettings, RouteId, RoutePools, WeightSplit,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::capacity::CapacityController;
use crate::error::MigrationError;
use crate::readiness::{Readiness, ReadinessGate};
use crate::weight::WeightController;

// ── State machine ─────────────────────────────────────────────────

/// Steps of the cutover to the container backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStep {
    Hydrate,
    AwaitReady,
    Cutover,
}

/// Steps of the cutover to the function backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionStep {
    Cutover,
    Drain,
}

/// Phase of a migration run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Start,
    SelectBranch,
    ToContainer(ContainerStep),
    ToFunction(FunctionStep),
    Committed,
    Succeeded,
    TimedOut,
    Failed(MigrationError),
}

/// Which branch `SelectBranch` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Target already receives all traffic; nothing to do.
    AlreadyActive,
    ToContainer,
    ToFunction,
    /// Function already receives all traffic but container capacity is
    /// still reserved.
    Drain,
}

/// Outcome of executing the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Begin,
    Selected(Branch),
    Done,
    /// The readiness deadline passed before the threshold was met.
    NotReady,
    Failed(MigrationError),
}

/// Pick the branch for `target` given the committed split.
pub fn select_branch(target: BackendId, committed: &WeightSplit) -> Branch {
    if committed.is_exclusive(target) {
        return Branch::AlreadyActive;
    }
    match target {
        BackendId::Container => Branch::ToContainer,
        BackendId::Function => Branch::ToFunction,
    }
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Succeeded | Phase::TimedOut | Phase::Failed(_))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Start => "start",
            Phase::SelectBranch => "select_branch",
            Phase::ToContainer(ContainerStep::Hydrate) => "to_container/hydrate",
            Phase::ToContainer(ContainerStep::AwaitReady) => "to_container/await_ready",
            Phase::ToContainer(ContainerStep::Cutover) => "to_container/cutover",
            Phase::ToFunction(FunctionStep::Cutover) => "to_function/cutover",
            Phase::ToFunction(FunctionStep::Drain) => "to_function/drain",
            Phase::Committed => "committed",
            Phase::Succeeded => "succeeded",
            Phase::TimedOut => "timed_out",
            Phase::Failed(_) => "failed",
        }
    }

    /// Transition on `event`. Terminal phases absorb every event.
    pub fn next(self, event: Event) -> Phase {
        use ContainerStep as C;
        use FunctionStep as F;

        if self.is_terminal() {
            return self;
        }

        match (self, event) {
            (_, Event::Failed(e)) => Phase::Failed(e),

            (Phase::Start, Event::Begin) => Phase::SelectBranch,

            (Phase::SelectBranch, Event::Selected(Branch::AlreadyActive)) => Phase::Succeeded,
            (Phase::SelectBranch, Event::Selected(Branch::ToContainer)) => {
                Phase::ToContainer(C::Hydrate)
            }
            (Phase::SelectBranch, Event::Selected(Branch::ToFunction)) => {
                Phase::ToFunction(F::Cutover)
            }
            (Phase::SelectBranch, Event::Selected(Branch::Drain)) => Phase::ToFunction(F::Drain),

            (Phase::ToContainer(C::Hydrate), Event::Done) => Phase::ToContainer(C::AwaitReady),
            (Phase::ToContainer(C::AwaitReady), Event::Done) => Phase::ToContainer(C::Cutover),
            (Phase::ToContainer(C::AwaitReady), Event::NotReady) => Phase::TimedOut,
            (Phase::ToContainer(C::Cutover), Event::Done) => Phase::Committed,

            (Phase::ToFunction(F::Cutover), Event::Done) => Phase::ToFunction(F::Drain),
            (Phase::ToFunction(F::Drain), Event::Done) => Phase::Committed,

            (Phase::Committed, Event::Done) => Phase::Succeeded,

            (phase, event) => Phase::Failed(MigrationError::Internal(format!(
                "{event:?} is not valid in phase {}",
                phase.name()
            ))),
        }
    }
}

// ── Reports ───────────────────────────────────────────────────────

/// A side effect a run committed before reaching its terminal phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    /// Container desired count raised.
    Hydrated { desired: u32 },
    /// A new exclusive split was committed.
    WeightsCommitted { active: BackendId },
    /// Container desired count lowered to zero.
    Drained,
}

/// Why a request was refused before any side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MigrationInProgress,
    InvalidTarget,
    UnknownRoute,
}

/// Terminal status of a migration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    TimedOut,
    Failed { reason: String, detail: String },
    Rejected { reason: RejectReason },
}

/// Result of one migration request, including what it changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub route: RouteId,
    pub target: Option<BackendId>,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Side effects committed by this run, in order.
    pub committed: Vec<SideEffect>,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    pub fn rejected(route: &str, target: Option<BackendId>, reason: RejectReason) -> Self {
        Self {
            route: route.to_string(),
            target,
            status: RunStatus::Rejected { reason },
            committed: Vec::new(),
            elapsed_ms: 0,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }
}

// ── Runs ──────────────────────────────────────────────────────────

/// The live execution of one migration request.
#[derive(Debug)]
pub struct MigrationRun {
    pub target: BackendId,
    pub phase: Phase,
    pub started_at: Instant,
    pub deadline: Instant,
    pub committed: Vec<SideEffect>,
}

impl MigrationRun {
    fn new(target: BackendId, started_at: Instant, budget: Duration) -> Self {
        let deadline = started_at
            .checked_add(budget)
            .unwrap_or_else(|| started_at + Duration::from_secs(365 * 24 * 60 * 60));
        Self {
            target,
            phase: Phase::Start,
            started_at,
            deadline,
            committed: Vec::new(),
        }
    }

    fn report(self, route: &str) -> MigrationReport {
        let status = match self.phase {
            Phase::Succeeded => RunStatus::Succeeded,
            Phase::TimedOut => RunStatus::TimedOut,
            Phase::Failed(e) => RunStatus::Failed {
                reason: e.code().to_string(),
                detail: e.to_string(),
            },
            other => RunStatus::Failed {
                reason: "internal".to_string(),
                detail: format!("run stopped in non-terminal phase {}", other.name()),
            },
        };
        MigrationReport {
            route: route.to_string(),
            target: Some(self.target),
            status,
            committed: self.committed,
            elapsed_ms: self.started_at.elapsed().as_millis() as u64,
        }
    }
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ── Orchestrator ──────────────────────────────────────────────────

/// Migrates one route between its function and container pools.
///
/// Holds no routing state between runs: the active backend is always read
/// back from the weight controller. At most one run is in flight at a
/// time; a concurrent request is rejected, not queued.
pub struct MigrationOrchestrator {
    route: RouteId,
    pools: RoutePools,
    warm_capacity: u32,
    deadline: Duration,
    weights: Arc<dyn WeightController>,
    capacity: Arc<dyn CapacityController>,
    gate: ReadinessGate,
    shutdown: Option<watch::Receiver<bool>>,
    in_flight: AtomicBool,
}

impl MigrationOrchestrator {
    pub fn new(
        route: &str,
        pools: RoutePools,
        weights: Arc<dyn WeightController>,
        capacity: Arc<dyn CapacityController>,
        settings: &MigrationSettings,
    ) -> Self {
        let gate = ReadinessGate::new(
            capacity.clone(),
            settings.poll_interval,
            settings.max_poll_failures,
        );
        Self {
            route: route.to_string(),
            pools,
            warm_capacity: settings.warm_capacity,
            deadline: settings.deadline,
            weights,
            capacity,
            gate,
            shutdown: None,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Override the warm-capacity target for this route.
    pub fn with_warm_capacity(mut self, warm_capacity: u32) -> Self {
        self.warm_capacity = warm_capacity;
        self
    }

    /// Abort readiness waits when `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn pools(&self) -> &RoutePools {
        &self.pools
    }

    pub fn warm_capacity(&self) -> u32 {
        self.warm_capacity
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn weights(&self) -> &Arc<dyn WeightController> {
        &self.weights
    }

    pub fn capacity(&self) -> &Arc<dyn CapacityController> {
        &self.capacity
    }

    /// Run a migration to completion and report its terminal status.
    pub async fn migrate(&self, request: &MigrationRequest) -> MigrationReport {
        let target = match request.backend() {
            Ok(target) => target,
            Err(e) => {
                warn!(route = %self.route, error = %e, "migration rejected");
                return MigrationReport::rejected(&self.route, None, RejectReason::InvalidTarget);
            }
        };

        let Some(_guard) = InFlight::acquire(&self.in_flight) else {
            warn!(route = %self.route, %target, "migration already in progress");
            return MigrationReport::rejected(
                &self.route,
                Some(target),
                RejectReason::MigrationInProgress,
            );
        };

        info!(route = %self.route, %target, "migration started");
        let mut run = MigrationRun::new(target, Instant::now(), self.deadline);
        let mut shutdown = self.shutdown.clone();
        while !run.phase.is_terminal() {
            let event = self.step(&mut run, &mut shutdown).await;
            let next = run.phase.clone().next(event);
            debug!(
                route = %self.route,
                %target,
                from = run.phase.name(),
                to = next.name(),
                "migration phase"
            );
            run.phase = next;
        }

        let report = run.report(&self.route);
        match &report.status {
            RunStatus::Succeeded => {
                info!(route = %self.route, %target, committed = ?report.committed, "migration succeeded")
            }
            status => {
                warn!(route = %self.route, %target, ?status, committed = ?report.committed, "migration did not complete")
            }
        }
        report
    }

    /// Execute the side effect of the current phase.
    async fn step(
        &self,
        run: &mut MigrationRun,
        shutdown: &mut Option<watch::Receiver<bool>>,
    ) -> Event {
        let phase = run.phase.clone();
        match phase {
            Phase::Start => Event::Begin,

            Phase::SelectBranch => match self.weights.get_weights(&self.route).await {
                Ok(split) => match select_branch(run.target, &split) {
                    Branch::AlreadyActive if run.target == BackendId::Function => {
                        self.reserved_container().await
                    }
                    Branch::AlreadyActive => {
                        info!(route = %self.route, target = %run.target, "target already active");
                        Event::Selected(Branch::AlreadyActive)
                    }
                    branch => Event::Selected(branch),
                },
                Err(e) => Event::Failed(e),
            },

            Phase::ToContainer(ContainerStep::Hydrate) => {
                match self
                    .capacity
                    .set_desired(BackendId::Container, self.warm_capacity)
                    .await
                {
                    Ok(()) => {
                        run.committed.push(SideEffect::Hydrated {
                            desired: self.warm_capacity,
                        });
                        Event::Done
                    }
                    Err(e) => Event::Failed(e),
                }
            }

            Phase::ToContainer(ContainerStep::AwaitReady) => {
                let outcome = self
                    .gate
                    .wait_until_ready(BackendId::Container, self.warm_capacity, run.deadline, shutdown)
                    .await;
                match outcome {
                    Readiness::Ready(_) => Event::Done,
                    Readiness::TimedOut(last) => {
                        warn!(
                            route = %self.route,
                            running = last.map(|s| s.running),
                            threshold = self.warm_capacity,
                            "container not ready before deadline; routing unchanged"
                        );
                        Event::NotReady
                    }
                    Readiness::Failed(e) => Event::Failed(e),
                }
            }

            Phase::ToContainer(ContainerStep::Cutover) => {
                self.cut_over(run, BackendId::Container).await
            }

            Phase::ToFunction(FunctionStep::Cutover) => {
                self.cut_over(run, BackendId::Function).await
            }

            Phase::ToFunction(FunctionStep::Drain) => {
                match self.capacity.set_desired(BackendId::Container, 0).await {
                    Ok(()) => {
                        run.committed.push(SideEffect::Drained);
                        Event::Done
                    }
                    Err(e) => {
                        warn!(
                            route = %self.route,
                            error = %e,
                            "drain failed after cutover; function backend is serving"
                        );
                        Event::Failed(e)
                    }
                }
            }

            Phase::Committed => Event::Done,

            Phase::Succeeded | Phase::TimedOut | Phase::Failed(_) => {
                Event::Failed(MigrationError::Internal("stepped a terminal phase".to_string()))
            }
        }
    }

    /// Routing already sits on the function backend; drain only if the
    /// container still has desired capacity.
    async fn reserved_container(&self) -> Event {
        match self.capacity.get_state(BackendId::Container).await {
            Ok(state) if state.desired > 0 => {
                info!(
                    route = %self.route,
                    desired = state.desired,
                    "function already active; container capacity still reserved"
                );
                Event::Selected(Branch::Drain)
            }
            Ok(_) => {
                info!(route = %self.route, target = %BackendId::Function, "target already active");
                Event::Selected(Branch::AlreadyActive)
            }
            Err(e) => Event::Failed(e),
        }
    }

    async fn cut_over(&self, run: &mut MigrationRun, active: BackendId) -> Event {
        let split = self.pools.exclusive(active);
        match self.weights.set_weights(&self.route, &split).await {
            Ok(()) => {
                run.committed.push(SideEffect::WeightsCommitted { active });
                Event::Done
            }
            Err(e) => Event::Failed(e),
        }
    }
}
