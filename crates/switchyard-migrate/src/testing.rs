//! Scriptable in-memory controllers for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use switchyard_core::{BackendId, CapacityState, RoutePools, WeightSplit};

use crate::capacity::CapacityController;
use crate::error::MigrationError;
use crate::weight::WeightController;

pub(crate) fn test_pools() -> RoutePools {
    RoutePools::new("tg-fn", "tg-ctr")
}

/// Routing layer fake that records every commit.
pub(crate) struct FakeWeights {
    split: Mutex<WeightSplit>,
    pub set_calls: Mutex<Vec<WeightSplit>>,
    pub get_calls: AtomicUsize,
    pub fail_set: AtomicBool,
    pub fail_get: AtomicBool,
}

impl FakeWeights {
    pub fn active(backend: BackendId) -> Self {
        Self::with_split(test_pools().exclusive(backend))
    }

    pub fn with_split(split: WeightSplit) -> Self {
        Self {
            split: Mutex::new(split),
            set_calls: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            fail_set: AtomicBool::new(false),
            fail_get: AtomicBool::new(false),
        }
    }

    pub fn committed(&self) -> WeightSplit {
        self.split.lock().unwrap().clone()
    }

    pub fn set_count(&self) -> usize {
        self.set_calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> usize {
        self.set_count() + self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WeightController for FakeWeights {
    async fn set_weights(&self, _route: &str, split: &WeightSplit) -> Result<(), MigrationError> {
        self.set_calls.lock().unwrap().push(split.clone());
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(MigrationError::RoutingUnavailable("listener unreachable".to_string()));
        }
        *self.split.lock().unwrap() = split.clone();
        Ok(())
    }

    async fn get_weights(&self, _route: &str) -> Result<WeightSplit, MigrationError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_get.load(Ordering::SeqCst) {
            return Err(MigrationError::RoutingUnavailable("listener unreachable".to_string()));
        }
        Ok(self.committed())
    }
}

/// One scripted answer to `get_state`.
pub(crate) enum Poll {
    Running(u32),
    Unavailable,
}

/// Capacity backend fake. Each `get_state` consumes the next scripted
/// poll; once the script runs out the last observed state repeats.
pub(crate) struct FakeCapacity {
    state: Mutex<CapacityState>,
    script: Mutex<VecDeque<Poll>>,
    pub desired_calls: Mutex<Vec<u32>>,
    pub get_calls: AtomicUsize,
    pub fail_set: AtomicBool,
}

impl FakeCapacity {
    pub fn new(state: CapacityState) -> Self {
        Self {
            state: Mutex::new(state),
            script: Mutex::new(VecDeque::new()),
            desired_calls: Mutex::new(Vec::new()),
            get_calls: AtomicUsize::new(0),
            fail_set: AtomicBool::new(false),
        }
    }

    pub fn scripted(polls: impl IntoIterator<Item = Poll>) -> Self {
        let fake = Self::new(CapacityState::default());
        fake.script.lock().unwrap().extend(polls);
        fake
    }

    pub fn running(counts: &[u32]) -> Self {
        Self::scripted(counts.iter().map(|&n| Poll::Running(n)))
    }

    pub fn state(&self) -> CapacityState {
        *self.state.lock().unwrap()
    }

    pub fn desired_history(&self) -> Vec<u32> {
        self.desired_calls.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.desired_calls.lock().unwrap().len() + self.polls()
    }
}

#[async_trait]
impl CapacityController for FakeCapacity {
    async fn set_desired(&self, _backend: BackendId, count: u32) -> Result<(), MigrationError> {
        self.desired_calls.lock().unwrap().push(count);
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(MigrationError::CapacityUnavailable("cluster unreachable".to_string()));
        }
        self.state.lock().unwrap().desired = count;
        Ok(())
    }

    async fn get_state(&self, _backend: BackendId) -> Result<CapacityState, MigrationError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Poll::Running(n)) => {
                let mut state = self.state.lock().unwrap();
                state.running = n;
                Ok(*state)
            }
            Some(Poll::Unavailable) => Err(MigrationError::CapacityUnavailable(
                "describe failed".to_string(),
            )),
            None => Ok(self.state()),
        }
    }
}
