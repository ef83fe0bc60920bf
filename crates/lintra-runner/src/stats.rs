//! Run progress counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Coarse phase of a run. Concurrent runs on one runner overwrite each
/// other's state; the gauge is informational only.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RunnerState {
    Idle = 0,
    LoadPackageGraph = 1,
    BuildActionGraph = 2,
    Processing = 3,
    Finalizing = 4,
}

/// Counters accumulated while running.
#[derive(Default)]
pub struct Stats {
    state: AtomicU8,
    initial_packages: AtomicUsize,
    total_packages: AtomicUsize,
    finished_packages: AtomicUsize,
    finished_initial_packages: AtomicUsize,
    analyzer_wall: Mutex<HashMap<&'static str, Duration>>,
}

/// A point-in-time copy of the counters.
#[derive(Clone, Debug)]
pub struct StatsSnapshot {
    pub state: RunnerState,
    pub initial_packages: usize,
    pub total_packages: usize,
    pub finished_packages: usize,
    pub finished_initial_packages: usize,
    pub analyzer_wall: HashMap<&'static str, Duration>,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RunnerState {
        match self.state.load(Ordering::Relaxed) {
            1 => RunnerState::LoadPackageGraph,
            2 => RunnerState::BuildActionGraph,
            3 => RunnerState::Processing,
            4 => RunnerState::Finalizing,
            _ => RunnerState::Idle,
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.state(),
            initial_packages: self.initial_packages.load(Ordering::Relaxed),
            total_packages: self.total_packages.load(Ordering::Relaxed),
            finished_packages: self.finished_packages.load(Ordering::Relaxed),
            finished_initial_packages: self.finished_initial_packages.load(Ordering::Relaxed),
            analyzer_wall: self
                .analyzer_wall
                .lock()
                .unwrap_or_else(|err| err.into_inner())
                .clone(),
        }
    }

    pub(crate) fn set_state(&self, state: RunnerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_initial_packages(&self, count: usize) {
        self.initial_packages.store(count, Ordering::Relaxed);
    }

    pub(crate) fn set_total_packages(&self, count: usize) {
        self.total_packages.store(count, Ordering::Relaxed);
    }

    pub(crate) fn finish_package(&self) {
        self.finished_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish_initial_package(&self) {
        self.finished_initial_packages.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn measure_analyzer(&self, analyzer: &'static str, elapsed: Duration) {
        let mut wall = self
            .analyzer_wall
            .lock()
            .unwrap_or_else(|err| err.into_inner());
        *wall.entry(analyzer).or_default() += elapsed;
    }
}
