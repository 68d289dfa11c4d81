//! Loop state machine and running counters.

use std::collections::HashMap;
use std::fmt;

use crate::error::CycleStage;

/// Where the loop currently is.
///
/// `Idle -> Reading -> Fusing -> Preprocessing -> Predicting -> Encoding
/// -> Dispatching -> Idle`. Any fault returns straight to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    Reading,
    Fusing,
    Preprocessing,
    Predicting,
    Encoding,
    Dispatching,
}

impl LoopState {
    /// Stage being executed, `None` when idle
    pub fn stage(&self) -> Option<CycleStage> {
        match self {
            LoopState::Idle => None,
            LoopState::Reading => Some(CycleStage::Reading),
            LoopState::Fusing => Some(CycleStage::Fusing),
            LoopState::Preprocessing => Some(CycleStage::Preprocessing),
            LoopState::Predicting => Some(CycleStage::Predicting),
            LoopState::Encoding => Some(CycleStage::Encoding),
            LoopState::Dispatching => Some(CycleStage::Dispatching),
        }
    }
}

impl From<CycleStage> for LoopState {
    fn from(stage: CycleStage) -> Self {
        match stage {
            CycleStage::Reading => LoopState::Reading,
            CycleStage::Fusing => LoopState::Fusing,
            CycleStage::Preprocessing => LoopState::Preprocessing,
            CycleStage::Predicting => LoopState::Predicting,
            CycleStage::Encoding => LoopState::Encoding,
            CycleStage::Dispatching => LoopState::Dispatching,
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage() {
            Some(stage) => write!(f, "{}", stage),
            None => f.write_str("idle"),
        }
    }
}

/// Counters kept across the loop's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Cycles started
    pub cycles: u64,
    /// Commands handed to the actuator (dry runs excluded)
    pub dispatched: u64,
    /// Cycles that ran all stages, dry runs included
    pub completed: u64,
    faults: HashMap<CycleStage, u64>,
}

impl LoopStats {
    pub fn record_fault(&mut self, stage: CycleStage) {
        *self.faults.entry(stage).or_insert(0) += 1;
    }

    pub fn faults(&self) -> u64 {
        self.faults.values().sum()
    }

    pub fn faults_in(&self, stage: CycleStage) -> u64 {
        self.faults.get(&stage).copied().unwrap_or(0)
    }
}
