//! Engine lifecycle state.
//!
//! # State Transitions
//! ```text
//! Stopped  → Starting: start / reload
//! Starting → Running:  engine started, handle published
//! Starting → Stopped:  synthesis or engine failure
//! Running  → Stopping: close / reload
//! Stopping → Stopped:  engine closed (errors included)
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl From<u8> for LifecycleState {
    fn from(val: u8) -> Self {
        match val {
            1 => LifecycleState::Starting,
            2 => LifecycleState::Running,
            3 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding a [`LifecycleState`]. Written only by the
/// holder of the lifecycle lock.
#[derive(Debug)]
pub struct AtomicState(AtomicU8);

impl AtomicState {
    pub fn new(state: LifecycleState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> LifecycleState {
        LifecycleState::from(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: LifecycleState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for AtomicState {
    fn default() -> Self {
        Self::new(LifecycleState::Stopped)
    }
}
