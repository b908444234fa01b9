//! Manually driven lifecycle that stands in for a UI-visibility lifecycle.
//!
//! The camera binding observes the controller: it activates on `Started`,
//! deactivates on `Stopped` and unbinds on `Destroyed`.

use crate::errors::CameraError;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LifecycleState {
    Created,
    Started,
    Stopped,
    Destroyed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Started => write!(f, "started"),
            LifecycleState::Stopped => write!(f, "stopped"),
            LifecycleState::Destroyed => write!(f, "destroyed"),
        }
    }
}

pub trait LifecycleObserver: Send + Sync {
    fn on_transition(&self, from: LifecycleState, to: LifecycleState) -> Result<(), CameraError>;
}

pub struct LifecycleController {
    state: LifecycleState,
    observers: Vec<Arc<dyn LifecycleObserver>>,
}

impl LifecycleController {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Created,
            observers: Vec::new(),
        }
    }

    pub fn observe(&mut self, observer: Arc<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn start(&mut self) -> Result<LifecycleState, CameraError> {
        match self.state {
            LifecycleState::Created | LifecycleState::Stopped => {
                self.transition(LifecycleState::Started)
            }
            LifecycleState::Started | LifecycleState::Destroyed => Ok(self.state),
        }
    }

    pub fn stop(&mut self) -> Result<LifecycleState, CameraError> {
        match self.state {
            LifecycleState::Started => self.transition(LifecycleState::Stopped),
            _ => Ok(self.state),
        }
    }

    /// Moves to `Destroyed` even when an observer fails; the first failure is
    /// returned afterwards.
    pub fn tear_down(&mut self) -> Result<LifecycleState, CameraError> {
        if self.state == LifecycleState::Destroyed {
            return Ok(self.state);
        }

        let from = self.state;
        self.state = LifecycleState::Destroyed;
        log::info!("Lifecycle {} -> {}", from, self.state);

        let mut first_error = None;
        for observer in std::mem::take(&mut self.observers) {
            if let Err(e) = observer.on_transition(from, LifecycleState::Destroyed) {
                log::warn!("Observer failed during tear down: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(self.state),
        }
    }

    // Observers see the change before it is committed; any failure keeps the
    // previous state.
    fn transition(&mut self, to: LifecycleState) -> Result<LifecycleState, CameraError> {
        let from = self.state;
        for observer in &self.observers {
            observer.on_transition(from, to)?;
        }
        self.state = to;
        log::info!("Lifecycle {} -> {}", from, to);
        Ok(to)
    }
}

impl Default for LifecycleController {
    fn default() -> Self {
        Self::new()
    }
}
