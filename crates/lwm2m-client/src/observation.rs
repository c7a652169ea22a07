//! Observation management.
//!
//! Tracks which observers watch which paths and resolves change events to
//! the observers that should hear about them. An observation on an object
//! or instance path matches changes of every resource below it.

use lwm2m_core::{ResourceChanged, ResourcePath};
use tracing::debug;

/// One observer watching one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    /// Observer identity (e.g. a server short id or token).
    pub observer: String,
    pub path: ResourcePath,
}

impl Observation {
    pub fn new(observer: &str, path: ResourcePath) -> Self {
        Self {
            observer: observer.to_string(),
            path,
        }
    }

    /// Check if this observation covers a changed resource.
    pub fn matches(&self, changed: &ResourcePath) -> bool {
        self.path.contains(changed)
    }
}

/// Registry of active observations, in registration order.
#[derive(Debug, Default)]
pub struct ObservationRegistry {
    observations: Vec<Observation>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start observing a path.
    ///
    /// Returns false if the observer already watches exactly this path.
    pub fn observe(&mut self, observer: &str, path: ResourcePath) -> bool {
        if self
            .observations
            .iter()
            .any(|o| o.observer == observer && o.path == path)
        {
            return false;
        }
        debug!("{} observes {}", observer, path);
        self.observations.push(Observation::new(observer, path));
        true
    }

    /// Stop observing a path. Returns false if there was no such observation.
    pub fn cancel(&mut self, observer: &str, path: &ResourcePath) -> bool {
        let before = self.observations.len();
        self.observations
            .retain(|o| !(o.observer == observer && o.path == *path));
        let removed = self.observations.len() != before;
        if removed {
            debug!("{} stopped observing {}", observer, path);
        }
        removed
    }

    /// Remove every observation of one observer, returning how many there were.
    pub fn cancel_all(&mut self, observer: &str) -> usize {
        let before = self.observations.len();
        self.observations.retain(|o| o.observer != observer);
        before - self.observations.len()
    }

    /// Observers interested in a change, in registration order, each once.
    pub fn observers_for(&self, event: &ResourceChanged) -> Vec<String> {
        let changed = event.path();
        let mut observers: Vec<String> = Vec::new();
        for observation in self.observations.iter().filter(|o| o.matches(&changed)) {
            if !observers.contains(&observation.observer) {
                observers.push(observation.observer.clone());
            }
        }
        observers
    }

    /// Check if anyone observes a resource.
    pub fn is_observed(&self, path: &ResourcePath) -> bool {
        self.observations.iter().any(|o| o.matches(path))
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}
