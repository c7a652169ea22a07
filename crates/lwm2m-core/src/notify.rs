//! Resource change notifications.
//!
//! The engine does not own observation state. It only emits a
//! `ResourceChanged` signal into a `NotificationSink`; whatever sits behind
//! the sink (an observation registry, a channel, a test recorder) decides
//! who gets told.
//!
//! Events for one instance are published while the instance lock is held,
//! so a sink that preserves call order sees notifications for the same
//! resource in the order the mutations happened.

use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::path::ResourcePath;
use crate::resource::{InstanceId, ObjectId, ResourceId};

/// "Resource changed" signal for one resource of one object instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceChanged {
    pub object_id: ObjectId,
    pub instance_id: InstanceId,
    pub resource_id: ResourceId,
}

impl ResourceChanged {
    /// Path of the changed resource.
    pub fn path(&self) -> ResourcePath {
        ResourcePath::resource(self.object_id, self.instance_id, self.resource_id)
    }
}

/// Consumer of change notifications.
///
/// `publish` is called from the dispatcher and from scheduler callbacks, so
/// implementations must not block.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: ResourceChanged);
}

/// Sink that drops every notification.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn publish(&self, _event: ResourceChanged) {}
}

/// Sink that keeps every notification in memory, in publish order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ResourceChanged>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all recorded events.
    pub fn events(&self) -> Vec<ResourceChanged> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return all recorded events.
    pub fn take(&self) -> Vec<ResourceChanged> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of events recorded for one resource id.
    pub fn count_for(&self, resource_id: ResourceId) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.resource_id == resource_id)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, event: ResourceChanged) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Emits change events on behalf of one object instance.
#[derive(Clone)]
pub struct Notifier {
    object_id: ObjectId,
    instance_id: InstanceId,
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub fn new(object_id: ObjectId, instance_id: InstanceId, sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            object_id,
            instance_id,
            sink,
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn instance_id(&self) -> InstanceId {
        self.instance_id
    }

    /// Signal that a resource of this instance changed.
    pub fn notify_changed(&self, resource_id: ResourceId) {
        let event = ResourceChanged {
            object_id: self.object_id,
            instance_id: self.instance_id,
            resource_id,
        };
        trace!("resource changed: {}", event.path());
        self.sink.publish(event);
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("object_id", &self.object_id)
            .field("instance_id", &self.instance_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_publishes_instance_identity() {
        let sink = Arc::new(RecordingSink::new());
        let notifier = Notifier::new(3, 0, sink.clone());

        notifier.notify_changed(14);

        assert_eq!(
            sink.events(),
            vec![ResourceChanged {
                object_id: 3,
                instance_id: 0,
                resource_id: 14,
            }]
        );
        assert_eq!(sink.events()[0].path().to_string(), "/3/0/14");
    }

    #[test]
    fn test_recording_sink_preserves_order() {
        let sink = Arc::new(RecordingSink::new());
        let notifier = Notifier::new(3, 0, sink.clone());

        notifier.notify_changed(14);
        notifier.notify_changed(15);
        notifier.notify_changed(14);

        let ids: Vec<ResourceId> = sink.events().iter().map(|e| e.resource_id).collect();
        assert_eq!(ids, vec![14, 15, 14]);
        assert_eq!(sink.count_for(14), 2);

        assert_eq!(sink.take().len(), 3);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serialize() {
        let event = ResourceChanged {
            object_id: 3,
            instance_id: 0,
            resource_id: 13,
        };
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["objectId"], 3);
        assert_eq!(json["resourceId"], 13);
    }
}
