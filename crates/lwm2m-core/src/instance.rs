//! Object instances and operation dispatch.
//!
//! `ObjectInstance` is the one engine type every concrete object runs on.
//! It is parameterized by an `ObjectBehavior`, which supplies the resource
//! enumeration and the object-specific pieces:
//! - initial values (set without notification)
//! - computed reads
//! - custom-validated writes
//! - action handlers, matched exhaustively on the object's action enum
//!
//! All store access for one instance goes through a single mutex, shared by
//! the dispatcher and by the periodic notifier callback.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{ComputeError, DefinitionError, Operation, OperationError};
use crate::model::ResourceValue;
use crate::notify::{NotificationSink, Notifier};
use crate::path::ResourcePath;
use crate::resource::{validate_enumeration, InstanceId, ObjectId, ObjectResource, ResourceId};
use crate::schedule::{ScheduledTask, Scheduler};
use crate::store::ResourceStore;

/// What a behavior did with a write request.
#[derive(Debug)]
pub enum WriteDisposition {
    /// The behavior handled the write itself.
    Handled(Result<(), OperationError>),
    /// Store the value through the default path.
    Default(ResourceValue),
}

/// Object-specific behavior plugged into the engine.
pub trait ObjectBehavior: Send + 'static {
    type Resource: ObjectResource;

    /// Values present when the instance is created.
    fn initial_values(&self) -> Vec<(Self::Resource, ResourceValue)> {
        Vec::new()
    }

    /// Compute the value of a resource on read.
    ///
    /// Returning `None` means the resource is not computed and the store is
    /// consulted instead.
    fn compute(&self, resource: Self::Resource) -> Option<Result<ResourceValue, ComputeError>> {
        let _ = resource;
        None
    }

    /// Read of a resource that has no value and is not computed.
    fn read_absent(&self, resource: Self::Resource) -> Result<ResourceValue, OperationError> {
        Err(OperationError::NotFound {
            resource: resource.name(),
            operation: Operation::Read,
        })
    }

    /// Write to a writable resource.
    fn write(
        &mut self,
        ctx: &mut ResourceContext<'_, Self::Resource>,
        resource: Self::Resource,
        value: ResourceValue,
    ) -> WriteDisposition {
        let _ = (ctx, resource);
        WriteDisposition::Default(value)
    }

    /// Run an action. `params` is never `Some("")`.
    fn execute(
        &mut self,
        ctx: &mut ResourceContext<'_, Self::Resource>,
        action: <Self::Resource as ObjectResource>::Action,
        params: Option<&str>,
    ) -> Result<(), OperationError>;
}

/// Mutable view of an instance's store, handed to behavior callbacks.
pub struct ResourceContext<'a, R: ObjectResource> {
    store: &'a mut ResourceStore<R>,
    notifier: &'a Notifier,
}

impl<'a, R: ObjectResource> ResourceContext<'a, R> {
    pub fn get(&self, resource: R) -> Option<&ResourceValue> {
        self.store.get(resource)
    }

    /// Type-check and store a value, optionally notifying observers.
    pub fn set(
        &mut self,
        resource: R,
        value: impl Into<ResourceValue>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.store.set(resource, value.into())?;
        if fire_change {
            self.notifier.notify_changed(resource.id());
        }
        Ok(())
    }

    pub fn remove(&mut self, resource: R, fire_change: bool) -> Option<ResourceValue> {
        let previous = self.store.remove(resource);
        if fire_change && previous.is_some() {
            self.notifier.notify_changed(resource.id());
        }
        previous
    }

    /// Type-check a value without storing it.
    pub fn check(&self, resource: R, value: &ResourceValue) -> Result<(), OperationError> {
        ResourceStore::check(resource, value)
    }

    pub fn notify_changed(&self, resource: R) {
        self.notifier.notify_changed(resource.id());
    }

    pub fn instance_id(&self) -> InstanceId {
        self.notifier.instance_id()
    }
}

struct State<B: ObjectBehavior> {
    behavior: B,
    store: ResourceStore<B::Resource>,
}

impl<B: ObjectBehavior> State<B> {
    fn read(&self, resource: B::Resource) -> Result<ResourceValue, OperationError> {
        if !resource.spec().operations.is_readable() {
            return self.behavior.read_absent(resource);
        }

        if let Some(computed) = self.behavior.compute(resource) {
            return computed
                .map_err(|e| OperationError::action_failure(resource.name(), e.to_string()));
        }

        match self.store.get(resource) {
            Some(value) => Ok(value.clone()),
            None => self.behavior.read_absent(resource),
        }
    }

    fn write(
        &mut self,
        notifier: &Notifier,
        resource: B::Resource,
        value: ResourceValue,
    ) -> Result<(), OperationError> {
        let spec = resource.spec();
        if !spec.operations.is_writable() {
            // Computed resources report "not found" rather than "denied"
            return Err(if spec.computed {
                OperationError::NotFound {
                    resource: resource.name(),
                    operation: Operation::Write,
                }
            } else {
                OperationError::AccessDenied {
                    resource: resource.name(),
                    operation: Operation::Write,
                }
            });
        }

        let State { behavior, store } = self;
        let mut ctx = ResourceContext { store, notifier };
        match behavior.write(&mut ctx, resource, value) {
            WriteDisposition::Handled(result) => result,
            WriteDisposition::Default(value) => ctx.set(resource, value, true),
        }
    }

    fn execute(
        &mut self,
        notifier: &Notifier,
        resource: B::Resource,
        params: Option<&str>,
    ) -> Result<(), OperationError> {
        let Some(action) = resource.action() else {
            debug!("'{}' has no action, execute is a no-op", resource.name());
            return Ok(());
        };

        let params = params.filter(|p| !p.is_empty());
        let State { behavior, store } = self;
        let mut ctx = ResourceContext { store, notifier };
        behavior.execute(&mut ctx, action, params)
    }
}

/// One instance of an object, driven by an `ObjectBehavior`.
///
/// Cloning shares the same instance.
pub struct ObjectInstance<B: ObjectBehavior> {
    state: Arc<Mutex<State<B>>>,
    notifier: Notifier,
}

impl<B: ObjectBehavior> Clone for ObjectInstance<B> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            notifier: self.notifier.clone(),
        }
    }
}

impl<B: ObjectBehavior> ObjectInstance<B> {
    /// Build an instance and populate its initial values.
    ///
    /// Fails if the enumeration is inconsistent (e.g. an executable resource
    /// without an action) or an initial value has the wrong type. No
    /// notifications are emitted during construction.
    pub fn new(
        instance_id: InstanceId,
        behavior: B,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, DefinitionError> {
        validate_enumeration::<B::Resource>()?;

        let mut store = ResourceStore::new();
        for (resource, value) in behavior.initial_values() {
            store
                .set(resource, value)
                .map_err(|source| DefinitionError::InvalidInitialValue {
                    resource: resource.name(),
                    source,
                })?;
        }

        debug!(
            "created {} instance /{}/{} with {} values",
            B::Resource::OBJECT_NAME,
            B::Resource::OBJECT_ID,
            instance_id,
            store.len()
        );

        Ok(Self {
            state: Arc::new(Mutex::new(State { behavior, store })),
            notifier: Notifier::new(B::Resource::OBJECT_ID, instance_id, sink),
        })
    }

    pub fn object_id(&self) -> ObjectId {
        B::Resource::OBJECT_ID
    }

    pub fn instance_id(&self) -> InstanceId {
        self.notifier.instance_id()
    }

    /// Path of this instance ("/3/0").
    pub fn path(&self) -> ResourcePath {
        ResourcePath::instance(self.object_id(), self.instance_id())
    }

    fn resource_path(&self, resource_id: ResourceId) -> ResourcePath {
        ResourcePath::resource(self.object_id(), self.instance_id(), resource_id)
    }

    fn lock(&self) -> MutexGuard<'_, State<B>> {
        // Store values are plain data, a panicked holder cannot leave them torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, resource_id: ResourceId) -> Result<B::Resource, OperationError> {
        ResourceStore::<B::Resource>::resolve(resource_id).map_err(|e| {
            debug!("{} rejected: {}", self.resource_path(resource_id), e);
            e
        })
    }

    /// Read a resource.
    pub fn read(&self, resource_id: ResourceId) -> Result<ResourceValue, OperationError> {
        let resource = self.resolve(resource_id)?;
        let result = self.lock().read(resource);

        match &result {
            Ok(value) => debug!(
                "read {} ({}) -> {}",
                self.resource_path(resource_id),
                resource.name(),
                value
            ),
            Err(e) => debug!("read {} failed: {}", self.resource_path(resource_id), e),
        }
        result
    }

    /// Read every readable resource that currently yields a value.
    pub fn read_all(&self) -> Vec<(ResourceId, ResourceValue)> {
        let state = self.lock();
        B::Resource::ALL
            .iter()
            .filter(|r| r.spec().operations.is_readable())
            .filter_map(|r| state.read(*r).ok().map(|v| (r.id(), v)))
            .collect()
    }

    /// Write a resource.
    pub fn write(&self, resource_id: ResourceId, value: ResourceValue) -> Result<(), OperationError> {
        let resource = self.resolve(resource_id)?;
        let path = self.resource_path(resource_id);
        debug!("write {} ({}) <- {}", path, resource.name(), value);

        let result = self.lock().write(&self.notifier, resource, value);
        if let Err(e) = &result {
            debug!("write {} failed: {}", path, e);
        }
        result
    }

    /// Execute an action resource.
    pub fn execute(&self, resource_id: ResourceId, params: Option<&str>) -> Result<(), OperationError> {
        let resource = self.resolve(resource_id)?;
        let path = self.resource_path(resource_id);
        match params {
            Some(p) if !p.is_empty() => info!("execute {} ({}) params: {}", path, resource.name(), p),
            _ => info!("execute {} ({})", path, resource.name()),
        }

        let result = self.lock().execute(&self.notifier, resource, params);
        if let Err(e) = &result {
            debug!("execute {} failed: {}", path, e);
        }
        result
    }

    /// Current stored value of a resource.
    pub fn get(&self, resource: B::Resource) -> Option<ResourceValue> {
        self.lock().store.get(resource).cloned()
    }

    /// Store a value directly, bypassing the access policy.
    ///
    /// Used by the owning application to update read-only attributes such
    /// as battery level. Type checking still applies.
    pub fn set(
        &self,
        resource: B::Resource,
        value: impl Into<ResourceValue>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.update(|_, ctx| ctx.set(resource, value, fire_change))
    }

    /// Signal a change of a resource without touching the store.
    pub fn notify_changed(&self, resource: B::Resource) {
        let _state = self.lock();
        self.notifier.notify_changed(resource.id());
    }

    /// Run `f` with shared access to the behavior.
    pub fn with_behavior<T>(&self, f: impl FnOnce(&B) -> T) -> T {
        f(&self.lock().behavior)
    }

    /// Run `f` with exclusive access to the behavior and the store.
    pub fn update<T>(
        &self,
        f: impl FnOnce(&mut B, &mut ResourceContext<'_, B::Resource>) -> T,
    ) -> T {
        let mut state = self.lock();
        let State { behavior, store } = &mut *state;
        let mut ctx = ResourceContext {
            store,
            notifier: &self.notifier,
        };
        f(behavior, &mut ctx)
    }

    /// Notify `resource` after `delay` and then every `period`.
    ///
    /// The notification runs under the instance lock, serialized with
    /// dispatcher operations. The returned handle stops the timer when
    /// stopped or dropped. The timer does not keep the instance alive.
    pub fn start_periodic_notifier(
        &self,
        resource: B::Resource,
        delay: Duration,
        period: Duration,
        scheduler: &dyn Scheduler,
    ) -> PeriodicNotifier {
        let state = Arc::downgrade(&self.state);
        let notifier = self.notifier.clone();
        let resource_id = resource.id();

        let task = scheduler.schedule_recurring(
            delay,
            period,
            Box::new(move || {
                if let Some(state) = state.upgrade() {
                    let _state = state.lock().unwrap_or_else(PoisonError::into_inner);
                    notifier.notify_changed(resource_id);
                }
            }),
        );

        let path = self.resource_path(resource_id);
        info!(
            "periodic notification of {} every {:?} after {:?}",
            path, period, delay
        );
        PeriodicNotifier { path, task }
    }
}

/// Type-erased access to an object instance, for hosts that keep
/// instances of different object types side by side.
pub trait ObjectEnabler: Send + Sync {
    fn object_id(&self) -> ObjectId;

    fn instance_id(&self) -> InstanceId;

    fn read(&self, resource_id: ResourceId) -> Result<ResourceValue, OperationError>;

    fn read_all(&self) -> Vec<(ResourceId, ResourceValue)>;

    fn write(&self, resource_id: ResourceId, value: ResourceValue) -> Result<(), OperationError>;

    fn execute(&self, resource_id: ResourceId, params: Option<&str>) -> Result<(), OperationError>;
}

impl<B: ObjectBehavior> ObjectEnabler for ObjectInstance<B> {
    fn object_id(&self) -> ObjectId {
        ObjectInstance::object_id(self)
    }

    fn instance_id(&self) -> InstanceId {
        ObjectInstance::instance_id(self)
    }

    fn read(&self, resource_id: ResourceId) -> Result<ResourceValue, OperationError> {
        ObjectInstance::read(self, resource_id)
    }

    fn read_all(&self) -> Vec<(ResourceId, ResourceValue)> {
        ObjectInstance::read_all(self)
    }

    fn write(&self, resource_id: ResourceId, value: ResourceValue) -> Result<(), OperationError> {
        ObjectInstance::write(self, resource_id, value)
    }

    fn execute(&self, resource_id: ResourceId, params: Option<&str>) -> Result<(), OperationError> {
        ObjectInstance::execute(self, resource_id, params)
    }
}

/// Handle to a running periodic notification.
pub struct PeriodicNotifier {
    path: ResourcePath,
    task: Box<dyn ScheduledTask>,
}

impl PeriodicNotifier {
    /// Path of the notified resource.
    pub fn path(&self) -> ResourcePath {
        self.path
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_cancelled()
    }

    /// Stop notifying. Does not wait for an in-flight callback.
    pub fn stop(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if !self.task.is_cancelled() {
            debug!("stopping periodic notification of {}", self.path);
            self.task.cancel();
        }
    }
}

impl Drop for PeriodicNotifier {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::model::{ValueShape, ValueType};
    use crate::notify::RecordingSink;
    use crate::resource::tests::{Broken, Lamp, LampAction};
    use crate::schedule::ManualScheduler;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    struct LampBehavior {
        uptime_fails: bool,
        toggles: usize,
    }

    impl LampBehavior {
        fn new() -> Self {
            Self {
                uptime_fails: false,
                toggles: 0,
            }
        }
    }

    impl ObjectBehavior for LampBehavior {
        type Resource = Lamp;

        fn initial_values(&self) -> Vec<(Lamp, ResourceValue)> {
            vec![
                (Lamp::Name, ResourceValue::from("hall")),
                (Lamp::Dimmer, ResourceValue::Integer(50)),
                (Lamp::On, ResourceValue::Boolean(false)),
            ]
        }

        fn compute(&self, resource: Lamp) -> Option<Result<ResourceValue, ComputeError>> {
            match resource {
                Lamp::Uptime if self.uptime_fails => {
                    Some(Err(ComputeError("clock unavailable".to_string())))
                }
                Lamp::Uptime => Some(Ok(ResourceValue::Time(
                    Utc.with_ymd_and_hms(2024, 1, 17, 10, 30, 0).unwrap(),
                ))),
                _ => None,
            }
        }

        fn write(
            &mut self,
            ctx: &mut ResourceContext<'_, Lamp>,
            resource: Lamp,
            value: ResourceValue,
        ) -> WriteDisposition {
            match resource {
                Lamp::Dimmer => WriteDisposition::Handled(
                    ctx.check(resource, &value).and_then(|_| {
                        match value.as_integer() {
                            Some(level) if (0..=100).contains(&level) => {
                                ctx.set(resource, value, true)
                            }
                            _ => Err(OperationError::invalid_value(
                                resource.name(),
                                "dimmer must be 0..=100",
                            )),
                        }
                    }),
                ),
                _ => WriteDisposition::Default(value),
            }
        }

        fn execute(
            &mut self,
            ctx: &mut ResourceContext<'_, Lamp>,
            action: LampAction,
            params: Option<&str>,
        ) -> Result<(), OperationError> {
            match action {
                LampAction::Toggle => {
                    if params == Some("fail") {
                        return Err(OperationError::action_failure(
                            Lamp::Toggle.name(),
                            ActionError::new("relay stuck").to_string(),
                        ));
                    }
                    let on = ctx.get(Lamp::On).and_then(ResourceValue::as_bool).unwrap_or(false);
                    self.toggles += 1;
                    ctx.set(Lamp::On, !on, true)
                }
                LampAction::Reset => ctx.set(Lamp::Dimmer, 0i64, true),
            }
        }
    }

    fn lamp() -> (ObjectInstance<LampBehavior>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let instance = ObjectInstance::new(0, LampBehavior::new(), sink.clone()).unwrap();
        (instance, sink)
    }

    #[test]
    fn test_construction_does_not_notify() {
        let (lamp, sink) = lamp();
        assert_eq!(lamp.read(0).unwrap(), ResourceValue::from("hall"));
        assert_eq!(lamp.path().to_string(), "/3311/0");
        assert!(sink.is_empty());
    }

    #[test]
    fn test_unknown_ids_are_invalid_for_every_operation() {
        let (lamp, sink) = lamp();
        let invalid = |resource_id| OperationError::InvalidResource {
            object_id: 3311,
            resource_id,
        };

        for id in [3, 6, 7, 10, 500] {
            assert_eq!(lamp.read(id), Err(invalid(id)));
            assert_eq!(lamp.write(id, ResourceValue::Integer(1)), Err(invalid(id)));
            assert_eq!(lamp.execute(id, None), Err(invalid(id)));
        }
        assert!(sink.is_empty());
    }

    #[test]
    fn test_read_paths() {
        let (lamp, _) = lamp();

        // Stored value
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(50));

        // Computed value
        assert_eq!(
            lamp.read(8).unwrap().as_time(),
            Some(Utc.with_ymd_and_hms(2024, 1, 17, 10, 30, 0).unwrap())
        );

        // Declared but never set
        assert_eq!(
            lamp.read(9),
            Err(OperationError::NotFound {
                resource: "Colors",
                operation: Operation::Read,
            })
        );

        // Action resources go through the not-readable default
        assert_eq!(
            lamp.read(4),
            Err(OperationError::NotFound {
                resource: "Toggle",
                operation: Operation::Read,
            })
        );
    }

    #[test]
    fn test_compute_failure_becomes_action_failure() {
        let sink = Arc::new(RecordingSink::new());
        let mut behavior = LampBehavior::new();
        behavior.uptime_fails = true;
        let lamp = ObjectInstance::new(0, behavior, sink).unwrap();

        let err = lamp.read(8).unwrap_err();
        assert!(matches!(err, OperationError::ActionFailure { resource: "Uptime", .. }));

        // The dispatcher keeps working
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(50));
    }

    #[test]
    fn test_write_read_only_is_denied() {
        let (lamp, sink) = lamp();

        assert_eq!(
            lamp.write(0, ResourceValue::from("kitchen")),
            Err(OperationError::AccessDenied {
                resource: "Name",
                operation: Operation::Write,
            })
        );
        assert_eq!(lamp.read(0).unwrap(), ResourceValue::from("hall"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_write_computed_is_not_found() {
        let (lamp, sink) = lamp();
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            lamp.write(8, ResourceValue::Time(now)),
            Err(OperationError::NotFound {
                resource: "Uptime",
                operation: Operation::Write,
            })
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn test_write_round_trip() {
        let (lamp, _) = lamp();

        lamp.write(2, ResourceValue::Boolean(true)).unwrap();
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(true));

        let colors = ResourceValue::multiple([(0, "red"), (3, "blue")]);
        lamp.write(9, colors.clone()).unwrap();
        assert_eq!(lamp.read(9).unwrap(), colors);
    }

    #[test]
    fn test_type_mismatch_leaves_store_unchanged() {
        let (lamp, sink) = lamp();

        assert_eq!(
            lamp.write(2, ResourceValue::Integer(1)),
            Err(OperationError::TypeMismatch {
                resource: "On/Off",
                expected: ValueShape::single(ValueType::Boolean),
                found: ValueShape::single(ValueType::Integer),
            })
        );
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(false));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_custom_write_validation() {
        let (lamp, sink) = lamp();

        let err = lamp.write(1, ResourceValue::Integer(150)).unwrap_err();
        assert!(matches!(err, OperationError::InvalidValue { resource: "Dimmer", .. }));
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(50));

        lamp.write(1, ResourceValue::Integer(75)).unwrap();
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(75));
        assert_eq!(sink.count_for(1), 1);
    }

    #[test]
    fn test_sequential_writes_notify_in_order() {
        let (lamp, sink) = lamp();

        lamp.write(2, ResourceValue::Boolean(true)).unwrap();
        lamp.write(1, ResourceValue::Integer(75)).unwrap();
        lamp.write(2, ResourceValue::Boolean(false)).unwrap();

        let order: Vec<u16> = sink.events().iter().map(|e| e.resource_id).collect();
        assert_eq!(order, vec![2, 1, 2]);
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(false));
    }

    #[test]
    fn test_execute_routes_to_action() {
        let (lamp, sink) = lamp();

        lamp.execute(4, None).unwrap();
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(true));
        assert_eq!(sink.count_for(2), 1);

        // Empty params are the same as no params
        lamp.execute(4, Some("")).unwrap();
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(false));
        assert_eq!(lamp.with_behavior(|b| b.toggles), 2);
    }

    #[test]
    fn test_execute_failure() {
        let (lamp, sink) = lamp();

        let err = lamp.execute(4, Some("fail")).unwrap_err();
        assert_eq!(err.code(), "5.00");
        assert_eq!(lamp.read(2).unwrap(), ResourceValue::Boolean(false));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_execute_reset_is_idempotent() {
        let (lamp, _) = lamp();

        lamp.execute(5, None).unwrap();
        let once = lamp.read_all();
        lamp.execute(5, None).unwrap();
        assert_eq!(lamp.read_all(), once);
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(0));
    }

    #[test]
    fn test_execute_without_action_is_noop() {
        let (lamp, sink) = lamp();
        lamp.execute(0, Some("ignored")).unwrap();
        assert_eq!(lamp.read(0).unwrap(), ResourceValue::from("hall"));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_read_all_skips_absent() {
        let (lamp, _) = lamp();
        let ids: Vec<ResourceId> = lamp.read_all().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 2, 8]);
    }

    #[test]
    fn test_set_bypasses_access_policy() {
        let (lamp, sink) = lamp();

        lamp.set(Lamp::Name, "porch", false).unwrap();
        assert!(sink.is_empty());
        lamp.set(Lamp::Name, "garden", true).unwrap();
        assert_eq!(sink.count_for(0), 1);
        assert_eq!(lamp.get(Lamp::Name), Some(ResourceValue::from("garden")));

        assert!(lamp.set(Lamp::Name, 5i64, true).is_err());
        assert_eq!(sink.count_for(0), 1);
    }

    #[test]
    fn test_missing_action_handler_fails_construction() {
        struct BrokenBehavior;

        impl ObjectBehavior for BrokenBehavior {
            type Resource = Broken;

            fn execute(
                &mut self,
                _ctx: &mut ResourceContext<'_, Broken>,
                _action: (),
                _params: Option<&str>,
            ) -> Result<(), OperationError> {
                Ok(())
            }
        }

        let result = ObjectInstance::new(0, BrokenBehavior, Arc::new(RecordingSink::new()));
        assert!(matches!(
            result,
            Err(DefinitionError::MissingActionHandler {
                resource: "Restart",
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_initial_value_fails_construction() {
        struct BadDefaults;

        impl ObjectBehavior for BadDefaults {
            type Resource = Lamp;

            fn initial_values(&self) -> Vec<(Lamp, ResourceValue)> {
                vec![(Lamp::Dimmer, ResourceValue::from("half"))]
            }

            fn execute(
                &mut self,
                _ctx: &mut ResourceContext<'_, Lamp>,
                _action: LampAction,
                _params: Option<&str>,
            ) -> Result<(), OperationError> {
                Ok(())
            }
        }

        let result = ObjectInstance::new(0, BadDefaults, Arc::new(RecordingSink::new()));
        assert!(matches!(
            result,
            Err(DefinitionError::InvalidInitialValue {
                resource: "Dimmer",
                ..
            })
        ));
    }

    #[test]
    fn test_periodic_notifier() {
        let (lamp, sink) = lamp();
        let scheduler = ManualScheduler::new();

        let notifier = lamp.start_periodic_notifier(
            Lamp::Uptime,
            Duration::from_millis(100),
            Duration::from_millis(1000),
            &scheduler,
        );
        assert_eq!(notifier.path().to_string(), "/3311/0/8");
        assert!(notifier.is_running());
        assert_eq!(
            scheduler.schedules(),
            vec![(Duration::from_millis(100), Duration::from_millis(1000))]
        );

        // Nothing is emitted until the scheduler fires
        assert!(sink.is_empty());

        scheduler.tick();
        scheduler.tick();
        assert_eq!(sink.count_for(8), 2);

        notifier.stop();
        scheduler.tick();
        assert_eq!(sink.count_for(8), 2);
    }

    #[test]
    fn test_dropping_notifier_cancels_it() {
        let (lamp, sink) = lamp();
        let scheduler = ManualScheduler::new();

        {
            let _notifier = lamp.start_periodic_notifier(
                Lamp::Uptime,
                Duration::ZERO,
                Duration::from_secs(1),
                &scheduler,
            );
            scheduler.tick();
        }
        scheduler.tick();
        assert_eq!(sink.count_for(8), 1);
    }

    #[test]
    fn test_concurrent_writes_and_timer() {
        let (lamp, sink) = lamp();
        let scheduler = ManualScheduler::new();
        let _notifier = lamp.start_periodic_notifier(
            Lamp::Uptime,
            Duration::ZERO,
            Duration::from_secs(1),
            &scheduler,
        );

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let lamp = lamp.clone();
                std::thread::spawn(move || {
                    for level in 0..50 {
                        lamp.write(1, ResourceValue::Integer(level)).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..20 {
            scheduler.tick();
        }
        for writer in writers {
            writer.join().unwrap();
        }

        assert_eq!(sink.count_for(1), 200);
        assert_eq!(sink.count_for(8), 20);
        assert_eq!(lamp.read(1).unwrap(), ResourceValue::Integer(49));
    }
}
