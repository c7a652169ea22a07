//! # lwm2m-core
//!
//! Core LWM2M object model engine.
//!
//! This crate provides:
//! - Resource value model and declared types
//! - Resource enumerations with their access policy
//! - Per-instance resource store with type checking
//! - Operation dispatch (read, write, execute) with typed errors
//! - Resource change notification and periodic self-notification
//! - Client configuration types
//!
//! This crate is intentionally runtime-agnostic and contains no async code.
//! Timers come in through the `Scheduler` trait; the tokio implementation
//! lives in `lwm2m-client`.

pub mod config;
pub mod error;
pub mod instance;
pub mod model;
pub mod notify;
pub mod path;
pub mod resource;
pub mod schedule;
pub mod store;

pub use error::{ActionError, ComputeError, DefinitionError, Operation, OperationError};
pub use instance::{
    ObjectBehavior, ObjectEnabler, ObjectInstance, PeriodicNotifier, ResourceContext,
    WriteDisposition,
};
pub use model::*;
pub use notify::{NoopSink, NotificationSink, Notifier, RecordingSink, ResourceChanged};
pub use path::{PathError, ResourcePath};
pub use resource::{
    InstanceId, ObjectId, ObjectResource, Operations, ResourceId, ResourceSpec,
};
pub use schedule::{Clock, FixedClock, ManualScheduler, ScheduledTask, Scheduler, SystemClock};
pub use store::ResourceStore;
