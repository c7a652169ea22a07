//! # lwm2m-client
//!
//! Tokio runtime for LWM2M object instances.
//!
//! This crate provides:
//! - `TokioScheduler`, the recurring timer used for periodic notification
//! - `ChannelSink`, a notification sink feeding a tokio channel
//! - `ObservationRegistry`, tracking which observer watches which path
//! - `Lwm2mClient`, which owns object instances and serializes requests
//!
//! The transport (CoAP, registration with a server) sits on top of the
//! client handle and the notification channel.

pub mod client;
pub mod observation;
pub mod scheduler;
pub mod sink;

pub use client::{ClientError, ClientHandle, ClientRequest, Lwm2mClient, Notification, ReadContent};
pub use lwm2m_core::{ResourcePath, ResourceValue};
pub use observation::{Observation, ObservationRegistry};
pub use scheduler::TokioScheduler;
pub use sink::ChannelSink;
