//! # lwm2m-objects
//!
//! Standard LWM2M objects built on the `lwm2m-core` engine:
//! - Device (object 3)
//! - Firmware Update (object 5)
//!
//! Each object is a resource enumeration plus an `ObjectBehavior`, wrapped
//! in a small handle type with typed accessors for the host application.

pub mod device;
pub mod firmware;
mod validate;

pub use device::{Device, DeviceAction, DeviceBuilder, DeviceControl, DeviceResource};
pub use firmware::{
    DownloadOutcome, FirmwareAction, FirmwareResource, FirmwareUpdate, FirmwareUpdater, UpdateResult,
    UpdateState,
};
