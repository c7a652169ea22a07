//! LWM2M Device object (object id 3).
//!
//! Device identity, power, memory and error information, device time, plus
//! the Reboot and Factory Reset actions. Reboot and Factory Reset are
//! delegated to a host supplied `DeviceControl`; the object itself never
//! reboots anything.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use tracing::{info, warn};

use lwm2m_core::config::{BindingMode, DeviceInfo, TimeSettings};
use lwm2m_core::{
    ActionError, Clock, ComputeError, DefinitionError, InstanceId, NoopSink, NotificationSink,
    ObjectBehavior, ObjectEnabler, ObjectId, ObjectInstance, ObjectResource, OperationError,
    PeriodicNotifier, ResourceContext, ResourceId, ResourceSpec, ResourceValue, Scheduler,
    SystemClock, ValueType, WriteDisposition,
};

use crate::validate::{is_valid_timezone, is_valid_utc_offset};

/// Resources of the Device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeviceResource {
    Manufacturer,
    ModelNumber,
    SerialNumber,
    FirmwareVersion,
    Reboot,
    FactoryReset,
    AvailablePowerSources,
    PowerSourceVoltage,
    PowerSourceCurrent,
    BatteryLevel,
    MemoryFree,
    ErrorCode,
    ResetErrorCode,
    CurrentTime,
    UtcOffset,
    Timezone,
    SupportedBinding,
    DeviceType,
    HardwareVersion,
    SoftwareVersion,
    BatteryStatus,
    MemoryTotal,
}

/// Executable resources of the Device object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Reboot,
    FactoryReset,
    ResetErrorCode,
}

impl ObjectResource for DeviceResource {
    type Action = DeviceAction;

    const OBJECT_ID: ObjectId = 3;
    const OBJECT_NAME: &'static str = "Device";
    const ALL: &'static [Self] = &[
        DeviceResource::Manufacturer,
        DeviceResource::ModelNumber,
        DeviceResource::SerialNumber,
        DeviceResource::FirmwareVersion,
        DeviceResource::Reboot,
        DeviceResource::FactoryReset,
        DeviceResource::AvailablePowerSources,
        DeviceResource::PowerSourceVoltage,
        DeviceResource::PowerSourceCurrent,
        DeviceResource::BatteryLevel,
        DeviceResource::MemoryFree,
        DeviceResource::ErrorCode,
        DeviceResource::ResetErrorCode,
        DeviceResource::CurrentTime,
        DeviceResource::UtcOffset,
        DeviceResource::Timezone,
        DeviceResource::SupportedBinding,
        DeviceResource::DeviceType,
        DeviceResource::HardwareVersion,
        DeviceResource::SoftwareVersion,
        DeviceResource::BatteryStatus,
        DeviceResource::MemoryTotal,
    ];

    fn id(self) -> ResourceId {
        match self {
            DeviceResource::Manufacturer => 0,
            DeviceResource::ModelNumber => 1,
            DeviceResource::SerialNumber => 2,
            DeviceResource::FirmwareVersion => 3,
            DeviceResource::Reboot => 4,
            DeviceResource::FactoryReset => 5,
            DeviceResource::AvailablePowerSources => 6,
            DeviceResource::PowerSourceVoltage => 7,
            DeviceResource::PowerSourceCurrent => 8,
            DeviceResource::BatteryLevel => 9,
            DeviceResource::MemoryFree => 10,
            DeviceResource::ErrorCode => 11,
            DeviceResource::ResetErrorCode => 12,
            DeviceResource::CurrentTime => 13,
            DeviceResource::UtcOffset => 14,
            DeviceResource::Timezone => 15,
            DeviceResource::SupportedBinding => 16,
            DeviceResource::DeviceType => 17,
            DeviceResource::HardwareVersion => 18,
            DeviceResource::SoftwareVersion => 19,
            DeviceResource::BatteryStatus => 20,
            DeviceResource::MemoryTotal => 21,
        }
    }

    fn name(self) -> &'static str {
        match self {
            DeviceResource::Manufacturer => "Manufacturer",
            DeviceResource::ModelNumber => "Model Number",
            DeviceResource::SerialNumber => "Serial Number",
            DeviceResource::FirmwareVersion => "Firmware Version",
            DeviceResource::Reboot => "Reboot",
            DeviceResource::FactoryReset => "Factory Reset",
            DeviceResource::AvailablePowerSources => "Available Power Sources",
            DeviceResource::PowerSourceVoltage => "Power Source Voltage",
            DeviceResource::PowerSourceCurrent => "Power Source Current",
            DeviceResource::BatteryLevel => "Battery Level",
            DeviceResource::MemoryFree => "Memory Free",
            DeviceResource::ErrorCode => "Error Code",
            DeviceResource::ResetErrorCode => "Reset Error Code",
            DeviceResource::CurrentTime => "Current Time",
            DeviceResource::UtcOffset => "UTC Offset",
            DeviceResource::Timezone => "Timezone",
            DeviceResource::SupportedBinding => "Supported Binding and Modes",
            DeviceResource::DeviceType => "Device Type",
            DeviceResource::HardwareVersion => "Hardware Version",
            DeviceResource::SoftwareVersion => "Software Version",
            DeviceResource::BatteryStatus => "Battery Status",
            DeviceResource::MemoryTotal => "Memory Total",
        }
    }

    fn spec(self) -> ResourceSpec {
        use DeviceResource::*;

        match self {
            Manufacturer | ModelNumber | SerialNumber | FirmwareVersion | SupportedBinding
            | DeviceType | HardwareVersion | SoftwareVersion => {
                ResourceSpec::read_only(ValueType::String)
            }
            Reboot | FactoryReset | ResetErrorCode => ResourceSpec::executable(),
            AvailablePowerSources | PowerSourceVoltage | PowerSourceCurrent => {
                ResourceSpec::read_only(ValueType::Integer).multiple()
            }
            BatteryLevel | MemoryFree | ErrorCode | BatteryStatus | MemoryTotal => {
                ResourceSpec::read_only(ValueType::Integer)
            }
            CurrentTime => ResourceSpec::read_only(ValueType::Time).computed(),
            UtcOffset | Timezone => ResourceSpec::read_write(ValueType::String),
        }
    }

    fn action(self) -> Option<DeviceAction> {
        match self {
            DeviceResource::Reboot => Some(DeviceAction::Reboot),
            DeviceResource::FactoryReset => Some(DeviceAction::FactoryReset),
            DeviceResource::ResetErrorCode => Some(DeviceAction::ResetErrorCode),
            _ => None,
        }
    }
}

/// Host hooks for the Device actions that reach outside the object.
///
/// Hooks run while the instance is locked. They change Device values
/// through `ctx` and must not call back into the `Device` handle.
pub trait DeviceControl: Send + 'static {
    /// Reboot the device to recover from an unexpected firmware failure.
    fn reboot(&mut self, ctx: &mut ResourceContext<'_, DeviceResource>) -> Result<(), ActionError>;

    /// Restore the configuration of the initial deployment.
    fn factory_reset(
        &mut self,
        ctx: &mut ResourceContext<'_, DeviceResource>,
    ) -> Result<(), ActionError>;
}

/// Behavior of the Device object.
pub struct DeviceObject {
    identity: Option<DeviceInfo>,
    time: TimeSettings,
    clock: Arc<dyn Clock>,
    control: Box<dyn DeviceControl>,
}

impl DeviceObject {
    fn validated_write(
        ctx: &mut ResourceContext<'_, DeviceResource>,
        resource: DeviceResource,
        value: ResourceValue,
        is_valid: fn(&str) -> bool,
    ) -> Result<(), OperationError> {
        ctx.check(resource, &value)?;
        if value.as_str().is_some_and(is_valid) {
            ctx.set(resource, value, true)
        } else {
            Err(OperationError::invalid_value(
                resource.name(),
                format!("{} is not a valid {}", value, resource.name()),
            ))
        }
    }
}

impl ObjectBehavior for DeviceObject {
    type Resource = DeviceResource;

    fn initial_values(&self) -> Vec<(DeviceResource, ResourceValue)> {
        let utc_offset = self
            .time
            .utc_offset
            .clone()
            .unwrap_or_else(local_utc_offset);

        let mut values = vec![
            (DeviceResource::UtcOffset, ResourceValue::from(utc_offset)),
            (
                DeviceResource::Timezone,
                ResourceValue::from(self.time.timezone.clone().unwrap_or_else(host_timezone)),
            ),
            (DeviceResource::ErrorCode, ResourceValue::Integer(0)),
        ];

        if let Some(info) = &self.identity {
            values.push((
                DeviceResource::Manufacturer,
                ResourceValue::from(info.manufacturer.as_str()),
            ));
            values.push((
                DeviceResource::ModelNumber,
                ResourceValue::from(info.model_number.as_str()),
            ));
            values.push((
                DeviceResource::SerialNumber,
                ResourceValue::from(info.serial_number.as_str()),
            ));
            values.push((
                DeviceResource::SupportedBinding,
                ResourceValue::from(info.binding.as_str()),
            ));

            let optional = [
                (DeviceResource::FirmwareVersion, &info.firmware_version),
                (DeviceResource::HardwareVersion, &info.hardware_version),
                (DeviceResource::SoftwareVersion, &info.software_version),
                (DeviceResource::DeviceType, &info.device_type),
            ];
            for (resource, value) in optional {
                if let Some(value) = value {
                    values.push((resource, ResourceValue::from(value.as_str())));
                }
            }
            if let Some(total) = info.memory_total {
                values.push((DeviceResource::MemoryTotal, ResourceValue::Integer(total)));
            }
        }

        values
    }

    fn compute(&self, resource: DeviceResource) -> Option<Result<ResourceValue, ComputeError>> {
        match resource {
            DeviceResource::CurrentTime => Some(Ok(ResourceValue::Time(self.clock.now()))),
            _ => None,
        }
    }

    fn write(
        &mut self,
        ctx: &mut ResourceContext<'_, DeviceResource>,
        resource: DeviceResource,
        value: ResourceValue,
    ) -> WriteDisposition {
        match resource {
            DeviceResource::UtcOffset => WriteDisposition::Handled(Self::validated_write(
                ctx,
                resource,
                value,
                is_valid_utc_offset,
            )),
            DeviceResource::Timezone => WriteDisposition::Handled(Self::validated_write(
                ctx,
                resource,
                value,
                is_valid_timezone,
            )),
            _ => WriteDisposition::Default(value),
        }
    }

    fn execute(
        &mut self,
        ctx: &mut ResourceContext<'_, DeviceResource>,
        action: DeviceAction,
        _params: Option<&str>,
    ) -> Result<(), OperationError> {
        match action {
            DeviceAction::Reboot => {
                info!("Rebooting device");
                self.control.reboot(ctx).map_err(|e| {
                    warn!("Reboot failed: {}", e);
                    OperationError::action_failure(DeviceResource::Reboot.name(), e.reason())
                })
            }
            DeviceAction::FactoryReset => {
                info!("Performing factory reset");
                self.control.factory_reset(ctx).map_err(|e| {
                    warn!("Factory reset failed: {}", e);
                    OperationError::action_failure(DeviceResource::FactoryReset.name(), e.reason())
                })
            }
            DeviceAction::ResetErrorCode => ctx.set(DeviceResource::ErrorCode, 0i64, true),
        }
    }
}

/// Offset of the host's local time zone, as "+HH:MM".
fn local_utc_offset() -> String {
    Local::now().format("%:z").to_string()
}

/// IANA name of the host's time zone.
fn host_timezone() -> String {
    let tz = std::env::var("TZ").ok();
    let etc = std::fs::read_to_string("/etc/timezone").ok();
    resolve_host_timezone(tz.as_deref(), etc.as_deref())
}

/// First usable zone name from the `TZ` variable or `/etc/timezone`.
fn resolve_host_timezone(tz: Option<&str>, etc_timezone: Option<&str>) -> String {
    let from_tz = tz.map(|tz| {
        let tz = tz.trim().trim_start_matches(':');
        // TZ=/usr/share/zoneinfo/Europe/Berlin
        tz.split_once("zoneinfo/").map_or(tz, |(_, name)| name)
    });
    let from_etc = etc_timezone.map(str::trim);

    [from_tz, from_etc]
        .into_iter()
        .flatten()
        .find(|name| is_valid_timezone(name))
        .unwrap_or("UTC")
        .to_string()
}

/// Builder for a `Device`.
pub struct DeviceBuilder {
    instance_id: InstanceId,
    identity: Option<DeviceInfo>,
    time: TimeSettings,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    control: Box<dyn DeviceControl>,
}

impl DeviceBuilder {
    /// Object instance id (0 unless the host runs several devices).
    pub fn instance_id(mut self, instance_id: InstanceId) -> Self {
        self.instance_id = instance_id;
        self
    }

    /// Static identity: manufacturer, model, serial, binding and the
    /// optional version fields.
    pub fn identity(mut self, info: DeviceInfo) -> Self {
        self.identity = Some(info);
        self
    }

    pub fn time(mut self, time: TimeSettings) -> Self {
        self.time = time;
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Build the device. No notifications are emitted.
    pub fn build(self) -> Result<Device, DefinitionError> {
        if let Some(offset) = &self.time.utc_offset {
            if !is_valid_utc_offset(offset) {
                return Err(invalid_setting(DeviceResource::UtcOffset, offset));
            }
        }
        if let Some(timezone) = &self.time.timezone {
            if !is_valid_timezone(timezone) {
                return Err(invalid_setting(DeviceResource::Timezone, timezone));
            }
        }

        let behavior = DeviceObject {
            identity: self.identity,
            time: self.time,
            clock: self.clock,
            control: self.control,
        };
        let instance = ObjectInstance::new(self.instance_id, behavior, self.sink)?;
        Ok(Device { instance })
    }
}

fn invalid_setting(resource: DeviceResource, value: &str) -> DefinitionError {
    DefinitionError::InvalidInitialValue {
        resource: resource.name(),
        source: OperationError::invalid_value(
            resource.name(),
            format!("'{}' is not a valid {}", value, resource.name()),
        ),
    }
}

/// A Device object instance.
///
/// Cloning shares the same instance.
#[derive(Clone)]
pub struct Device {
    instance: ObjectInstance<DeviceObject>,
}

impl Device {
    /// Start building a device around the host's action hooks.
    pub fn builder(control: impl DeviceControl) -> DeviceBuilder {
        DeviceBuilder {
            instance_id: 0,
            identity: None,
            time: TimeSettings::default(),
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopSink),
            control: Box::new(control),
        }
    }

    /// Device with static identity. A missing binding defaults to UDP.
    pub fn with_identity(
        manufacturer: &str,
        model_number: &str,
        serial_number: &str,
        binding: Option<BindingMode>,
        control: impl DeviceControl,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, DefinitionError> {
        let info = DeviceInfo {
            manufacturer: manufacturer.to_string(),
            model_number: model_number.to_string(),
            serial_number: serial_number.to_string(),
            binding: binding.unwrap_or_default(),
            ..DeviceInfo::default()
        };
        Self::builder(control).identity(info).sink(sink).build()
    }

    /// The underlying object instance.
    pub fn instance(&self) -> &ObjectInstance<DeviceObject> {
        &self.instance
    }

    /// Type-erased handle for registration with a client.
    pub fn enabler(&self) -> Arc<dyn ObjectEnabler> {
        Arc::new(self.instance.clone())
    }

    /// Notify Current Time after `delay` and then every `period`.
    pub fn start_clock_notifier(
        &self,
        delay: Duration,
        period: Duration,
        scheduler: &dyn Scheduler,
    ) -> PeriodicNotifier {
        self.instance
            .start_periodic_notifier(DeviceResource::CurrentTime, delay, period, scheduler)
    }

    fn string(&self, resource: DeviceResource) -> Option<String> {
        self.instance
            .get(resource)
            .and_then(|v| v.as_str().map(String::from))
    }

    fn integer(&self, resource: DeviceResource) -> Option<i64> {
        self.instance.get(resource).and_then(|v| v.as_integer())
    }

    fn integer_map(&self, resource: DeviceResource) -> Option<BTreeMap<u16, i64>> {
        self.instance.get(resource).and_then(|v| v.as_integer_map())
    }

    fn set(
        &self,
        resource: DeviceResource,
        value: impl Into<ResourceValue>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.instance.set(resource, value, fire_change)
    }

    pub fn manufacturer(&self) -> Option<String> {
        self.string(DeviceResource::Manufacturer)
    }

    pub fn model_number(&self) -> Option<String> {
        self.string(DeviceResource::ModelNumber)
    }

    pub fn serial_number(&self) -> Option<String> {
        self.string(DeviceResource::SerialNumber)
    }

    pub fn firmware_version(&self) -> Option<String> {
        self.string(DeviceResource::FirmwareVersion)
    }

    pub fn hardware_version(&self) -> Option<String> {
        self.string(DeviceResource::HardwareVersion)
    }

    pub fn software_version(&self) -> Option<String> {
        self.string(DeviceResource::SoftwareVersion)
    }

    pub fn device_type(&self) -> Option<String> {
        self.string(DeviceResource::DeviceType)
    }

    /// Power source kinds by instance: 0 DC, 1 internal battery, 2 external
    /// battery, 4 PoE, 5 USB, 6 AC mains, 7 solar.
    pub fn available_power_sources(&self) -> Option<BTreeMap<u16, i64>> {
        self.integer_map(DeviceResource::AvailablePowerSources)
    }

    /// Voltage per power source instance, in mV.
    pub fn power_source_voltage(&self) -> Option<BTreeMap<u16, i64>> {
        self.integer_map(DeviceResource::PowerSourceVoltage)
    }

    /// Current per power source instance, in mA.
    pub fn power_source_current(&self) -> Option<BTreeMap<u16, i64>> {
        self.integer_map(DeviceResource::PowerSourceCurrent)
    }

    /// Battery charge in percent.
    pub fn battery_level(&self) -> Option<i64> {
        self.integer(DeviceResource::BatteryLevel)
    }

    /// 0 normal, 1 charging, 2 charge complete, 3 damaged, 4 low, 5 not
    /// installed, 6 unknown.
    pub fn battery_status(&self) -> Option<i64> {
        self.integer(DeviceResource::BatteryStatus)
    }

    /// Free storage in KB.
    pub fn memory_free(&self) -> Option<i64> {
        self.integer(DeviceResource::MemoryFree)
    }

    /// Total storage in KB.
    pub fn memory_total(&self) -> Option<i64> {
        self.integer(DeviceResource::MemoryTotal)
    }

    /// 0 means no error.
    pub fn error_code(&self) -> Option<i64> {
        self.integer(DeviceResource::ErrorCode)
    }

    pub fn utc_offset(&self) -> Option<String> {
        self.string(DeviceResource::UtcOffset)
    }

    pub fn timezone(&self) -> Option<String> {
        self.string(DeviceResource::Timezone)
    }

    /// Current device time.
    pub fn current_time(&self) -> DateTime<Utc> {
        self.instance.with_behavior(|device| device.clock.now())
    }

    /// Decode the stored binding letter.
    pub fn supported_binding(&self) -> Option<BindingMode> {
        self.string(DeviceResource::SupportedBinding)
            .map(|letter| BindingMode::from_letter(&letter))
    }

    pub fn set_manufacturer(&self, manufacturer: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::Manufacturer, manufacturer, fire_change)
    }

    pub fn set_model_number(&self, model_number: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::ModelNumber, model_number, fire_change)
    }

    pub fn set_serial_number(&self, serial_number: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::SerialNumber, serial_number, fire_change)
    }

    pub fn set_firmware_version(&self, version: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::FirmwareVersion, version, fire_change)
    }

    pub fn set_hardware_version(&self, version: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::HardwareVersion, version, fire_change)
    }

    pub fn set_software_version(&self, version: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::SoftwareVersion, version, fire_change)
    }

    pub fn set_device_type(&self, device_type: &str, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::DeviceType, device_type, fire_change)
    }

    pub fn set_supported_binding(&self, binding: BindingMode, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::SupportedBinding, binding.as_str(), fire_change)
    }

    pub fn set_available_power_sources(
        &self,
        sources: BTreeMap<u16, i64>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.set(DeviceResource::AvailablePowerSources, sources, fire_change)
    }

    pub fn set_power_source_voltage(
        &self,
        voltage: BTreeMap<u16, i64>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.set(DeviceResource::PowerSourceVoltage, voltage, fire_change)
    }

    pub fn set_power_source_current(
        &self,
        current: BTreeMap<u16, i64>,
        fire_change: bool,
    ) -> Result<(), OperationError> {
        self.set(DeviceResource::PowerSourceCurrent, current, fire_change)
    }

    pub fn set_battery_level(&self, level: i64, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::BatteryLevel, level, fire_change)
    }

    pub fn set_battery_status(&self, status: i64, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::BatteryStatus, status, fire_change)
    }

    pub fn set_memory_free(&self, free: i64, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::MemoryFree, free, fire_change)
    }

    pub fn set_memory_total(&self, total: i64, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::MemoryTotal, total, fire_change)
    }

    pub fn set_error_code(&self, code: i64, fire_change: bool) -> Result<(), OperationError> {
        self.set(DeviceResource::ErrorCode, code, fire_change)
    }

    /// Set the UTC offset. The format is validated.
    pub fn set_utc_offset(&self, offset: &str, fire_change: bool) -> Result<(), OperationError> {
        if !is_valid_utc_offset(offset) {
            return Err(OperationError::invalid_value(
                DeviceResource::UtcOffset.name(),
                format!("'{}' is not a valid UTC Offset", offset),
            ));
        }
        self.set(DeviceResource::UtcOffset, offset, fire_change)
    }

    /// Set the IANA time zone. The format is validated.
    pub fn set_timezone(&self, timezone: &str, fire_change: bool) -> Result<(), OperationError> {
        if !is_valid_timezone(timezone) {
            return Err(OperationError::invalid_value(
                DeviceResource::Timezone.name(),
                format!("'{}' is not a valid Timezone", timezone),
            ));
        }
        self.set(DeviceResource::Timezone, timezone, fire_change)
    }
}
