//! LWM2M Firmware Update object (object id 5).
//!
//! A package arrives either pushed into the Package resource or pulled by
//! the host from Package URI. Once it is downloaded the server executes
//! Update. The object tracks the State / Update Result pair; fetching and
//! flashing are delegated to a host supplied `FirmwareUpdater`.

use std::sync::Arc;

use tracing::{info, warn};

use lwm2m_core::{
    ActionError, DefinitionError, InstanceId, NotificationSink, ObjectBehavior, ObjectEnabler,
    ObjectId, ObjectInstance, ObjectResource, OperationError, ResourceContext, ResourceId,
    ResourceSpec, ResourceValue, ValueType, WriteDisposition,
};

use crate::validate::is_valid_package_uri;

/// Resources of the Firmware Update object. Id 4 is not used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FirmwareResource {
    Package,
    PackageUri,
    Update,
    State,
    UpdateResult,
    PackageName,
    PackageVersion,
}

/// Executable resources of the Firmware Update object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareAction {
    Update,
}

impl ObjectResource for FirmwareResource {
    type Action = FirmwareAction;

    const OBJECT_ID: ObjectId = 5;
    const OBJECT_NAME: &'static str = "Firmware Update";
    const ALL: &'static [Self] = &[
        FirmwareResource::Package,
        FirmwareResource::PackageUri,
        FirmwareResource::Update,
        FirmwareResource::State,
        FirmwareResource::UpdateResult,
        FirmwareResource::PackageName,
        FirmwareResource::PackageVersion,
    ];

    fn id(self) -> ResourceId {
        match self {
            FirmwareResource::Package => 0,
            FirmwareResource::PackageUri => 1,
            FirmwareResource::Update => 2,
            FirmwareResource::State => 3,
            FirmwareResource::UpdateResult => 5,
            FirmwareResource::PackageName => 6,
            FirmwareResource::PackageVersion => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FirmwareResource::Package => "Package",
            FirmwareResource::PackageUri => "Package URI",
            FirmwareResource::Update => "Update",
            FirmwareResource::State => "State",
            FirmwareResource::UpdateResult => "Update Result",
            FirmwareResource::PackageName => "Package Name",
            FirmwareResource::PackageVersion => "Package Version",
        }
    }

    fn spec(self) -> ResourceSpec {
        match self {
            FirmwareResource::Package => ResourceSpec::write_only(ValueType::Opaque),
            FirmwareResource::PackageUri => ResourceSpec::read_write(ValueType::String),
            FirmwareResource::Update => ResourceSpec::executable(),
            FirmwareResource::State | FirmwareResource::UpdateResult => {
                ResourceSpec::read_only(ValueType::Integer)
            }
            FirmwareResource::PackageName | FirmwareResource::PackageVersion => {
                ResourceSpec::read_only(ValueType::String)
            }
        }
    }

    fn action(self) -> Option<FirmwareAction> {
        match self {
            FirmwareResource::Update => Some(FirmwareAction::Update),
            _ => None,
        }
    }
}

/// Value of the State resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle = 0,
    Downloading = 1,
    Downloaded = 2,
    Updating = 3,
}

impl UpdateState {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(UpdateState::Idle),
            1 => Some(UpdateState::Downloading),
            2 => Some(UpdateState::Downloaded),
            3 => Some(UpdateState::Updating),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Value of the Update Result resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    Initial = 0,
    Success = 1,
    NotEnoughStorage = 2,
    OutOfMemory = 3,
    ConnectionLost = 4,
    IntegrityCheckFailure = 5,
    UnsupportedPackageType = 6,
    InvalidUri = 7,
    UpdateFailed = 8,
}

impl UpdateResult {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(UpdateResult::Initial),
            1 => Some(UpdateResult::Success),
            2 => Some(UpdateResult::NotEnoughStorage),
            3 => Some(UpdateResult::OutOfMemory),
            4 => Some(UpdateResult::ConnectionLost),
            5 => Some(UpdateResult::IntegrityCheckFailure),
            6 => Some(UpdateResult::UnsupportedPackageType),
            7 => Some(UpdateResult::InvalidUri),
            8 => Some(UpdateResult::UpdateFailed),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// What the download hook did with a package URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Fetching continues in the background. The host reports the end
    /// through `FirmwareUpdate::download_finished`.
    Started,
    /// Fetching already ended, e.g. the package was cached locally.
    Finished(Result<(), UpdateResult>),
}

/// Host hooks that fetch and apply firmware.
///
/// Hooks run while the instance is locked and must not call back into the
/// `FirmwareUpdate` handle. Outcomes are returned instead.
pub trait FirmwareUpdater: Send + 'static {
    /// Start fetching the package at `uri`.
    fn download(&mut self, uri: &str) -> Result<DownloadOutcome, ActionError> {
        let _ = uri;
        Ok(DownloadOutcome::Started)
    }

    /// Apply the downloaded firmware. `package` is the pushed payload, or
    /// `None` when the host downloaded it from the package URI.
    fn update(&mut self, package: Option<&[u8]>) -> Result<(), ActionError>;
}

/// Behavior of the Firmware Update object.
pub struct FirmwareObject {
    updater: Box<dyn FirmwareUpdater>,
    package: Option<Vec<u8>>,
}

fn set_status(
    ctx: &mut ResourceContext<'_, FirmwareResource>,
    state: UpdateState,
    result: Option<UpdateResult>,
) -> Result<(), OperationError> {
    ctx.set(FirmwareResource::State, state.code(), true)?;
    if let Some(result) = result {
        ctx.set(FirmwareResource::UpdateResult, result.code(), true)?;
    }
    Ok(())
}

/// Apply the end of a download to State / Update Result.
fn finish_download(
    ctx: &mut ResourceContext<'_, FirmwareResource>,
    outcome: Result<(), UpdateResult>,
) -> Result<(), OperationError> {
    match outcome {
        Ok(()) => {
            info!("Firmware download complete");
            set_status(ctx, UpdateState::Downloaded, Some(UpdateResult::Initial))
        }
        Err(result) => {
            warn!("Firmware download failed: {:?}", result);
            set_status(ctx, UpdateState::Idle, Some(result))
        }
    }
}

fn current_state(ctx: &ResourceContext<'_, FirmwareResource>) -> Option<UpdateState> {
    ctx.get(FirmwareResource::State)
        .and_then(ResourceValue::as_integer)
        .and_then(UpdateState::from_code)
}

impl FirmwareObject {
    fn write_package(
        &mut self,
        ctx: &mut ResourceContext<'_, FirmwareResource>,
        value: ResourceValue,
    ) -> Result<(), OperationError> {
        let resource = FirmwareResource::Package;
        ctx.check(resource, &value)?;

        let package = match value {
            ResourceValue::Opaque(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(OperationError::invalid_value(resource.name(), "empty package")),
        };

        info!("Received firmware package ({} bytes)", package.len());
        self.package = Some(package);
        set_status(ctx, UpdateState::Downloaded, Some(UpdateResult::Initial))
    }

    fn write_package_uri(
        &mut self,
        ctx: &mut ResourceContext<'_, FirmwareResource>,
        value: ResourceValue,
    ) -> Result<(), OperationError> {
        let resource = FirmwareResource::PackageUri;
        ctx.check(resource, &value)?;
        let uri = value.as_str().unwrap_or_default().to_string();

        if uri.is_empty() {
            info!("Package URI cleared, firmware update state reset");
            self.package = None;
            ctx.set(resource, value, true)?;
            return set_status(ctx, UpdateState::Idle, Some(UpdateResult::Initial));
        }

        if !is_valid_package_uri(&uri) {
            return Err(OperationError::invalid_value(
                resource.name(),
                format!("unsupported package URI '{}'", uri),
            ));
        }

        ctx.set(resource, value, true)?;
        set_status(ctx, UpdateState::Downloading, Some(UpdateResult::Initial))?;

        info!("Downloading firmware from {}", uri);
        match self.updater.download(&uri) {
            Ok(DownloadOutcome::Started) => Ok(()),
            Ok(DownloadOutcome::Finished(outcome)) => finish_download(ctx, outcome),
            Err(e) => {
                warn!("Firmware download from {} failed: {}", uri, e);
                set_status(ctx, UpdateState::Idle, Some(UpdateResult::ConnectionLost))
            }
        }
    }

    fn run_update(
        &mut self,
        ctx: &mut ResourceContext<'_, FirmwareResource>,
    ) -> Result<(), OperationError> {
        let resource = FirmwareResource::Update;
        match current_state(ctx) {
            Some(UpdateState::Downloaded) => {}
            state => {
                return Err(OperationError::action_failure(
                    resource.name(),
                    format!("no downloaded firmware (state {:?})", state),
                ))
            }
        }

        info!("Updating firmware");
        set_status(ctx, UpdateState::Updating, None)?;

        let package = self.package.take();
        match self.updater.update(package.as_deref()) {
            Ok(()) => {
                info!("Firmware update succeeded");
                set_status(ctx, UpdateState::Idle, Some(UpdateResult::Success))
            }
            Err(e) => {
                warn!("Firmware update failed: {}", e);
                set_status(ctx, UpdateState::Idle, Some(UpdateResult::UpdateFailed))?;
                Err(OperationError::action_failure(resource.name(), e.reason()))
            }
        }
    }
}

impl ObjectBehavior for FirmwareObject {
    type Resource = FirmwareResource;

    fn initial_values(&self) -> Vec<(FirmwareResource, ResourceValue)> {
        vec![
            (FirmwareResource::PackageUri, ResourceValue::from("")),
            (
                FirmwareResource::State,
                ResourceValue::Integer(UpdateState::Idle.code()),
            ),
            (
                FirmwareResource::UpdateResult,
                ResourceValue::Integer(UpdateResult::Initial.code()),
            ),
        ]
    }

    fn write(
        &mut self,
        ctx: &mut ResourceContext<'_, FirmwareResource>,
        resource: FirmwareResource,
        value: ResourceValue,
    ) -> WriteDisposition {
        match resource {
            FirmwareResource::Package => WriteDisposition::Handled(self.write_package(ctx, value)),
            FirmwareResource::PackageUri => {
                WriteDisposition::Handled(self.write_package_uri(ctx, value))
            }
            _ => WriteDisposition::Default(value),
        }
    }

    fn execute(
        &mut self,
        ctx: &mut ResourceContext<'_, FirmwareResource>,
        action: FirmwareAction,
        _params: Option<&str>,
    ) -> Result<(), OperationError> {
        match action {
            FirmwareAction::Update => self.run_update(ctx),
        }
    }
}

/// A Firmware Update object instance.
///
/// Cloning shares the same instance.
#[derive(Clone)]
pub struct FirmwareUpdate {
    instance: ObjectInstance<FirmwareObject>,
}

impl FirmwareUpdate {
    pub fn new(
        instance_id: InstanceId,
        updater: impl FirmwareUpdater,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, DefinitionError> {
        let behavior = FirmwareObject {
            updater: Box::new(updater),
            package: None,
        };
        Ok(Self {
            instance: ObjectInstance::new(instance_id, behavior, sink)?,
        })
    }

    /// The underlying object instance.
    pub fn instance(&self) -> &ObjectInstance<FirmwareObject> {
        &self.instance
    }

    /// Type-erased handle for registration with a client.
    pub fn enabler(&self) -> Arc<dyn ObjectEnabler> {
        Arc::new(self.instance.clone())
    }

    pub fn state(&self) -> Option<UpdateState> {
        self.instance
            .get(FirmwareResource::State)
            .and_then(|v| v.as_integer())
            .and_then(UpdateState::from_code)
    }

    pub fn update_result(&self) -> Option<UpdateResult> {
        self.instance
            .get(FirmwareResource::UpdateResult)
            .and_then(|v| v.as_integer())
            .and_then(UpdateResult::from_code)
    }

    pub fn package_uri(&self) -> Option<String> {
        self.string(FirmwareResource::PackageUri)
    }

    pub fn package_name(&self) -> Option<String> {
        self.string(FirmwareResource::PackageName)
    }

    pub fn package_version(&self) -> Option<String> {
        self.string(FirmwareResource::PackageVersion)
    }

    fn string(&self, resource: FirmwareResource) -> Option<String> {
        self.instance
            .get(resource)
            .and_then(|v| v.as_str().map(String::from))
    }

    /// Report the outcome of a download started from Package URI.
    ///
    /// Fails if no download is in progress.
    pub fn download_finished(&self, outcome: Result<(), UpdateResult>) -> Result<(), OperationError> {
        self.instance.update(|_, ctx| {
            if current_state(ctx) != Some(UpdateState::Downloading) {
                return Err(OperationError::action_failure(
                    FirmwareResource::State.name(),
                    "no download in progress",
                ));
            }
            finish_download(ctx, outcome)
        })
    }

    /// Record name and version of the package.
    pub fn set_package_info(&self, name: &str, version: &str) -> Result<(), OperationError> {
        self.instance.update(|_, ctx| {
            ctx.set(FirmwareResource::PackageName, name, true)?;
            ctx.set(FirmwareResource::PackageVersion, version, true)
        })
    }
}
