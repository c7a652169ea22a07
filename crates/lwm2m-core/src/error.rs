//! Error types for object operations and object definitions.

use thiserror::Error;

use crate::model::ValueShape;
use crate::resource::{ObjectId, ResourceId};

/// Failure of a single read, write or execute operation.
///
/// These are returned to the transport layer as typed results. A failed
/// operation never leaves a partial write behind in the resource store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OperationError {
    /// The resource id is not part of the object's enumeration.
    #[error("resource {resource_id} is not defined for object {object_id}")]
    InvalidResource {
        object_id: ObjectId,
        resource_id: ResourceId,
    },

    /// The operation is not permitted on this resource.
    #[error("{operation} is not allowed on resource '{resource}'")]
    AccessDenied {
        resource: &'static str,
        operation: Operation,
    },

    /// The value type does not match the resource's declared type.
    #[error("resource '{resource}' expects {expected}, got {found}")]
    TypeMismatch {
        resource: &'static str,
        expected: ValueShape,
        found: ValueShape,
    },

    /// The resource exists but cannot be operated on this way.
    #[error("{operation} found nothing for resource '{resource}'")]
    NotFound {
        resource: &'static str,
        operation: Operation,
    },

    /// The value has the right type but was rejected by the object.
    #[error("invalid value for resource '{resource}': {reason}")]
    InvalidValue {
        resource: &'static str,
        reason: String,
    },

    /// An action handler or a computed read reported a failure.
    #[error("'{resource}' failed: {reason}")]
    ActionFailure {
        resource: &'static str,
        reason: String,
    },
}

impl OperationError {
    /// CoAP response code the transport should answer with.
    pub fn code(&self) -> &'static str {
        match self {
            OperationError::InvalidResource { .. } | OperationError::NotFound { .. } => "4.04",
            OperationError::AccessDenied { .. } => "4.05",
            OperationError::TypeMismatch { .. } | OperationError::InvalidValue { .. } => "4.00",
            OperationError::ActionFailure { .. } => "5.00",
        }
    }

    pub fn action_failure(resource: &'static str, reason: impl Into<String>) -> Self {
        OperationError::ActionFailure {
            resource,
            reason: reason.into(),
        }
    }

    pub fn invalid_value(resource: &'static str, reason: impl Into<String>) -> Self {
        OperationError::InvalidValue {
            resource,
            reason: reason.into(),
        }
    }
}

/// The three operations a server can perform on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Execute,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Read => f.write_str("read"),
            Operation::Write => f.write_str("write"),
            Operation::Execute => f.write_str("execute"),
        }
    }
}

/// Failure reported by a host-supplied action (reboot, firmware update, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ActionError {
    reason: String,
}

impl ActionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Failure while computing the value of a computed resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("could not compute value: {0}")]
pub struct ComputeError(pub String);

/// An object definition that cannot be instantiated.
///
/// Detected when an instance is built, never at call time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DefinitionError {
    #[error("object {object_id} declares resource id {resource_id} more than once")]
    DuplicateResourceId {
        object_id: ObjectId,
        resource_id: ResourceId,
    },

    #[error("executable resource '{resource}' of object {object_id} has no action handler")]
    MissingActionHandler {
        object_id: ObjectId,
        resource: &'static str,
    },

    #[error("resource '{resource}' of object {object_id} has an action but is not executable")]
    UnexpectedAction {
        object_id: ObjectId,
        resource: &'static str,
    },

    #[error("initial value for resource '{resource}' rejected: {source}")]
    InvalidInitialValue {
        resource: &'static str,
        #[source]
        source: OperationError,
    },
}
