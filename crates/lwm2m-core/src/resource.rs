//! Resource enumerations and access policy.
//!
//! Each object type declares a closed enum of its resources. The enum maps
//! protocol-assigned resource ids to names, and carries the access policy
//! for each resource: which operations are permitted, whether it holds one
//! value or several instances, and its declared value type.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::model::{Multiplicity, ValueShape, ValueType};

/// Protocol-assigned object id (e.g. 3 for Device).
pub type ObjectId = u16;

/// Object instance id. Device-level objects are singletons at instance 0.
pub type InstanceId = u16;

/// Protocol-assigned resource id within an object.
pub type ResourceId = u16;

/// Operations permitted on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operations {
    /// No operation is allowed.
    None,
    /// Read-only.
    R,
    /// Write-only.
    W,
    /// Readable and writable.
    RW,
    /// Executable action; never holds a value.
    E,
}

impl Operations {
    pub fn is_readable(self) -> bool {
        matches!(self, Operations::R | Operations::RW)
    }

    pub fn is_writable(self) -> bool {
        matches!(self, Operations::W | Operations::RW)
    }

    pub fn is_executable(self) -> bool {
        self == Operations::E
    }
}

/// Access policy entry for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceSpec {
    pub operations: Operations,
    pub multiplicity: Multiplicity,
    pub value_type: ValueType,
    /// The value is derived on every read instead of being stored.
    pub computed: bool,
}

impl ResourceSpec {
    pub const fn read_only(value_type: ValueType) -> Self {
        Self::new(Operations::R, value_type)
    }

    pub const fn read_write(value_type: ValueType) -> Self {
        Self::new(Operations::RW, value_type)
    }

    pub const fn write_only(value_type: ValueType) -> Self {
        Self::new(Operations::W, value_type)
    }

    pub const fn executable() -> Self {
        Self::new(Operations::E, ValueType::None)
    }

    const fn new(operations: Operations, value_type: ValueType) -> Self {
        Self {
            operations,
            multiplicity: Multiplicity::Single,
            value_type,
            computed: false,
        }
    }

    /// Mark the resource as multi-instance.
    pub const fn multiple(mut self) -> Self {
        self.multiplicity = Multiplicity::Multiple;
        self
    }

    /// Mark the resource as computed on read.
    pub const fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn shape(&self) -> ValueShape {
        ValueShape {
            value_type: self.value_type,
            multiplicity: self.multiplicity,
        }
    }
}

/// A resource enumeration for one object type.
///
/// Implemented by a closed enum per object. The associated `Action` type is
/// a closed enum of that object's executable resources; handlers match on it
/// exhaustively.
pub trait ObjectResource:
    Copy + Eq + Ord + Hash + Debug + Send + Sync + 'static
{
    /// Executable actions of this object type.
    type Action: Copy + Debug + Send + 'static;

    /// Protocol-assigned object id.
    const OBJECT_ID: ObjectId;

    /// Human readable object name.
    const OBJECT_NAME: &'static str;

    /// Every resource of the object, in resource id order.
    const ALL: &'static [Self];

    /// Protocol-assigned resource id.
    fn id(self) -> ResourceId;

    /// Human readable resource name.
    fn name(self) -> &'static str;

    /// Access policy for this resource.
    fn spec(self) -> ResourceSpec;

    /// The action run when this resource is executed.
    fn action(self) -> Option<Self::Action> {
        None
    }

    /// Look up a resource by id.
    fn from_id(id: ResourceId) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.id() == id)
    }
}

/// Check that an enumeration is internally consistent.
///
/// Ids must be unique, and the set of resources with an action must be
/// exactly the set the access policy marks executable.
pub fn validate_enumeration<R: ObjectResource>() -> Result<(), DefinitionError> {
    let mut seen = HashSet::new();

    for resource in R::ALL {
        if !seen.insert(resource.id()) {
            return Err(DefinitionError::DuplicateResourceId {
                object_id: R::OBJECT_ID,
                resource_id: resource.id(),
            });
        }

        let executable = resource.spec().operations.is_executable();
        match (executable, resource.action()) {
            (true, None) => {
                return Err(DefinitionError::MissingActionHandler {
                    object_id: R::OBJECT_ID,
                    resource: resource.name(),
                })
            }
            (false, Some(_)) => {
                return Err(DefinitionError::UnexpectedAction {
                    object_id: R::OBJECT_ID,
                    resource: resource.name(),
                })
            }
            _ => {}
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A small object used by the core tests.
    ///
    /// Ids are deliberately non-contiguous.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub(crate) enum Lamp {
        Name,
        Dimmer,
        On,
        Toggle,
        Reset,
        Uptime,
        Colors,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) enum LampAction {
        Toggle,
        Reset,
    }

    impl ObjectResource for Lamp {
        type Action = LampAction;
        const OBJECT_ID: ObjectId = 3311;
        const OBJECT_NAME: &'static str = "Light Control";
        const ALL: &'static [Self] = &[
            Lamp::Name,
            Lamp::Dimmer,
            Lamp::On,
            Lamp::Toggle,
            Lamp::Reset,
            Lamp::Uptime,
            Lamp::Colors,
        ];

        fn id(self) -> ResourceId {
            match self {
                Lamp::Name => 0,
                Lamp::Dimmer => 1,
                Lamp::On => 2,
                Lamp::Toggle => 4,
                Lamp::Reset => 5,
                Lamp::Uptime => 8,
                Lamp::Colors => 9,
            }
        }

        fn name(self) -> &'static str {
            match self {
                Lamp::Name => "Name",
                Lamp::Dimmer => "Dimmer",
                Lamp::On => "On/Off",
                Lamp::Toggle => "Toggle",
                Lamp::Reset => "Reset",
                Lamp::Uptime => "Uptime",
                Lamp::Colors => "Colors",
            }
        }

        fn spec(self) -> ResourceSpec {
            match self {
                Lamp::Name => ResourceSpec::read_only(ValueType::String),
                Lamp::Dimmer => ResourceSpec::read_write(ValueType::Integer),
                Lamp::On => ResourceSpec::read_write(ValueType::Boolean),
                Lamp::Toggle | Lamp::Reset => ResourceSpec::executable(),
                Lamp::Uptime => ResourceSpec::read_only(ValueType::Time).computed(),
                Lamp::Colors => ResourceSpec::read_write(ValueType::String).multiple(),
            }
        }

        fn action(self) -> Option<LampAction> {
            match self {
                Lamp::Toggle => Some(LampAction::Toggle),
                Lamp::Reset => Some(LampAction::Reset),
                _ => None,
            }
        }
    }

    /// An enumeration that forgot to wire one of its executable resources.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub(crate) enum Broken {
        Label,
        Restart,
    }

    impl ObjectResource for Broken {
        type Action = ();
        const OBJECT_ID: ObjectId = 9000;
        const OBJECT_NAME: &'static str = "Broken";
        const ALL: &'static [Self] = &[Broken::Label, Broken::Restart];

        fn id(self) -> ResourceId {
            match self {
                Broken::Label => 0,
                Broken::Restart => 1,
            }
        }

        fn name(self) -> &'static str {
            match self {
                Broken::Label => "Label",
                Broken::Restart => "Restart",
            }
        }

        fn spec(self) -> ResourceSpec {
            match self {
                Broken::Label => ResourceSpec::read_only(ValueType::String),
                Broken::Restart => ResourceSpec::executable(),
            }
        }
    }

    #[test]
    fn test_operations() {
        assert!(Operations::R.is_readable());
        assert!(!Operations::R.is_writable());
        assert!(Operations::RW.is_writable());
        assert!(Operations::W.is_writable());
        assert!(!Operations::W.is_readable());
        assert!(Operations::E.is_executable());
        assert!(!Operations::E.is_readable());
        assert!(!Operations::None.is_readable());
    }

    #[test]
    fn test_from_id_non_contiguous() {
        assert_eq!(Lamp::from_id(4), Some(Lamp::Toggle));
        assert_eq!(Lamp::from_id(9), Some(Lamp::Colors));
        assert_eq!(Lamp::from_id(3), None);
        assert_eq!(Lamp::from_id(7), None);
        assert_eq!(Lamp::from_id(100), None);
    }

    #[test]
    fn test_spec_builders() {
        let spec = Lamp::Colors.spec();
        assert_eq!(spec.multiplicity, Multiplicity::Multiple);
        assert_eq!(spec.shape(), ValueShape::multiple(ValueType::String));

        let spec = Lamp::Uptime.spec();
        assert!(spec.computed);
        assert_eq!(spec.operations, Operations::R);
    }

    #[test]
    fn test_validate_enumeration() {
        assert!(validate_enumeration::<Lamp>().is_ok());

        let err = validate_enumeration::<Broken>().unwrap_err();
        assert_eq!(
            err,
            DefinitionError::MissingActionHandler {
                object_id: 9000,
                resource: "Restart",
            }
        );
    }
}
