//! LWM2M resource value model.
//!
//! Every resource declares one value type for the lifetime of its object
//! type. The values themselves are a tagged union:
//! - Scalars (string, integer, float, boolean, time, opaque)
//! - Multi-instance maps of instance index to scalar
//!
//! Encoding values on the wire (TLV, SenML, ...) is left to the transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Declared type of a resource's value.
///
/// `None` is used for action resources, which never hold a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    None,
    String,
    Integer,
    Float,
    Boolean,
    Time,
    Opaque,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueType::None => "none",
            ValueType::String => "string",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::Boolean => "boolean",
            ValueType::Time => "time",
            ValueType::Opaque => "opaque",
        };
        f.write_str(name)
    }
}

/// Whether a resource holds one value or a map of resource instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Multiplicity {
    Single,
    Multiple,
}

/// Value type plus multiplicity, used for type checking writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueShape {
    pub value_type: ValueType,
    pub multiplicity: Multiplicity,
}

impl ValueShape {
    pub const fn single(value_type: ValueType) -> Self {
        Self {
            value_type,
            multiplicity: Multiplicity::Single,
        }
    }

    pub const fn multiple(value_type: ValueType) -> Self {
        Self {
            value_type,
            multiplicity: Multiplicity::Multiple,
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.multiplicity {
            Multiplicity::Single => write!(f, "{}", self.value_type),
            Multiplicity::Multiple => write!(f, "{}[]", self.value_type),
        }
    }
}

/// A resource value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ResourceValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Time(DateTime<Utc>),
    Opaque(Vec<u8>),
    /// Resource instances keyed by instance index.
    Multiple(BTreeMap<u16, ResourceValue>),
}

impl ResourceValue {
    /// Build a multi-instance value from (index, value) pairs.
    pub fn multiple<I, V>(instances: I) -> Self
    where
        I: IntoIterator<Item = (u16, V)>,
        V: Into<ResourceValue>,
    {
        ResourceValue::Multiple(
            instances
                .into_iter()
                .map(|(index, value)| (index, value.into()))
                .collect(),
        )
    }

    /// The scalar type of this value, or `None` for multi-instance values.
    pub fn scalar_type(&self) -> Option<ValueType> {
        match self {
            ResourceValue::String(_) => Some(ValueType::String),
            ResourceValue::Integer(_) => Some(ValueType::Integer),
            ResourceValue::Float(_) => Some(ValueType::Float),
            ResourceValue::Boolean(_) => Some(ValueType::Boolean),
            ResourceValue::Time(_) => Some(ValueType::Time),
            ResourceValue::Opaque(_) => Some(ValueType::Opaque),
            ResourceValue::Multiple(_) => None,
        }
    }

    /// The shape of this value.
    ///
    /// A multi-instance value reports the type of its first instance; an
    /// empty or nested map reports `none`.
    pub fn shape(&self) -> ValueShape {
        match self {
            ResourceValue::Multiple(instances) => ValueShape::multiple(
                instances
                    .values()
                    .next()
                    .and_then(ResourceValue::scalar_type)
                    .unwrap_or(ValueType::None),
            ),
            scalar => ValueShape::single(scalar.scalar_type().unwrap_or(ValueType::None)),
        }
    }

    /// Check this value against a declared shape.
    ///
    /// On mismatch, returns the shape that was actually found.
    pub fn conforms_to(&self, expected: ValueShape) -> Result<(), ValueShape> {
        match (expected.multiplicity, self) {
            (Multiplicity::Single, ResourceValue::Multiple(_)) => Err(self.shape()),
            (Multiplicity::Single, scalar) => match scalar.scalar_type() {
                Some(found) if found == expected.value_type => Ok(()),
                _ => Err(self.shape()),
            },
            (Multiplicity::Multiple, ResourceValue::Multiple(instances)) => {
                // Every instance must be a scalar of the declared type
                for instance in instances.values() {
                    match instance.scalar_type() {
                        Some(found) if found == expected.value_type => {}
                        Some(found) => return Err(ValueShape::multiple(found)),
                        None => return Err(ValueShape::multiple(ValueType::None)),
                    }
                }
                if expected.value_type == ValueType::None {
                    return Err(self.shape());
                }
                Ok(())
            }
            (Multiplicity::Multiple, scalar) => Err(scalar.shape()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResourceValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            ResourceValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ResourceValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResourceValue::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            ResourceValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_opaque(&self) -> Option<&[u8]> {
        match self {
            ResourceValue::Opaque(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_multiple(&self) -> Option<&BTreeMap<u16, ResourceValue>> {
        match self {
            ResourceValue::Multiple(instances) => Some(instances),
            _ => None,
        }
    }

    /// Integer instances of a multi-instance value.
    ///
    /// Returns `None` unless every instance is an integer.
    pub fn as_integer_map(&self) -> Option<BTreeMap<u16, i64>> {
        self.as_multiple()?
            .iter()
            .map(|(index, value)| value.as_integer().map(|v| (*index, v)))
            .collect()
    }
}

impl fmt::Display for ResourceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceValue::String(s) => write!(f, "{s:?}"),
            ResourceValue::Integer(v) => write!(f, "{v}"),
            ResourceValue::Float(v) => write!(f, "{v}"),
            ResourceValue::Boolean(v) => write!(f, "{v}"),
            ResourceValue::Time(t) => write!(f, "{}", t.to_rfc3339()),
            ResourceValue::Opaque(bytes) => write!(f, "<{} bytes>", bytes.len()),
            ResourceValue::Multiple(instances) => {
                f.write_str("{")?;
                for (i, (index, value)) in instances.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{index}: {value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for ResourceValue {
    fn from(s: &str) -> Self {
        ResourceValue::String(s.to_string())
    }
}

impl From<String> for ResourceValue {
    fn from(s: String) -> Self {
        ResourceValue::String(s)
    }
}

impl From<i64> for ResourceValue {
    fn from(v: i64) -> Self {
        ResourceValue::Integer(v)
    }
}

impl From<f64> for ResourceValue {
    fn from(v: f64) -> Self {
        ResourceValue::Float(v)
    }
}

impl From<bool> for ResourceValue {
    fn from(v: bool) -> Self {
        ResourceValue::Boolean(v)
    }
}

impl From<DateTime<Utc>> for ResourceValue {
    fn from(t: DateTime<Utc>) -> Self {
        ResourceValue::Time(t)
    }
}

impl From<Vec<u8>> for ResourceValue {
    fn from(bytes: Vec<u8>) -> Self {
        ResourceValue::Opaque(bytes)
    }
}

impl From<BTreeMap<u16, i64>> for ResourceValue {
    fn from(instances: BTreeMap<u16, i64>) -> Self {
        ResourceValue::multiple(instances)
    }
}
