//! Per-instance resource store.
//!
//! The store maps resources of one object instance to their current values.
//! A resource that is absent has no concrete value set; the dispatcher then
//! falls back to computed or default behavior.
//!
//! Every `set` is type-checked against the resource's access policy entry.
//! A rejected `set` leaves the store untouched.

use std::collections::BTreeMap;

use crate::error::OperationError;
use crate::model::ResourceValue;
use crate::resource::{ObjectResource, ResourceId};

/// Ordered mapping from resource to value for one object instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceStore<R: ObjectResource> {
    values: BTreeMap<R, ResourceValue>,
}

impl<R: ObjectResource> ResourceStore<R> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Get the current value of a resource.
    pub fn get(&self, resource: R) -> Option<&ResourceValue> {
        self.values.get(&resource)
    }

    /// Get the current value of a resource by id.
    pub fn get_by_id(&self, resource_id: ResourceId) -> Result<Option<&ResourceValue>, OperationError> {
        let resource = Self::resolve(resource_id)?;
        Ok(self.get(resource))
    }

    pub fn contains(&self, resource: R) -> bool {
        self.values.contains_key(&resource)
    }

    /// Check a value against the declared type of a resource.
    pub fn check(resource: R, value: &ResourceValue) -> Result<(), OperationError> {
        let expected = resource.spec().shape();
        value
            .conforms_to(expected)
            .map_err(|found| OperationError::TypeMismatch {
                resource: resource.name(),
                expected,
                found,
            })
    }

    /// Set the value of a resource, returning the previous value.
    pub fn set(
        &mut self,
        resource: R,
        value: ResourceValue,
    ) -> Result<Option<ResourceValue>, OperationError> {
        Self::check(resource, &value)?;
        Ok(self.values.insert(resource, value))
    }

    /// Set the value of a resource by id.
    pub fn set_by_id(
        &mut self,
        resource_id: ResourceId,
        value: ResourceValue,
    ) -> Result<Option<ResourceValue>, OperationError> {
        let resource = Self::resolve(resource_id)?;
        self.set(resource, value)
    }

    /// Remove the value of a resource.
    pub fn remove(&mut self, resource: R) -> Option<ResourceValue> {
        self.values.remove(&resource)
    }

    /// Iterate over present values in resource order.
    pub fn iter(&self) -> impl Iterator<Item = (R, &ResourceValue)> {
        self.values.iter().map(|(r, v)| (*r, v))
    }

    /// Number of resources with a value.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Map a resource id onto the enumeration.
    pub fn resolve(resource_id: ResourceId) -> Result<R, OperationError> {
        R::from_id(resource_id).ok_or(OperationError::InvalidResource {
            object_id: R::OBJECT_ID,
            resource_id,
        })
    }
}

impl<R: ObjectResource> Default for ResourceStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ValueShape, ValueType};
    use crate::resource::tests::Lamp;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_store() {
        let store = ResourceStore::<Lamp>::new();
        assert!(store.is_empty());
        assert_eq!(store.get(Lamp::Name), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut store = ResourceStore::new();

        let previous = store.set(Lamp::Dimmer, ResourceValue::Integer(40)).unwrap();
        assert_eq!(previous, None);
        assert_eq!(store.get(Lamp::Dimmer), Some(&ResourceValue::Integer(40)));

        // Second set overwrites and hands back the old value
        let previous = store.set(Lamp::Dimmer, ResourceValue::Integer(80)).unwrap();
        assert_eq!(previous, Some(ResourceValue::Integer(40)));
        assert_eq!(store.get(Lamp::Dimmer), Some(&ResourceValue::Integer(80)));
    }

    #[test]
    fn test_type_mismatch_leaves_store_unchanged() {
        let mut store = ResourceStore::new();
        store.set(Lamp::Dimmer, ResourceValue::Integer(40)).unwrap();

        let err = store
            .set(Lamp::Dimmer, ResourceValue::from("bright"))
            .unwrap_err();
        assert_eq!(
            err,
            OperationError::TypeMismatch {
                resource: "Dimmer",
                expected: ValueShape::single(ValueType::Integer),
                found: ValueShape::single(ValueType::String),
            }
        );
        assert_eq!(store.get(Lamp::Dimmer), Some(&ResourceValue::Integer(40)));
    }

    #[test]
    fn test_action_resources_never_stored() {
        let mut store = ResourceStore::new();
        let err = store.set(Lamp::Toggle, ResourceValue::Boolean(true)).unwrap_err();
        assert!(matches!(err, OperationError::TypeMismatch { .. }));
        assert!(!store.contains(Lamp::Toggle));
    }

    #[test]
    fn test_unknown_resource_id() {
        let mut store = ResourceStore::<Lamp>::new();

        let err = store.set_by_id(3, ResourceValue::Integer(1)).unwrap_err();
        assert_eq!(
            err,
            OperationError::InvalidResource {
                object_id: 3311,
                resource_id: 3,
            }
        );
        assert!(store.is_empty());

        assert!(store.get_by_id(42).is_err());
        assert_eq!(store.get_by_id(1).unwrap(), None);
    }

    #[test]
    fn test_multiple_values() {
        let mut store = ResourceStore::new();
        let colors = ResourceValue::multiple([(0, "red"), (1, "green")]);
        store.set(Lamp::Colors, colors.clone()).unwrap();
        assert_eq!(store.get(Lamp::Colors), Some(&colors));

        // A scalar is not a valid value for a multi-instance resource
        assert!(store.set(Lamp::Colors, ResourceValue::from("blue")).is_err());
        assert_eq!(store.get(Lamp::Colors), Some(&colors));
    }

    #[test]
    fn test_iteration_in_resource_order() {
        let mut store = ResourceStore::new();
        store.set(Lamp::On, ResourceValue::Boolean(true)).unwrap();
        store.set(Lamp::Name, ResourceValue::from("hall")).unwrap();

        let order: Vec<Lamp> = store.iter().map(|(r, _)| r).collect();
        assert_eq!(order, vec![Lamp::Name, Lamp::On]);

        assert_eq!(store.remove(Lamp::On), Some(ResourceValue::Boolean(true)));
        assert_eq!(store.len(), 1);
    }
}
