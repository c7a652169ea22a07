//! LWM2M resource paths.
//!
//! Paths are slash-separated ids like "/3/0/13" (object 3, instance 0,
//! resource 13). Shorter paths address a whole object ("/3") or a whole
//! object instance ("/3/0"). A shorter path contains every longer path that
//! extends it, which is how observations on an instance match changes of
//! its resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::resource::{InstanceId, ObjectId, ResourceId};

/// A parsed LWM2M path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourcePath {
    object_id: ObjectId,
    instance_id: Option<InstanceId>,
    resource_id: Option<ResourceId>,
}

impl ResourcePath {
    /// Path to a whole object ("/3").
    pub fn object(object_id: ObjectId) -> Self {
        Self {
            object_id,
            instance_id: None,
            resource_id: None,
        }
    }

    /// Path to an object instance ("/3/0").
    pub fn instance(object_id: ObjectId, instance_id: InstanceId) -> Self {
        Self {
            object_id,
            instance_id: Some(instance_id),
            resource_id: None,
        }
    }

    /// Path to a single resource ("/3/0/13").
    pub fn resource(object_id: ObjectId, instance_id: InstanceId, resource_id: ResourceId) -> Self {
        Self {
            object_id,
            instance_id: Some(instance_id),
            resource_id: Some(resource_id),
        }
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn instance_id(&self) -> Option<InstanceId> {
        self.instance_id
    }

    pub fn resource_id(&self) -> Option<ResourceId> {
        self.resource_id
    }

    pub fn is_resource(&self) -> bool {
        self.resource_id.is_some()
    }

    /// Check if `other` is this path or lies below it.
    pub fn contains(&self, other: &ResourcePath) -> bool {
        if self.object_id != other.object_id {
            return false;
        }
        let instance_matches = match self.instance_id {
            None => return true,
            Some(id) => other.instance_id == Some(id),
        };
        instance_matches
            && match self.resource_id {
                None => true,
                Some(id) => other.resource_id == Some(id),
            }
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.object_id)?;
        if let Some(instance) = self.instance_id {
            write!(f, "/{instance}")?;
        }
        if let Some(resource) = self.resource_id {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl FromStr for ResourcePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix('/').unwrap_or(s);
        if trimmed.is_empty() {
            return Err(PathError::EmptyPath);
        }

        let mut ids = Vec::with_capacity(3);
        for segment in trimmed.split('/') {
            let id = segment
                .parse::<u16>()
                .map_err(|_| PathError::InvalidSegment(segment.to_string()))?;
            ids.push(id);
        }

        match ids.as_slice() {
            [object] => Ok(Self::object(*object)),
            [object, instance] => Ok(Self::instance(*object, *instance)),
            [object, instance, resource] => Ok(Self::resource(*object, *instance, *resource)),
            _ => Err(PathError::TooManySegments(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResourcePath {
    type Error = PathError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourcePath> for String {
    fn from(path: ResourcePath) -> Self {
        path.to_string()
    }
}

/// Errors that can occur when parsing a path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("Empty path")]
    EmptyPath,
    #[error("Invalid path segment '{0}'")]
    InvalidSegment(String),
    #[error("Too many segments in '{0}'")]
    TooManySegments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_parsing() {
        let path: ResourcePath = "/3/0/13".parse().unwrap();
        assert_eq!(path.object_id(), 3);
        assert_eq!(path.instance_id(), Some(0));
        assert_eq!(path.resource_id(), Some(13));
        assert!(path.is_resource());

        // Leading slash is optional
        let path: ResourcePath = "5/0".parse().unwrap();
        assert_eq!(path, ResourcePath::instance(5, 0));
        assert!(!path.is_resource());
    }

    #[test]
    fn test_path_display() {
        assert_eq!(ResourcePath::object(3).to_string(), "/3");
        assert_eq!(ResourcePath::instance(3, 0).to_string(), "/3/0");
        assert_eq!(ResourcePath::resource(3, 0, 13).to_string(), "/3/0/13");
    }

    #[test]
    fn test_invalid_paths() {
        assert_eq!("".parse::<ResourcePath>(), Err(PathError::EmptyPath));
        assert_eq!("/".parse::<ResourcePath>(), Err(PathError::EmptyPath));
        assert_eq!(
            "/3/x".parse::<ResourcePath>(),
            Err(PathError::InvalidSegment("x".to_string()))
        );
        assert_eq!(
            "/3//13".parse::<ResourcePath>(),
            Err(PathError::InvalidSegment(String::new()))
        );
        assert!(matches!(
            "/3/0/13/1".parse::<ResourcePath>(),
            Err(PathError::TooManySegments(_))
        ));
        assert!(matches!(
            "/70000".parse::<ResourcePath>(),
            Err(PathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_contains() {
        let object = ResourcePath::object(3);
        let instance = ResourcePath::instance(3, 0);
        let resource = ResourcePath::resource(3, 0, 13);

        assert!(object.contains(&instance));
        assert!(object.contains(&resource));
        assert!(instance.contains(&resource));
        assert!(resource.contains(&resource));

        assert!(!resource.contains(&instance));
        assert!(!instance.contains(&ResourcePath::resource(3, 1, 13)));
        assert!(!object.contains(&ResourcePath::resource(5, 0, 3)));
        assert!(!resource.contains(&ResourcePath::resource(3, 0, 14)));
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&ResourcePath::resource(3, 0, 14)).unwrap();
        assert_eq!(json, "\"/3/0/14\"");

        let path: ResourcePath = serde_json::from_str("\"/5/0/3\"").unwrap();
        assert_eq!(path, ResourcePath::resource(5, 0, 3));

        assert!(serde_json::from_str::<ResourcePath>("\"/a\"").is_err());
    }
}
