use kube::core::Resource;
use std::fmt;

/// Names a kind of API resource by its group and plural resource name, e.g.
/// `endpointslices.discovery.k8s.io`. The core group is the empty string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupResource {
    pub group: String,
    pub resource: String,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid group resource {0:?}")]
pub struct InvalidGroupResource(String);

// === impl GroupResource ===

impl GroupResource {
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }

    /// Returns the group resource of a statically-typed Kubernetes resource.
    pub fn of<K>() -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(K::group(&()), K::plural(&()))
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            return f.write_str(&self.resource);
        }
        write!(f, "{}.{}", self.resource, self.group)
    }
}

impl std::str::FromStr for GroupResource {
    type Err = InvalidGroupResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, group) = s.split_once('.').unwrap_or((s, ""));
        if resource.is_empty() || s.ends_with('.') || s.contains(char::is_whitespace) {
            return Err(InvalidGroupResource(s.to_string()));
        }
        Ok(Self::new(group, resource))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EndpointSlice, Node};

    #[test]
    fn typed_resources() {
        assert_eq!(
            GroupResource::of::<EndpointSlice>(),
            GroupResource::new("discovery.k8s.io", "endpointslices")
        );
        assert_eq!(GroupResource::of::<Node>(), GroupResource::new("", "nodes"));
    }

    #[test]
    fn display_and_parse() {
        let gr = GroupResource::of::<EndpointSlice>();
        assert_eq!(gr.to_string(), "endpointslices.discovery.k8s.io");
        assert_eq!(gr.to_string().parse::<GroupResource>().unwrap(), gr);

        let core = "services".parse::<GroupResource>().unwrap();
        assert_eq!(core, GroupResource::new("", "services"));
        assert_eq!(core.to_string(), "services");
    }

    #[test]
    fn rejects_malformed() {
        for s in ["", ".apps", "deployments.", "end points"] {
            assert!(s.parse::<GroupResource>().is_err(), "{s:?} must not parse");
        }
    }
}
