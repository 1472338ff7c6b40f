use crate::ConfigError;
use edgehub_k8s_api::GroupResource;
use std::fmt;

/// An immutable description of an inbound API request.
///
/// Descriptors are derived once per request by the HTTP front end and are shared by reference
/// thereafter.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub verb: Verb,

    /// The targeted resource kind. `None` for non-resource requests like `/version`.
    pub resource: Option<GroupResource>,

    pub subresource: Option<String>,
    pub namespace: Option<String>,
    pub name: Option<String>,

    /// The calling component, e.g. `kube-proxy`.
    pub caller: Option<String>,

    /// The media types the caller accepts.
    pub accept: Option<String>,
}

/// The Kubernetes API verb of a request.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Verb {
    #[default]
    Get,
    List,
    Watch,
    Create,
    Update,
    Patch,
    Delete,
    DeleteCollection,
}

// === impl RequestDescriptor ===

impl RequestDescriptor {
    /// Describes a request for a resource collection or object.
    pub fn resource(verb: Verb, resource: GroupResource) -> Self {
        Self {
            verb,
            resource: Some(resource),
            ..Default::default()
        }
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = Some(ns.into());
        self
    }

    /// Indicates whether the response to this request is a stream of watch events.
    pub fn is_watch(&self) -> bool {
        self.verb == Verb::Watch
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb)?;
        if let Some(resource) = &self.resource {
            write!(f, " {resource}")?;
        }
        if let Some(ns) = &self.namespace {
            write!(f, " -n {ns}")?;
        }
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

// === impl Verb ===

impl Verb {
    pub const ALL: [Verb; 8] = [
        Verb::Get,
        Verb::List,
        Verb::Watch,
        Verb::Create,
        Verb::Update,
        Verb::Patch,
        Verb::Delete,
        Verb::DeleteCollection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::List => "list",
            Self::Watch => "watch",
            Self::Create => "create",
            Self::Update => "update",
            Self::Patch => "patch",
            Self::Delete => "delete",
            Self::DeleteCollection => "deletecollection",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Verb {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ConfigError::UnknownVerb(s.to_string()))
    }
}
