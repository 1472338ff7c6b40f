use crate::{ConfigError, Filter, RequestDescriptor, Verb};
use edgehub_k8s_api::GroupResource;
use std::fmt;

/// Determines whether a filter applies to a request.
///
/// Each dimension is matched independently and all must match. A predicate may be written as a
/// string of `;`-separated clauses, any of which may be omitted to match anything:
///
/// ```text
/// resources=endpointslices.discovery.k8s.io;verbs=list,watch;callers=kube-proxy,coredns
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Predicate {
    pub resources: Match<GroupResource>,
    pub verbs: Match<Verb>,
    pub callers: Match<String>,
}

/// Matches either any value or one of an explicit set of values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Match<T> {
    Any,
    OneOf(Vec<T>),
}

// === impl Predicate ===

impl Predicate {
    /// A predicate that matches every request.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_resources(mut self, resources: impl IntoIterator<Item = GroupResource>) -> Self {
        self.resources = Match::OneOf(resources.into_iter().collect());
        self
    }

    pub fn with_verbs(mut self, verbs: impl IntoIterator<Item = Verb>) -> Self {
        self.verbs = Match::OneOf(verbs.into_iter().collect());
        self
    }

    pub fn with_callers(mut self, callers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.callers = Match::OneOf(callers.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, req: &RequestDescriptor) -> bool {
        self.verbs.matches_by(|v| *v == req.verb)
            && self
                .resources
                .matches_by(|r| req.resource.as_ref() == Some(r))
            && self
                .callers
                .matches_by(|c| req.caller.as_deref() == Some(c.as_str()))
    }

    /// Checks that the predicate can be used to install the given filter.
    pub(crate) fn validate(&self, filter: &Filter) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidPredicate {
            filter: filter.name().to_string(),
            reason,
        };

        if self.resources.is_empty() {
            return Err(invalid("resources matches nothing".to_string()));
        }
        if self.verbs.is_empty() {
            return Err(invalid("verbs matches nothing".to_string()));
        }
        if self.callers.is_empty() {
            return Err(invalid("callers matches nothing".to_string()));
        }
        if let Match::OneOf(callers) = &self.callers {
            if callers.iter().any(|c| c.trim().is_empty()) {
                return Err(invalid("callers must not be blank".to_string()));
            }
        }

        // Only list and watch responses are decoded into objects.
        if filter.has_object_filter() {
            match &self.verbs {
                Match::Any => {
                    return Err(invalid(
                        "object filters must be restricted to list and watch".to_string(),
                    ))
                }
                Match::OneOf(verbs) => {
                    if let Some(verb) = verbs
                        .iter()
                        .find(|v| !matches!(v, Verb::List | Verb::Watch))
                    {
                        return Err(invalid(format!("object filters cannot apply to {verb}")));
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::str::FromStr for Predicate {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: String| ConfigError::ParsePredicate {
            input: s.to_string(),
            reason,
        };

        let mut resources = None;
        let mut verbs = None;
        let mut callers = None;
        for clause in s.split(';').map(str::trim).filter(|c| !c.is_empty()) {
            let (key, value) = clause
                .split_once('=')
                .ok_or_else(|| error(format!("clause {clause:?} must be of the form key=value")))?;
            let tokens = Match::<String>::parse_tokens(value).map_err(error)?;
            let slot = match key.trim() {
                "resources" => {
                    let m = tokens
                        .try_map(|t| t.parse::<GroupResource>())
                        .map_err(|e| error(e.to_string()))?;
                    resources.replace(m).is_some()
                }
                "verbs" => {
                    let m = tokens
                        .try_map(|t| t.parse::<Verb>())
                        .map_err(|e| error(e.to_string()))?;
                    verbs.replace(m).is_some()
                }
                "callers" => callers.replace(tokens).is_some(),
                key => return Err(error(format!("unknown key {key:?}"))),
            };
            if slot {
                return Err(error(format!("duplicate key {:?}", key.trim())));
            }
        }

        Ok(Self {
            resources: resources.unwrap_or_default(),
            verbs: verbs.unwrap_or_default(),
            callers: callers.unwrap_or_default(),
        })
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "resources={};verbs={};callers={}",
            self.resources, self.verbs, self.callers
        )
    }
}

// === impl Match ===

impl<T> Default for Match<T> {
    fn default() -> Self {
        Self::Any
    }
}

impl<T> Match<T> {
    pub fn matches_by(&self, f: impl Fn(&T) -> bool) -> bool {
        match self {
            Self::Any => true,
            Self::OneOf(values) => values.iter().any(f),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::OneOf(values) if values.is_empty())
    }

    fn try_map<U, E>(self, f: impl Fn(&str) -> Result<U, E>) -> Result<Match<U>, E>
    where
        T: AsRef<str>,
    {
        match self {
            Self::Any => Ok(Match::Any),
            Self::OneOf(values) => values
                .iter()
                .map(|v| f(v.as_ref()))
                .collect::<Result<Vec<_>, E>>()
                .map(Match::OneOf),
        }
    }
}

impl Match<String> {
    fn parse_tokens(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if value == "*" {
            return Ok(Self::Any);
        }

        value
            .split(',')
            .map(|t| match t.trim() {
                "" => Err(format!("empty value in {value:?}")),
                t => Ok(t.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::OneOf)
    }
}

impl<T: fmt::Display> fmt::Display for Match<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::OneOf(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                Ok(())
            }
        }
    }
}
