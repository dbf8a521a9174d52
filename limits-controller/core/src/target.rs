use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Identifies an admission target, and keys per-name policy overrides.
///
/// The name may be empty, in which case only namespace-wide policy can apply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameNamespace {
    pub name: String,
    pub namespace: String,
}

// Controller-generated pod names carry either a replica-set hash and a random
// token (`web-7d9f8c6b5-x2z4k`) or a single token/ordinal (`web-x2z4k`,
// `web-0`).
static POD_TEMPLATE_HASH_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)-[0-9A-Za-z]+-[0-9A-Za-z]+").expect("regex must compile"));
static POD_TOKEN_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*)-[0-9A-Za-z]+").expect("regex must compile"));

// === impl NameNamespace ===

impl NameNamespace {
    pub fn new(name: impl ToString, namespace: impl ToString) -> Self {
        Self {
            name: name.to_string(),
            namespace: namespace.to_string(),
        }
    }

    /// Builds the target for a pod, reducing a controller-generated name to
    /// the name of the workload that templated it so that a single override
    /// applies to every replica.
    pub fn for_pod(name: &str, namespace: impl ToString) -> Self {
        Self::new(template_stem(name), namespace)
    }
}

/// Strips a generated pod-name suffix, if one is present.
pub fn template_stem(name: &str) -> &str {
    POD_TEMPLATE_HASH_SUFFIX
        .captures(name)
        .or_else(|| POD_TOKEN_SUFFIX.captures(name))
        .and_then(|caps| caps.get(1))
        .map(|stem| stem.as_str())
        .unwrap_or(name)
}

impl fmt::Display for NameNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
