use crate::Error;
use limits_controller_core::{
    quantity::ParseError, Ceiling, Generation, NameNamespace, Quantity, RequestPolicy,
};
use serde::{de, Deserialize, Deserializer};
use std::{collections::BTreeMap, fmt};

/// The policy document, as written by operators.
///
/// ```yaml
/// maxCPULimit: "2"
/// maxMemLimit: 2Gi
/// maxPVCSize: 50Gi
/// customNamespaces:
///   kube-system:
///     unlimited: true
/// customNames:
///   - name: prometheus
///     namespace: monitoring
///     maxMemLimit: 16Gi
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct Document {
    #[serde(flatten)]
    limits: Limits,

    #[serde(default)]
    request_policy: Option<Text>,

    #[serde(default)]
    custom_namespaces: BTreeMap<String, Override>,

    #[serde(default)]
    custom_names: Vec<NameOverride>,
}

/// The five ceiling fields, as accepted globally and in every override.
#[derive(Debug, Default, Deserialize)]
struct Limits {
    #[serde(rename = "maxCPULimit", default)]
    cpu_limit: Option<Text>,

    #[serde(rename = "maxMemLimit", default)]
    mem_limit: Option<Text>,

    #[serde(rename = "maxCPURequest", default)]
    cpu_request: Option<Text>,

    #[serde(rename = "maxMemRequest", default)]
    mem_request: Option<Text>,

    #[serde(rename = "maxPVCSize", default)]
    storage: Option<Text>,
}

#[derive(Debug, Default, Deserialize)]
struct Override {
    #[serde(flatten)]
    limits: Limits,

    #[serde(default)]
    unlimited: bool,
}

#[derive(Debug, Deserialize)]
struct NameOverride {
    #[serde(default)]
    name: String,

    namespace: String,

    #[serde(flatten)]
    ovr: Override,
}

/// A scalar holding a quantity. YAML numbers are accepted so that
/// `maxCPULimit: 2` reads the same as `maxCPULimit: "2"`.
#[derive(Clone, Debug, PartialEq)]
struct Text(String);

/// Identifies where in the document a value was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Global,
    Namespace(String),
    Name(NameNamespace),
}

/// Parses a policy document into a fully resolved generation.
pub fn parse(text: &str) -> Result<Generation, Error> {
    let doc: Document = if text.trim().is_empty() {
        Document::default()
    } else {
        serde_yaml::from_str(text)?
    };

    let global = doc.limits.to_ceiling(&Scope::Global)?;

    let requests = match doc.request_policy {
        Some(Text(policy)) => policy.parse::<RequestPolicy>()?,
        None => RequestPolicy::default(),
    };

    let mut by_namespace = Vec::with_capacity(doc.custom_namespaces.len());
    for (ns, ovr) in doc.custom_namespaces {
        let ceiling = ovr.to_ceiling(&Scope::Namespace(ns.clone()))?;
        by_namespace.push((ns, ceiling));
    }

    let mut by_name = BTreeMap::new();
    for NameOverride {
        name,
        namespace,
        ovr,
    } in doc.custom_names
    {
        let nn = NameNamespace::new(name, namespace);
        let ceiling = ovr.to_ceiling(&Scope::Name(nn.clone()))?;
        if by_name.insert(nn.clone(), ceiling).is_some() {
            return Err(Error::DuplicateName(nn));
        }
    }

    tracing::debug!(
        ?global,
        %requests,
        namespaces = by_namespace.len(),
        names = by_name.len(),
        "Parsed policy document"
    );
    Ok(Generation::new(global, by_namespace, by_name, requests))
}

// === impl Limits ===

impl Limits {
    fn to_ceiling(&self, scope: &Scope) -> Result<Ceiling, Error> {
        Ok(Ceiling {
            cpu_limit: quantity(scope, "maxCPULimit", &self.cpu_limit)?,
            mem_limit: quantity(scope, "maxMemLimit", &self.mem_limit)?,
            cpu_request: quantity(scope, "maxCPURequest", &self.cpu_request)?,
            mem_request: quantity(scope, "maxMemRequest", &self.mem_request)?,
            storage: quantity(scope, "maxPVCSize", &self.storage)?,
            unlimited: false,
        })
    }
}

// === impl Override ===

impl Override {
    fn to_ceiling(&self, scope: &Scope) -> Result<Ceiling, Error> {
        // Values on an unlimited override are still validated, so that a typo
        // fails the load instead of lying dormant until `unlimited` is removed.
        let ceiling = self.limits.to_ceiling(scope)?;
        if self.unlimited {
            return Ok(Ceiling::unlimited());
        }
        Ok(ceiling)
    }
}

fn quantity(
    scope: &Scope,
    field: &'static str,
    text: &Option<Text>,
) -> Result<Option<Quantity>, Error> {
    let Some(Text(text)) = text else {
        return Ok(None);
    };
    // An empty string leaves the field unset, as if it were omitted.
    if text.trim().is_empty() {
        return Ok(None);
    }

    text.parse()
        .map(Some)
        .map_err(|source: ParseError| Error::Quantity {
            scope: scope.clone(),
            field,
            value: text.clone(),
            source,
        })
}

// === impl Scope ===

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Namespace(ns) => write!(f, "namespace {ns}"),
            Self::Name(nn) => write!(f, "name {nn}"),
        }
    }
}

// === impl Text ===

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = Text;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a quantity such as \"500m\", \"2\", or \"1Gi\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
                Ok(Text(value.to_string()))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
                Ok(Text(value.to_string()))
            }
        }
        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Option<Quantity> {
        Some(s.parse().unwrap())
    }

    const DOCUMENT: &str = r#"
maxCPULimit: 2
maxMemLimit: 2Gi
maxCPURequest: 500m
maxMemRequest: 1Gi
maxPVCSize: 50Gi
customNamespaces:
  kube-system:
    unlimited: true
  monitoring:
    maxCPULimit: "4"
    maxMemLimit: 3Gi
    maxMemRequest: 3Gi
    maxCPURequest: "1"
customNames:
  - name: prometheus
    namespace: monitoring
    maxMemLimit: 16Gi
  - namespace: batch
    maxPVCSize: 1Ti
"#;

    #[test]
    fn parses_global_ceilings() {
        let generation = parse(DOCUMENT).unwrap();
        assert_eq!(
            generation.global(),
            &Ceiling {
                cpu_limit: q("2"),
                mem_limit: q("2Gi"),
                cpu_request: q("500m"),
                mem_request: q("1Gi"),
                storage: q("50Gi"),
                unlimited: false,
            }
        );
        assert_eq!(generation.request_policy(), RequestPolicy::Zero);
        assert_eq!(generation.namespace_overrides(), 2);
        assert_eq!(generation.name_overrides(), 2);
    }

    #[test]
    fn namespace_overrides_inherit_global() {
        let generation = parse(DOCUMENT).unwrap();

        let monitoring = generation.resolve(&NameNamespace::new("", "monitoring"));
        assert_eq!(monitoring.cpu_limit, q("4"));
        assert_eq!(monitoring.mem_limit, q("3Gi"));
        assert_eq!(monitoring.cpu_request, q("1"));
        assert_eq!(monitoring.storage, q("50Gi"));

        assert!(generation.is_excluded(&NameNamespace::new("coredns", "kube-system")));
    }

    #[test]
    fn name_overrides() {
        let generation = parse(DOCUMENT).unwrap();

        let prometheus = generation.resolve(&NameNamespace::new("prometheus", "monitoring"));
        assert_eq!(prometheus.mem_limit, q("16Gi"));
        assert_eq!(prometheus.cpu_limit, q("2"));

        // An override with an empty name only matches targets without a name.
        let batch = generation.resolve(&NameNamespace::new("", "batch"));
        assert_eq!(batch.storage, q("1Ti"));
        let job = generation.resolve(&NameNamespace::new("job", "batch"));
        assert_eq!(job.storage, q("50Gi"));
    }

    #[test]
    fn empty_document_has_no_ceilings() {
        let generation = parse("").unwrap();
        assert_eq!(generation.global(), &Ceiling::default());
        assert_eq!(generation, Generation::default());
    }

    #[test]
    fn bounded_request_policy() {
        let generation = parse("requestPolicy: bounded\nmaxCPURequest: 1").unwrap();
        assert_eq!(generation.request_policy(), RequestPolicy::Bounded);

        assert!(matches!(
            parse("requestPolicy: forced"),
            Err(Error::RequestPolicy(_))
        ));
    }

    #[test]
    fn malformed_quantities_name_field_and_key() {
        let err = parse("maxCPULimit: lots").unwrap_err();
        assert_eq!(
            err.to_string(),
            "global: invalid maxCPULimit \"lots\": invalid number"
        );

        let err = parse("customNamespaces:\n  monitoring:\n    maxMemLimit: 3Gb").unwrap_err();
        assert!(matches!(
            err,
            Error::Quantity {
                scope: Scope::Namespace(ref ns),
                field: "maxMemLimit",
                ..
            } if ns == "monitoring"
        ));

        let err =
            parse("customNames:\n  - name: a\n    namespace: b\n    maxPVCSize: x\n    unlimited: true")
                .unwrap_err();
        assert_eq!(
            err.to_string(),
            "name b/a: invalid maxPVCSize \"x\": invalid number"
        );

        let err = parse("maxCPULimit: \"1e2147483647\"").unwrap_err();
        assert_eq!(
            err.to_string(),
            "global: invalid maxCPULimit \"1e2147483647\": quantity is out of range"
        );
        assert!(matches!(
            parse("maxMemLimit: 1e2147483647"),
            Err(Error::Quantity { field: "maxMemLimit", .. })
        ));
    }

    #[test]
    fn rejects_unknown_fields() {
        assert!(matches!(parse("maxCpuLimit: 2"), Err(Error::Yaml(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let doc = "customNames:\n  - {name: a, namespace: b}\n  - {name: a, namespace: b, unlimited: true}";
        assert_eq!(
            parse(doc).unwrap_err().to_string(),
            "duplicate customNames entry for b/a"
        );
    }

    #[test]
    fn empty_values_are_unset() {
        let generation = parse("maxCPULimit: \"\"\nmaxMemLimit: 1Gi").unwrap();
        assert_eq!(generation.global().cpu_limit, None);
        assert_eq!(generation.global().mem_limit, q("1Gi"));
    }
}
