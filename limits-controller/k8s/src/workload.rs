use k8s_openapi::{
    api::{
        apps::v1::{
            DaemonSet, DaemonSetSpec, Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec,
        },
        batch::v1::{CronJob, CronJobSpec, Job, JobSpec},
        core::v1::{
            self as corev1, PersistentVolumeClaim, PersistentVolumeClaimSpec, Pod, PodSpec,
            PodTemplateSpec,
        },
    },
    apimachinery::pkg::api::resource::Quantity as K8sQuantity,
};
use kube::{core::DynamicObject, Resource};
use limits_controller_core::{
    quantity::ParseError,
    workload::{Container, Resources, Snapshot},
    NameNamespace, Quantity,
};
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, fmt};

/// The kinds of resource that policy applies to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Pod,
    Deployment,
    StatefulSet,
    DaemonSet,
    Job,
    CronJob,
    PersistentVolumeClaim,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0} admission request is missing 'object'")]
    MissingObject(Kind),

    #[error("{0} is missing 'spec'")]
    MissingSpec(Kind),

    #[error("invalid {kind} spec: {source}")]
    InvalidSpec {
        kind: Kind,
        #[source]
        source: serde_json::Error,
    },

    #[error("container {container} has invalid {field} {value:?}: {source}")]
    InvalidQuantity {
        container: String,
        field: &'static str,
        value: String,
        #[source]
        source: ParseError,
    },

    #[error("persistentVolumeClaim {claim} has invalid storage request {value:?}: {source}")]
    InvalidStorage {
        claim: String,
        value: String,
        #[source]
        source: ParseError,
    },
}

// === impl Kind ===

impl Kind {
    /// Classifies a resource by its API group and kind. Returns `None` for
    /// resources that policy does not cover.
    pub fn from_group_kind(group: &str, kind: &str) -> Option<Self> {
        if is_kind::<Pod>(group, kind) {
            return Some(Self::Pod);
        }
        if is_kind::<Deployment>(group, kind) {
            return Some(Self::Deployment);
        }
        if is_kind::<StatefulSet>(group, kind) {
            return Some(Self::StatefulSet);
        }
        if is_kind::<DaemonSet>(group, kind) {
            return Some(Self::DaemonSet);
        }
        if is_kind::<Job>(group, kind) {
            return Some(Self::Job);
        }
        if is_kind::<CronJob>(group, kind) {
            return Some(Self::CronJob);
        }
        if is_kind::<PersistentVolumeClaim>(group, kind) {
            return Some(Self::PersistentVolumeClaim);
        }
        None
    }

    /// Returns the policy target for an object of this kind.
    ///
    /// Objects created with only a `generateName` are identified by that
    /// prefix. Pod names are reduced to the name of the workload that
    /// templated them.
    pub fn target(&self, obj: &DynamicObject, namespace: &str) -> NameNamespace {
        let name = object_name(obj);
        match self {
            Self::Pod => NameNamespace::for_pod(name, namespace),
            _ => NameNamespace::new(name, namespace),
        }
    }

    /// Extracts the resources that policy inspects from an object of this
    /// kind.
    pub fn snapshot(&self, obj: &DynamicObject) -> Result<Snapshot, Error> {
        match self {
            Self::Pod => containers(Some(&parse_spec::<PodSpec>(*self, obj)?)),
            Self::Deployment => {
                let DeploymentSpec { template, .. } = parse_spec(*self, obj)?;
                containers(template_spec(&template))
            }
            Self::StatefulSet => {
                let StatefulSetSpec { template, .. } = parse_spec(*self, obj)?;
                containers(template_spec(&template))
            }
            Self::DaemonSet => {
                let DaemonSetSpec { template, .. } = parse_spec(*self, obj)?;
                containers(template_spec(&template))
            }
            Self::Job => {
                let JobSpec { template, .. } = parse_spec(*self, obj)?;
                containers(template_spec(&template))
            }
            Self::CronJob => {
                let CronJobSpec { job_template, .. } = parse_spec(*self, obj)?;
                let pod = job_template
                    .spec
                    .as_ref()
                    .and_then(|job| template_spec(&job.template));
                containers(pod)
            }
            Self::PersistentVolumeClaim => {
                let spec = parse_spec::<PersistentVolumeClaimSpec>(*self, obj)?;
                volume_claim(object_name(obj), &spec)
            }
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pod => "Pod".fmt(f),
            Self::Deployment => "Deployment".fmt(f),
            Self::StatefulSet => "StatefulSet".fmt(f),
            Self::DaemonSet => "DaemonSet".fmt(f),
            Self::Job => "Job".fmt(f),
            Self::CronJob => "CronJob".fmt(f),
            Self::PersistentVolumeClaim => "PersistentVolumeClaim".fmt(f),
        }
    }
}

fn is_kind<T>(group: &str, kind: &str) -> bool
where
    T: Resource,
    T::DynamicType: Default,
{
    let dt = Default::default();
    group.eq_ignore_ascii_case(&T::group(&dt)) && kind.eq_ignore_ascii_case(&T::kind(&dt))
}

fn object_name(obj: &DynamicObject) -> &str {
    let meta = &obj.metadata;
    match meta.name.as_deref() {
        Some(name) if !name.is_empty() => name,
        _ => meta
            .generate_name
            .as_deref()
            .unwrap_or_default()
            .trim_end_matches('-'),
    }
}

fn parse_spec<T: DeserializeOwned>(kind: Kind, obj: &DynamicObject) -> Result<T, Error> {
    let data = obj
        .data
        .get("spec")
        .cloned()
        .ok_or(Error::MissingSpec(kind))?;
    serde_json::from_value(data).map_err(|source| Error::InvalidSpec { kind, source })
}

fn template_spec(template: &PodTemplateSpec) -> Option<&PodSpec> {
    template.spec.as_ref()
}

/// Only regular containers are inspected; init and ephemeral containers are
/// not subject to policy.
fn containers(spec: Option<&PodSpec>) -> Result<Snapshot, Error> {
    let containers = spec
        .map(|spec| {
            spec.containers
                .iter()
                .map(container)
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    Ok(Snapshot::Containers(containers))
}

fn container(container: &corev1::Container) -> Result<Container, Error> {
    let resources = container.resources.as_ref();
    let requests = resources.and_then(|r| r.requests.as_ref());
    let limits = resources.and_then(|r| r.limits.as_ref());

    let quantity = |values: Option<&BTreeMap<String, K8sQuantity>>,
                    key: &str,
                    field: &'static str| {
        values
            .and_then(|values| values.get(key))
            .map(|K8sQuantity(value)| {
                value
                    .parse::<Quantity>()
                    .map_err(|source| Error::InvalidQuantity {
                        container: container.name.clone(),
                        field,
                        value: value.clone(),
                        source,
                    })
            })
            .transpose()
    };

    Ok(Container {
        name: container.name.clone(),
        requests: Resources {
            cpu: quantity(requests, "cpu", "requests.cpu")?,
            memory: quantity(requests, "memory", "requests.memory")?,
        },
        limits: Resources {
            cpu: quantity(limits, "cpu", "limits.cpu")?,
            memory: quantity(limits, "memory", "limits.memory")?,
        },
    })
}

fn volume_claim(name: &str, spec: &PersistentVolumeClaimSpec) -> Result<Snapshot, Error> {
    let size = spec
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .and_then(|requests| requests.get("storage"))
        .map(|K8sQuantity(value)| {
            value.parse::<Quantity>().map_err(|source| Error::InvalidStorage {
                claim: name.to_string(),
                value: value.clone(),
                source,
            })
        })
        .transpose()?;

    Ok(Snapshot::VolumeClaim {
        name: name.to_string(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;
    use serde_json::json;

    fn object(value: serde_json::Value) -> DynamicObject {
        serde_json::from_value(value).expect("object must be valid")
    }

    fn q(s: &str) -> Option<Quantity> {
        Some(s.parse().unwrap())
    }

    fn pod_spec() -> serde_json::Value {
        json!({
            "containers": [{
                "name": "app",
                "image": "app:latest",
                "resources": {
                    "requests": { "cpu": "0", "memory": "0" },
                    "limits": { "cpu": "1", "memory": "1Gi" },
                },
            }, {
                "name": "sidecar",
                "image": "sidecar:latest",
            }],
            "initContainers": [{
                "name": "init",
                "image": "init:latest",
                "resources": { "limits": { "cpu": "64" } },
            }],
        })
    }

    fn expected_containers() -> Snapshot {
        Snapshot::Containers(vec![
            Container {
                name: "app".to_string(),
                requests: Resources {
                    cpu: q("0"),
                    memory: q("0"),
                },
                limits: Resources {
                    cpu: q("1"),
                    memory: q("1Gi"),
                },
            },
            Container {
                name: "sidecar".to_string(),
                ..Default::default()
            },
        ])
    }

    #[test]
    fn classifies_kinds() {
        assert_eq!(Kind::from_group_kind("", "Pod"), Some(Kind::Pod));
        assert_eq!(Kind::from_group_kind("apps", "Deployment"), Some(Kind::Deployment));
        assert_eq!(Kind::from_group_kind("apps", "statefulset"), Some(Kind::StatefulSet));
        assert_eq!(Kind::from_group_kind("apps", "DaemonSet"), Some(Kind::DaemonSet));
        assert_eq!(Kind::from_group_kind("batch", "Job"), Some(Kind::Job));
        assert_eq!(Kind::from_group_kind("batch", "CronJob"), Some(Kind::CronJob));
        assert_eq!(
            Kind::from_group_kind("", "PersistentVolumeClaim"),
            Some(Kind::PersistentVolumeClaim)
        );

        assert_eq!(Kind::from_group_kind("", "ConfigMap"), None);
        assert_eq!(Kind::from_group_kind("apps", "ReplicaSet"), None);
        assert_eq!(Kind::from_group_kind("example.com", "Deployment"), None);
    }

    #[test]
    fn pod_containers() {
        let obj = object(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": { "name": "web-7d9f8c6b5-x2z4k", "namespace": "default" },
            "spec": pod_spec(),
        }));

        assert_eq!(Kind::Pod.snapshot(&obj).unwrap(), expected_containers());
        assert_eq!(
            Kind::Pod.target(&obj, "default"),
            NameNamespace::new("web", "default")
        );
    }

    #[test]
    fn templated_containers() {
        let template = json!({ "metadata": {}, "spec": pod_spec() });
        let cases = [
            (Kind::Deployment, json!({ "selector": {}, "template": template })),
            (
                Kind::StatefulSet,
                json!({ "selector": {}, "serviceName": "web", "template": template }),
            ),
            (Kind::DaemonSet, json!({ "selector": {}, "template": template })),
            (Kind::Job, json!({ "template": template })),
            (
                Kind::CronJob,
                json!({
                    "schedule": "* * * * *",
                    "jobTemplate": { "spec": { "template": template } },
                }),
            ),
        ];

        for (kind, spec) in cases {
            let obj = object(json!({
                "metadata": { "name": "web-abc12", "namespace": "default" },
                "spec": spec,
            }));
            assert_eq!(kind.snapshot(&obj).unwrap(), expected_containers(), "{kind}");
            // Only pod names are normalized.
            assert_eq!(
                kind.target(&obj, "default"),
                NameNamespace::new("web-abc12", "default"),
                "{kind}"
            );
        }
    }

    #[test]
    fn generated_names() {
        let obj = object(json!({
            "metadata": { "generateName": "batch-", "namespace": "jobs" },
            "spec": { "template": { "spec": pod_spec() } },
        }));
        assert_eq!(
            Kind::Job.target(&obj, "jobs"),
            NameNamespace::new("batch", "jobs")
        );

        let obj = object(json!({ "metadata": {}, "spec": pod_spec() }));
        assert_eq!(Kind::Pod.target(&obj, "jobs"), NameNamespace::new("", "jobs"));
    }

    #[test]
    fn volume_claims() {
        let obj = object(json!({
            "metadata": { "name": "data", "namespace": "default" },
            "spec": {
                "accessModes": ["ReadWriteOnce"],
                "resources": { "requests": { "storage": "10Gi" } },
            },
        }));
        assert_eq!(
            Kind::PersistentVolumeClaim.snapshot(&obj).unwrap(),
            Snapshot::VolumeClaim {
                name: "data".to_string(),
                size: q("10Gi"),
            }
        );

        let obj = object(json!({
            "metadata": { "name": "data" },
            "spec": { "accessModes": ["ReadWriteOnce"] },
        }));
        assert_eq!(
            Kind::PersistentVolumeClaim.snapshot(&obj).unwrap(),
            Snapshot::VolumeClaim {
                name: "data".to_string(),
                size: None,
            }
        );
    }

    #[test]
    fn missing_template_spec_has_no_containers() {
        let obj = object(json!({
            "metadata": { "name": "web" },
            "spec": { "selector": {}, "template": { "metadata": {} } },
        }));
        assert_eq!(
            Kind::Deployment.snapshot(&obj).unwrap(),
            Snapshot::Containers(vec![])
        );
    }

    #[test]
    fn malformed_objects() {
        let obj = object(json!({ "metadata": { "name": "web" } }));
        assert!(matches!(
            Kind::Pod.snapshot(&obj),
            Err(Error::MissingSpec(Kind::Pod))
        ));

        let obj = object(json!({ "metadata": { "name": "web" }, "spec": { "containers": 7 } }));
        assert!(matches!(
            Kind::Pod.snapshot(&obj),
            Err(Error::InvalidSpec { kind: Kind::Pod, .. })
        ));

        let obj = object(json!({
            "metadata": { "name": "web" },
            "spec": {
                "containers": [{
                    "name": "app",
                    "resources": { "limits": { "cpu": "lots" } },
                }],
            },
        }));
        let err = Kind::Pod.snapshot(&obj).unwrap_err();
        assert_eq!(
            err.to_string(),
            "container app has invalid limits.cpu \"lots\": invalid number"
        );

        let obj = object(json!({
            "metadata": { "name": "data" },
            "spec": { "resources": { "requests": { "storage": "10GB" } } },
        }));
        assert!(matches!(
            Kind::PersistentVolumeClaim.snapshot(&obj),
            Err(Error::InvalidStorage { ref claim, .. }) if claim == "data"
        ));
    }

    #[test]
    fn quantities_are_read_by_resource_name() {
        let requests = btreemap! {
            "cpu".to_string() => K8sQuantity("250m".to_string()),
            "ephemeral-storage".to_string() => K8sQuantity("bogus".to_string()),
        };
        let c = container(&corev1::Container {
            name: "app".to_string(),
            resources: Some(corev1::ResourceRequirements {
                requests: Some(requests),
                ..Default::default()
            }),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(c.requests.cpu, q("250m"));
        assert_eq!(c.requests.memory, None);
    }
}
