use crate::{
    validate::{self, Decision},
    workload::Snapshot,
    Ceiling, NameNamespace, RequestPolicy,
};
use ahash::AHashMap as HashMap;

/// One immutable generation of resource limit policy.
///
/// Override entries have global values filled in when the generation is
/// built, so a lookup never needs to consult more than one entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Generation {
    global: Ceiling,
    by_name: HashMap<NameNamespace, Ceiling>,
    by_namespace: HashMap<String, Ceiling>,
    requests: RequestPolicy,
}

// === impl Generation ===

impl Generation {
    /// Builds a generation, applying global inheritance to every override.
    pub fn new(
        global: Ceiling,
        by_namespace: impl IntoIterator<Item = (String, Ceiling)>,
        by_name: impl IntoIterator<Item = (NameNamespace, Ceiling)>,
        requests: RequestPolicy,
    ) -> Self {
        let global = Ceiling {
            unlimited: false,
            ..global
        };
        let by_namespace = by_namespace
            .into_iter()
            .map(|(ns, ovr)| (ns, ovr.inherit(&global)))
            .collect();
        let by_name = by_name
            .into_iter()
            .map(|(nn, ovr)| (nn, ovr.inherit(&global)))
            .collect();
        Self {
            global,
            by_name,
            by_namespace,
            requests,
        }
    }

    /// Returns the ceiling that governs `target`.
    ///
    /// An exact name override wins over a namespace override, which wins
    /// over the global ceiling.
    pub fn resolve(&self, target: &NameNamespace) -> &Ceiling {
        self.by_name
            .get(target)
            .or_else(|| self.by_namespace.get(&target.namespace))
            .unwrap_or(&self.global)
    }

    /// Indicates whether `target` is exempt from all checks.
    pub fn is_excluded(&self, target: &NameNamespace) -> bool {
        self.resolve(target).unlimited
    }

    pub fn request_policy(&self) -> RequestPolicy {
        self.requests
    }

    pub fn global(&self) -> &Ceiling {
        &self.global
    }

    pub fn namespace_overrides(&self) -> usize {
        self.by_namespace.len()
    }

    pub fn name_overrides(&self) -> usize {
        self.by_name.len()
    }

    pub fn validate(&self, target: &NameNamespace, workload: &Snapshot) -> Decision {
        let ceiling = self.resolve(target);
        if ceiling.unlimited {
            return Decision::Allow;
        }

        match workload {
            Snapshot::Containers(containers) => {
                validate::check_containers(containers, ceiling, self.requests).into()
            }
            Snapshot::VolumeClaim { name, size } => {
                validate::check_volume_claim(name, size.as_ref(), ceiling).into()
            }
        }
    }
}
