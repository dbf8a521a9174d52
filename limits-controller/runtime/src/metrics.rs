use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct AdmissionMetrics {
    requests: Family<Labels, Counter>,
    errors: Counter,
}

#[derive(Clone, Hash, PartialEq, Eq, EncodeLabelSet, Debug)]
struct Labels {
    allowed: &'static str,
}

// === impl AdmissionMetrics ===

impl AdmissionMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::<Labels, Counter>::default();
        reg.register(
            "requests",
            "Total number of admission requests decided",
            requests.clone(),
        );

        let errors = Counter::default();
        reg.register(
            "errors",
            "Total number of admission requests that could not be decided",
            errors.clone(),
        );

        Self { requests, errors }
    }

    pub(crate) fn decided(&self, allowed: bool) {
        let allowed = if allowed { "true" } else { "false" };
        self.requests.get_or_create(&Labels { allowed }).inc();
    }

    pub(crate) fn failed(&self) {
        self.errors.inc();
    }

    pub fn requests(&self, allowed: bool) -> u64 {
        let allowed = if allowed { "true" } else { "false" };
        self.requests.get_or_create(&Labels { allowed }).get()
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }
}
