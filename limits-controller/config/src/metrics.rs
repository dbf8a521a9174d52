use prometheus_client::{metrics::counter::Counter, registry::Registry};

#[derive(Clone, Debug, Default)]
pub struct ReloadMetrics {
    reloads: Counter,
    errors: Counter,
}

// === impl ReloadMetrics ===

impl ReloadMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reloads = Counter::default();
        reg.register(
            "reload",
            "Total number of policy reload attempts",
            reloads.clone(),
        );

        let errors = Counter::default();
        reg.register(
            "reload_errors",
            "Total number of policy reloads that failed",
            errors.clone(),
        );

        Self { reloads, errors }
    }

    pub(crate) fn attempted(&self) {
        self.reloads.inc();
    }

    pub(crate) fn failed(&self) {
        self.errors.inc();
    }

    pub fn reloads(&self) -> u64 {
        self.reloads.get()
    }

    pub fn errors(&self) -> u64 {
        self.errors.get()
    }
}
