use limits_controller_core::{Ceiling, Generation, NameNamespace, RequestPolicy};
use parking_lot::RwLock;
use std::sync::Arc;

/// A handle to the policy generation currently in effect.
///
/// Readers take a reference to a whole generation, so a lookup never
/// observes a mix of two documents.
#[derive(Clone, Debug, Default)]
pub struct SharedPolicy(Arc<RwLock<Arc<Generation>>>);

// === impl SharedPolicy ===

impl SharedPolicy {
    pub fn new(generation: Generation) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(generation))))
    }

    /// Returns the generation in effect.
    pub fn current(&self) -> Arc<Generation> {
        self.0.read().clone()
    }

    /// Replaces the generation in effect.
    pub fn publish(&self, generation: Generation) {
        *self.0.write() = Arc::new(generation);
    }

    pub fn resolve(&self, target: &NameNamespace) -> Ceiling {
        self.current().resolve(target).clone()
    }

    pub fn is_excluded(&self, target: &NameNamespace) -> bool {
        self.current().is_excluded(target)
    }

    pub fn request_policy(&self) -> RequestPolicy {
        self.current().request_policy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_replaces_generation() {
        let policy = SharedPolicy::new(crate::parse("maxCPULimit: 2").unwrap());
        let target = NameNamespace::new("web", "default");

        let before = policy.current();
        assert_eq!(policy.resolve(&target).cpu_limit, Some("2".parse().unwrap()));

        policy.publish(crate::parse("customNamespaces: {default: {unlimited: true}}").unwrap());
        assert!(policy.is_excluded(&target));
        assert_eq!(policy.resolve(&target).cpu_limit, None);
        assert_eq!(policy.request_policy(), RequestPolicy::Zero);

        // Generations held by readers are unaffected.
        assert_eq!(before.resolve(&target).cpu_limit, Some("2".parse().unwrap()));
    }

    #[test]
    fn clones_share_state() {
        let policy = SharedPolicy::default();
        let clone = policy.clone();
        clone.publish(crate::parse("maxPVCSize: 1Gi").unwrap());
        assert_eq!(
            policy.current().global().storage,
            Some("1Gi".parse().unwrap())
        );
    }
}
