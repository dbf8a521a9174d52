use crate::Quantity;

/// The maximum resources a target may declare.
///
/// A `None` field means no ceiling applies to that dimension. When
/// `unlimited` is set, every check passes regardless of the other fields.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ceiling {
    pub cpu_limit: Option<Quantity>,
    pub mem_limit: Option<Quantity>,
    pub cpu_request: Option<Quantity>,
    pub mem_request: Option<Quantity>,
    pub storage: Option<Quantity>,
    pub unlimited: bool,
}

/// Determines how container resource requests are checked.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RequestPolicy {
    /// Requests must be declared and must be zero, so that limits are the
    /// only effective sizing.
    #[default]
    Zero,

    /// Requests must be declared and must not exceed the request ceilings.
    Bounded,
}

// === impl Ceiling ===

impl Ceiling {
    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            ..Default::default()
        }
    }

    /// Fills every unset field from `global`.
    ///
    /// Unlimited entries are left untouched: nothing applies to them.
    pub fn inherit(self, global: &Ceiling) -> Self {
        if self.unlimited {
            return Self::unlimited();
        }

        Self {
            cpu_limit: self.cpu_limit.or(global.cpu_limit),
            mem_limit: self.mem_limit.or(global.mem_limit),
            cpu_request: self.cpu_request.or(global.cpu_request),
            mem_request: self.mem_request.or(global.mem_request),
            storage: self.storage.or(global.storage),
            unlimited: false,
        }
    }
}

// === impl RequestPolicy ===

impl std::str::FromStr for RequestPolicy {
    type Err = InvalidRequestPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zero" => Ok(Self::Zero),
            "bounded" => Ok(Self::Bounded),
            s => Err(InvalidRequestPolicy(s.to_string())),
        }
    }
}

impl std::fmt::Display for RequestPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Zero => "zero".fmt(f),
            Self::Bounded => "bounded".fmt(f),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid request policy {0:?}: expected 'zero' or 'bounded'")]
pub struct InvalidRequestPolicy(String);
