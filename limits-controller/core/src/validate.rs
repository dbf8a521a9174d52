use crate::{
    workload::{Container, Resources},
    Ceiling, Quantity, RequestPolicy,
};
use std::fmt;

/// The outcome of validating a workload against its resolved ceiling.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(Violation),
}

/// Describes why a workload was denied.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Violation {
    #[error("container {container} {field} must be set")]
    MissingRequest { container: String, field: Field },

    #[error("container {container} {field} is {value}, it must be 0")]
    NonZeroRequest {
        container: String,
        field: Field,
        value: Quantity,
    },

    #[error("container {container} {field} {value} exceeds maximum {max}")]
    Exceeds {
        container: String,
        field: Field,
        value: Quantity,
        max: Quantity,
    },

    #[error("persistentVolumeClaim {claim} size {value} exceeds maximum {max}")]
    StorageExceeds {
        claim: String,
        value: Quantity,
        max: Quantity,
    },
}

/// A container resource field.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Field {
    CpuRequest,
    MemoryRequest,
    CpuLimit,
    MemoryLimit,
}

// === impl Decision ===

impl Decision {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<Result<(), Violation>> for Decision {
    fn from(res: Result<(), Violation>) -> Self {
        match res {
            Ok(()) => Self::Allow,
            Err(violation) => Self::Deny(violation),
        }
    }
}

// === impl Field ===

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CpuRequest => "requests.cpu".fmt(f),
            Self::MemoryRequest => "requests.memory".fmt(f),
            Self::CpuLimit => "limits.cpu".fmt(f),
            Self::MemoryLimit => "limits.memory".fmt(f),
        }
    }
}

/// Checks each container in order, stopping at the first violation.
///
/// Callers are expected to have handled unlimited ceilings already.
pub fn check_containers(
    containers: &[Container],
    ceiling: &Ceiling,
    requests: RequestPolicy,
) -> Result<(), Violation> {
    for container in containers {
        let Container {
            name,
            requests: declared,
            limits,
        } = container;

        let cpu = require(name, Field::CpuRequest, declared.cpu.as_ref())?;
        let mem = require(name, Field::MemoryRequest, declared.memory.as_ref())?;

        match requests {
            RequestPolicy::Zero => {
                zero(name, Field::CpuRequest, cpu)?;
                zero(name, Field::MemoryRequest, mem)?;
            }
            RequestPolicy::Bounded => {
                at_most(name, Field::CpuRequest, Some(cpu), ceiling.cpu_request.as_ref())?;
                at_most(name, Field::MemoryRequest, Some(mem), ceiling.mem_request.as_ref())?;
            }
        }

        let Resources { cpu, memory } = limits;
        at_most(name, Field::CpuLimit, cpu.as_ref(), ceiling.cpu_limit.as_ref())?;
        at_most(name, Field::MemoryLimit, memory.as_ref(), ceiling.mem_limit.as_ref())?;
    }

    Ok(())
}

/// Checks a volume claim's requested size. A claim that requests no size, or
/// that has no storage ceiling, passes.
pub fn check_volume_claim(
    claim: &str,
    size: Option<&Quantity>,
    ceiling: &Ceiling,
) -> Result<(), Violation> {
    match (size, ceiling.storage.as_ref()) {
        (Some(value), Some(max)) if value > max => Err(Violation::StorageExceeds {
            claim: claim.to_string(),
            value: *value,
            max: *max,
        }),
        _ => Ok(()),
    }
}

fn require<'c>(
    container: &str,
    field: Field,
    value: Option<&'c Quantity>,
) -> Result<&'c Quantity, Violation> {
    value.ok_or_else(|| Violation::MissingRequest {
        container: container.to_string(),
        field,
    })
}

fn zero(container: &str, field: Field, value: &Quantity) -> Result<(), Violation> {
    if value.is_positive() {
        return Err(Violation::NonZeroRequest {
            container: container.to_string(),
            field,
            value: *value,
        });
    }
    Ok(())
}

fn at_most(
    container: &str,
    field: Field,
    value: Option<&Quantity>,
    max: Option<&Quantity>,
) -> Result<(), Violation> {
    match (value, max) {
        (Some(value), Some(max)) if value > max => Err(Violation::Exceeds {
            container: container.to_string(),
            field,
            value: *value,
            max: *max,
        }),
        _ => Ok(()),
    }
}
