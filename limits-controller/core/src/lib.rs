//! Resource limit policy.
//!
//! Policy is organized in layers: a global ceiling, namespace-wide overrides,
//! and overrides for a single named workload in a namespace. Any override may
//! mark its targets as unlimited, exempting them from every check.
//!
//! ```text
//! [ NameNamespace ] -> [ name override ] -> [ namespace override ] -> [ global ]
//! ```
//!
//! A [`Generation`] holds one fully resolved copy of this policy. Generations
//! are never modified once built; a new policy document produces a new
//! generation that replaces the old one wholesale.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod ceiling;
mod policy;
pub mod quantity;
mod target;
pub mod validate;
pub mod workload;

pub use self::{
    ceiling::{Ceiling, InvalidRequestPolicy, RequestPolicy},
    policy::Generation,
    quantity::Quantity,
    target::{template_stem, NameNamespace},
    validate::{Decision, Violation},
};
