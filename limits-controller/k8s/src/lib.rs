//! Reads the Kubernetes resources that resource limit policy applies to.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod workload;

pub use self::workload::{Error, Kind};
