//! Loads resource limit policy from a YAML document and keeps it current.
//!
//! The loaded policy is published through a [`SharedPolicy`], which readers
//! (i.e. the admission handler) consult on every request. A [`Reloader`]
//! re-reads the document when it changes on disk and on a fixed interval.
//! A document that fails to load never replaces the policy in effect.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod document;
mod fs_watch;
mod metrics;
mod reload;
mod store;

pub use self::{
    document::{parse, Scope},
    metrics::ReloadMetrics,
    reload::Reloader,
    store::SharedPolicy,
};
use limits_controller_core::{
    quantity::ParseError, Generation, InvalidRequestPolicy, NameNamespace,
};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid policy document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{scope}: invalid {field} {value:?}: {source}")]
    Quantity {
        scope: Scope,
        field: &'static str,
        value: String,
        #[source]
        source: ParseError,
    },

    #[error(transparent)]
    RequestPolicy(#[from] InvalidRequestPolicy),

    #[error("duplicate customNames entry for {0}")]
    DuplicateName(NameNamespace),
}

/// Reads and parses the policy document at `path`.
pub fn load_file(path: &Path) -> Result<Generation, Error> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}
