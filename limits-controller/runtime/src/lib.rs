pub use limits_controller_config as config;
pub use limits_controller_core as core;
pub use limits_controller_k8s as k8s;

mod admission;
mod args;
mod metrics;

pub use self::{
    admission::{Admission, Error},
    args::Args,
    metrics::AdmissionMetrics,
};
