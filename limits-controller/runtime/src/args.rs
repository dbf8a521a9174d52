use crate::{
    admission::Admission,
    config::{self, ReloadMetrics, Reloader, SharedPolicy},
    AdmissionMetrics,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus_client::registry::Registry;
use std::{path::PathBuf, str::FromStr};
use tokio::time::Duration;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Parser)]
#[clap(
    name = "limits-controller",
    about = "An admission controller that enforces resource limits"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "limits_controller=info,warn",
        env = "LIMITS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    server: kubert::ServerArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Path to the resource limits policy document.
    #[clap(long, env = "CONFIG_FILE")]
    config_file: PathBuf,

    /// How often the policy document is re-read, even without a change
    /// notification (e.g. `30s`, `5m`).
    #[clap(long, default_value = "5m", env = "REFRESH_INTERVAL")]
    refresh_interval: RefreshInterval,
}

/// A reload period, written as a whole number with a unit of `ms`, `s`, `m`,
/// `h`, or `d`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct RefreshInterval(Duration);

#[derive(Debug, thiserror::Error)]
enum InvalidInterval {
    #[error("{0:?} does not contain a duration value")]
    Missing(String),

    #[error("invalid duration magnitude: {0}")]
    Magnitude(#[from] std::num::ParseIntError),

    #[error("invalid duration unit {0:?} (expected one of 'ms', 's', 'm', 'h', or 'd')")]
    Unit(String),

    #[error("duration {0:?} overflows when converted to 'ms'")]
    Overflow(String),

    #[error("refresh interval must be greater than zero")]
    Zero,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            server,
            config_file,
            refresh_interval: RefreshInterval(refresh_interval),
        } = self;

        let mut prom = <Registry>::default();
        let admission_metrics =
            AdmissionMetrics::register(prom.sub_registry_with_prefix("admission"));
        let reload_metrics = ReloadMetrics::register(prom.sub_registry_with_prefix("config"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .with_server(server)
            .build()
            .await?;

        // The process refuses to start without a valid policy. Once running,
        // a broken document only fails the reload.
        let generation = config::load_file(&config_file)
            .with_context(|| format!("failed to load policy from {}", config_file.display()))?;
        info!(
            path = %config_file.display(),
            namespaces = generation.namespace_overrides(),
            names = generation.name_overrides(),
            requests = %generation.request_policy(),
            "Loaded policy"
        );
        let policy = SharedPolicy::new(generation);

        let reloader = Reloader::new(
            config_file,
            refresh_interval,
            policy.clone(),
            reload_metrics,
        );
        tokio::spawn(
            reloader
                .run(runtime.shutdown_handle())
                .instrument(info_span!("reload")),
        );

        let admission = Admission::new(policy, admission_metrics);
        let runtime = runtime.spawn_server(admission);

        // Block the main thread on the shutdown signal. Once it fires, wait for the background tasks to
        // complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

// === impl RefreshInterval ===

impl FromStr for RefreshInterval {
    type Err = InvalidInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let offset = s
            .rfind(|c: char| c.is_ascii_digit())
            .ok_or_else(|| InvalidInterval::Missing(s.to_string()))?;
        let (magnitude, unit) = s.split_at(offset + 1);
        let magnitude = magnitude.parse::<u64>()?;

        let mul = match unit {
            "ms" => 1,
            "s" => 1000,
            "m" => 1000 * 60,
            "h" => 1000 * 60 * 60,
            "d" => 1000 * 60 * 60 * 24,
            _ => return Err(InvalidInterval::Unit(unit.to_string())),
        };

        let ms = magnitude
            .checked_mul(mul)
            .ok_or_else(|| InvalidInterval::Overflow(s.to_string()))?;
        if ms == 0 {
            return Err(InvalidInterval::Zero);
        }
        Ok(Self(Duration::from_millis(ms)))
    }
}
