//! Subscriber setup for the binaries.
//!
//! Filtering follows `RUST_LOG` (default `info`). The subscriber is installed
//! as the default for the calling thread only; the binaries run on a
//! current-thread runtime so every span and event of the run lands in it.

use crate::error::BranchOutError;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::dispatcher::{self, DefaultGuard};
use tracing::{error, Dispatch};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

pub fn dispatch(format: LogFormat, default_filter: &str) -> Dispatch {
    let filter = env_filter(default_filter);
    match format {
        LogFormat::Text => Dispatch::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false)),
        ),
        LogFormat::Json => Dispatch::new(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            ),
        ),
    }
}

/// Installs the subscriber until the returned guard is dropped.
pub fn init(format: LogFormat) -> DefaultGuard {
    dispatcher::set_default(&dispatch(format, DEFAULT_FILTER))
}

/// Logs the error, the step it belongs to and each underlying cause.
pub fn log_error_chain(err: &BranchOutError) {
    let chain = err.chain();
    error!(step = err.step(), error = %err, "Run failed");
    for (depth, cause) in chain.iter().enumerate().skip(1) {
        error!(depth, %cause, "Caused by");
    }
}
