use itertools::Itertools;
use thiserror::Error;

use super::deviation::DeviationError;
use crate::{
    driver::AdapterError, parameters::ConfigError, streams::StreamKind,
    telemetry::TelemetryError,
};

/// A stream pair whose average deviation is above its tolerance
#[derive(Debug, Clone, PartialEq)]
pub struct PairFailure {
    pub pair: String,
    pub avg: f64,
    pub tolerance: f64,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Timeout after {elapsed_s:.1} s waiting for {waiting_for}")]
    Timeout { waiting_for: String, elapsed_s: f64 },

    #[error("No {0} timestamps were collected")]
    NoSamples(StreamKind),

    #[error("Timestamp deviation above tolerance: {}", format_failures(.0))]
    ToleranceExceeded(Vec<PairFailure>),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error(transparent)]
    Deviation(#[from] DeviationError),

    #[error("Cannot write samples")]
    Csv(#[from] csv::Error),
}

fn format_failures(failures: &[PairFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} avg {:.6} > {}", f.pair, f.avg, f.tolerance))
        .join(", ")
}
