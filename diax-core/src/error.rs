//! Structured error types for the alignment engine.
//!
//! Every variant is fatal for the alignment call that raised it: one malformed
//! signal aborts the whole request instead of silently dropping a column.

use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlignError {
    #[error("malformed signal '{signal}': {reason}")]
    MalformedSignal { signal: String, reason: String },

    #[error("invalid timestamp '{value}' in signal '{signal}'")]
    InvalidTimestamp { signal: String, value: String },

    #[error("cannot build a grid: no signal samples and no explicit bounds")]
    EmptyGrid,

    #[error("invalid bounds: start {start} is after end {end}")]
    InvalidBounds {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("invalid sampling period: {0} minutes (must be finite and > 0)")]
    InvalidSamplingPeriod(f64),

    #[error("unknown aggregation rule: '{0}' (expected mean, sum or ffill)")]
    UnknownAggregationRule(String),

    #[error(
        "unknown gap-fill rule: '{0}' (expected interpolate, interpolate_inside, ffill, mean, none or fill<number>)"
    )]
    UnknownGapFillRule(String),

    #[error("unknown tolerance: '{0}' (expected minutes or 'unbounded')")]
    UnknownTolerance(String),

    #[error("gap-fill '{rule}' for signal '{signal}' returned {actual} values, grid has {expected}")]
    GapFillContract {
        signal: String,
        rule: String,
        expected: usize,
        actual: usize,
    },

    #[error("bundle error: {0}")]
    Bundle(#[from] BundleError),
}

impl AlignError {
    pub(crate) fn malformed(signal: &str, reason: impl Into<String>) -> Self {
        AlignError::MalformedSignal {
            signal: signal.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors while reading a serialized subject bundle.
#[derive(Debug, Error)]
pub enum BundleError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse bundle JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bundle root must be a JSON object")]
    NotAnObject,
}
