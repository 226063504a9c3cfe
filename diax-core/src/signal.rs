//! Signal ingestion: parse timestamps, pair them with values, sort.
//!
//! Sorting is stable, so duplicate timestamps keep their original relative
//! order (this matters for `ffill` aggregation, which takes the last value
//! in a bucket).

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::bundle::RawSignal;
use crate::error::AlignError;

/// One raw observation. `value == None` is a recorded-but-missing reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: NaiveDateTime,
    pub value: Option<f64>,
}

impl Sample {
    pub fn new(time: NaiveDateTime, value: Option<f64>) -> Self {
        Self { time, value }
    }
}

/// A named, time-sorted series of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    name: String,
    samples: Vec<Sample>,
}

impl Signal {
    /// Build a signal from samples in any order.
    pub fn new(name: impl Into<String>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.time);
        Self {
            name: name.into(),
            samples,
        }
    }

    /// Parse and normalize a raw bundle entry.
    pub fn from_raw(name: &str, raw: &RawSignal) -> Result<Self, AlignError> {
        if raw.time.is_one() != raw.value.is_one() || raw.time.len() != raw.value.len() {
            return Err(AlignError::malformed(
                name,
                format!(
                    "{} timestamps but {} values",
                    raw.time.len(),
                    raw.value.len()
                ),
            ));
        }

        let samples = raw
            .time
            .as_slice()
            .iter()
            .zip(raw.value.as_slice())
            .map(|(text, value)| {
                let time =
                    parse_timestamp(text).ok_or_else(|| AlignError::InvalidTimestamp {
                        signal: name.to_string(),
                        value: text.clone(),
                    })?;
                Ok(Sample::new(time, *value))
            })
            .collect::<Result<Vec<_>, AlignError>>()?;

        Ok(Self::new(name, samples))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Earliest timestamp, if any.
    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.samples.first().map(|s| s.time)
    }

    /// Latest timestamp, if any.
    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.samples.last().map(|s| s.time)
    }
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 timestamp into a naive instant.
///
/// Offsets (`Z`, `+02:00`) are accepted and dropped, keeping the wall-clock
/// time. A bare date means midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Format an instant the way bundles store it.
pub fn format_timestamp(time: &NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}
