//! Per-signal alignment policies and their resolution.
//!
//! Each signal gets three independent settings: how raw samples in one bucket
//! are aggregated, how gaps are filled afterwards, and how long a gap may be
//! before it is left alone. Each setting is resolved on its own from two
//! layers, never by mutating a shared table:
//!
//! 1. exact signal name in the user overrides
//! 2. exact signal name in the built-in table
//! 3. the `default` key (user first, then built-in)
//! 4. tolerance only: `3 × sampling_period`
//!
//! A single (non-map) user override applies to every signal.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::AlignError;

/// Key looked up when a signal has no entry of its own.
pub const DEFAULT_KEY: &str = "default";

// ─── Aggregation ────────────────────────────────────────────────────

/// How raw samples falling in one grid bucket become one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AggregationRule {
    /// Arithmetic mean of the bucket's values.
    Mean,
    /// Sum of the bucket's values. An empty bucket is missing, not zero.
    Sum,
    /// Last value observed in the bucket.
    CarryForward,
}

impl FromStr for AggregationRule {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mean" => Ok(AggregationRule::Mean),
            "sum" => Ok(AggregationRule::Sum),
            "ffill" => Ok(AggregationRule::CarryForward),
            other => Err(AlignError::UnknownAggregationRule(other.to_string())),
        }
    }
}

impl fmt::Display for AggregationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AggregationRule::Mean => "mean",
            AggregationRule::Sum => "sum",
            AggregationRule::CarryForward => "ffill",
        })
    }
}

impl TryFrom<String> for AggregationRule {
    type Error = AlignError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AggregationRule> for String {
    fn from(rule: AggregationRule) -> Self {
        rule.to_string()
    }
}

// ─── Gap filling ────────────────────────────────────────────────────

/// Signature of a user-supplied gap filler:
/// `(resampled series, tolerance, sampling period in minutes) -> filled series`.
pub type GapFillFn = dyn Fn(&[Option<f64>], Tolerance, f64) -> Vec<Option<f64>> + Send + Sync;

/// A named user-supplied gap filler.
///
/// The engine does not inspect its output beyond checking that the length
/// matches the grid.
#[derive(Clone)]
pub struct CustomGapFill {
    name: String,
    func: Arc<GapFillFn>,
}

impl CustomGapFill {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Option<f64>], Tolerance, f64) -> Vec<Option<f64>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(
        &self,
        series: &[Option<f64>],
        tolerance: Tolerance,
        sampling_period: f64,
    ) -> Vec<Option<f64>> {
        (self.func)(series, tolerance, sampling_period)
    }
}

impl fmt::Debug for CustomGapFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomGapFill")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CustomGapFill {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// How missing grid slots are filled after resampling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GapFillRule {
    /// Linear interpolation inside, zero-order hold at the edges.
    Interpolate,
    /// Linear interpolation inside only; edges stay missing.
    InterpolateInside,
    /// Repeat the last known value forward.
    CarryForward,
    /// Fill with the mean of all known values.
    MeanFill,
    /// Fill with a literal value (`fill<x>`).
    Constant(f64),
    /// Leave gaps missing.
    None,
    /// Delegate to a user-supplied function.
    Custom(CustomGapFill),
}

impl GapFillRule {
    pub fn custom<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Option<f64>], Tolerance, f64) -> Vec<Option<f64>> + Send + Sync + 'static,
    {
        GapFillRule::Custom(CustomGapFill::new(name, func))
    }
}

impl FromStr for GapFillRule {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        match token {
            "interpolate" => return Ok(GapFillRule::Interpolate),
            "interpolate_inside" => return Ok(GapFillRule::InterpolateInside),
            "ffill" => return Ok(GapFillRule::CarryForward),
            "mean" => return Ok(GapFillRule::MeanFill),
            "none" => return Ok(GapFillRule::None),
            _ => {}
        }
        token
            .strip_prefix("fill")
            .and_then(|rest| rest.trim().parse::<f64>().ok())
            .filter(|x| x.is_finite())
            .map(GapFillRule::Constant)
            .ok_or_else(|| AlignError::UnknownGapFillRule(token.to_string()))
    }
}

impl fmt::Display for GapFillRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GapFillRule::Interpolate => f.write_str("interpolate"),
            GapFillRule::InterpolateInside => f.write_str("interpolate_inside"),
            GapFillRule::CarryForward => f.write_str("ffill"),
            GapFillRule::MeanFill => f.write_str("mean"),
            GapFillRule::Constant(x) => write!(f, "fill{x}"),
            GapFillRule::None => f.write_str("none"),
            GapFillRule::Custom(c) => write!(f, "custom:{}", c.name()),
        }
    }
}

impl TryFrom<String> for GapFillRule {
    type Error = AlignError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GapFillRule> for String {
    fn from(rule: GapFillRule) -> Self {
        rule.to_string()
    }
}

// ─── Tolerance ──────────────────────────────────────────────────────

/// Longest gap (in minutes) a gap filler may fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tolerance {
    Minutes(f64),
    Unbounded,
}

impl Tolerance {
    /// Non-positive and non-finite durations mean "no limit".
    pub fn minutes(minutes: f64) -> Self {
        if minutes.is_finite() && minutes > 0.0 {
            Tolerance::Minutes(minutes)
        } else {
            Tolerance::Unbounded
        }
    }

    /// Maximum number of consecutive missing grid steps eligible for filling.
    /// `None` means unlimited, as does a non-positive or non-finite
    /// `Minutes` built without [`Tolerance::minutes`].
    pub fn max_steps(&self, sampling_period: f64) -> Option<usize> {
        match *self {
            Tolerance::Minutes(m) if m.is_finite() && m > 0.0 => {
                Some((m / sampling_period).floor() as usize)
            }
            _ => None,
        }
    }
}

impl FromStr for Tolerance {
    type Err = AlignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        match token.to_ascii_lowercase().as_str() {
            "unbounded" | "none" | "inf" | "infinity" => Ok(Tolerance::Unbounded),
            _ => token
                .parse::<f64>()
                .map(Tolerance::minutes)
                .map_err(|_| AlignError::UnknownTolerance(token.to_string())),
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tolerance::Minutes(m) => write!(f, "{m}"),
            Tolerance::Unbounded => f.write_str("unbounded"),
        }
    }
}

impl Serialize for Tolerance {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tolerance::Minutes(m) => serializer.serialize_f64(*m),
            Tolerance::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToleranceRepr {
    Minutes(f64),
    Token(String),
}

impl<'de> Deserialize<'de> for Tolerance {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<ToleranceRepr>::deserialize(deserializer)? {
            None => Ok(Tolerance::Unbounded),
            Some(ToleranceRepr::Minutes(m)) => Ok(Tolerance::minutes(m)),
            Some(ToleranceRepr::Token(t)) => t.parse().map_err(serde::de::Error::custom),
        }
    }
}

// ─── Overrides ──────────────────────────────────────────────────────

/// A user override for one policy dimension: one rule for every signal, or
/// a table keyed by signal name (which may contain `default`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyOverride<T> {
    All(T),
    PerSignal(BTreeMap<String, T>),
}

impl<T> PolicyOverride<T> {
    pub fn per_signal<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        PolicyOverride::PerSignal(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The rule this override assigns to `name`, if any.
    pub fn lookup(&self, name: &str) -> Option<&T> {
        match self {
            PolicyOverride::All(rule) => Some(rule),
            PolicyOverride::PerSignal(table) => table.get(name),
        }
    }
}

/// User overrides for all three dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resample_strategy: Option<PolicyOverride<AggregationRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_strategy: Option<PolicyOverride<GapFillRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_tolerance: Option<PolicyOverride<Tolerance>>,
}

// ─── Built-in table ─────────────────────────────────────────────────

fn builtin_aggregation(name: &str) -> Option<AggregationRule> {
    match name {
        "cgm" | "basal_rate" | "heart_rate" => Some(AggregationRule::Mean),
        "basal_inj" | "bolus" | "carbs" | "steps" => Some(AggregationRule::Sum),
        DEFAULT_KEY => Some(AggregationRule::CarryForward),
        _ => None,
    }
}

fn builtin_gap_fill(name: &str) -> Option<GapFillRule> {
    match name {
        "cgm" | "heart_rate" => Some(GapFillRule::Interpolate),
        "basal_rate" => Some(GapFillRule::CarryForward),
        "basal_inj" | "bolus" | "carbs" | "steps" => Some(GapFillRule::None),
        DEFAULT_KEY => Some(GapFillRule::Interpolate),
        _ => None,
    }
}

fn builtin_tolerance(name: &str, sampling_period: f64) -> Option<Tolerance> {
    match name {
        "cgm" => Some(Tolerance::Minutes(60.0)),
        "basal_rate" | "basal_inj" => Some(Tolerance::Minutes(1440.0)),
        "bolus" | "carbs" | "steps" => Some(Tolerance::Unbounded),
        "heart_rate" => Some(Tolerance::Minutes(15.0)),
        DEFAULT_KEY => Some(Tolerance::minutes(3.0 * sampling_period)),
        _ => None,
    }
}

// ─── Resolution ─────────────────────────────────────────────────────

/// Fully-resolved policy for one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignmentPolicy {
    pub aggregation: AggregationRule,
    pub gap_fill: GapFillRule,
    pub tolerance: Tolerance,
}

/// Resolves policies against the user overrides and the built-in table.
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver<'a> {
    overrides: &'a PolicyOverrides,
    sampling_period: f64,
}

impl<'a> PolicyResolver<'a> {
    pub fn new(overrides: &'a PolicyOverrides, sampling_period: f64) -> Self {
        Self {
            overrides,
            sampling_period,
        }
    }

    pub fn resolve(&self, name: &str) -> AlignmentPolicy {
        let period = self.sampling_period;
        AlignmentPolicy {
            aggregation: layered(
                self.overrides.resample_strategy.as_ref(),
                name,
                builtin_aggregation,
            )
            .unwrap_or(AggregationRule::CarryForward),
            gap_fill: layered(
                self.overrides.missing_strategy.as_ref(),
                name,
                builtin_gap_fill,
            )
            .unwrap_or(GapFillRule::Interpolate),
            tolerance: layered(self.overrides.missing_tolerance.as_ref(), name, |key| {
                builtin_tolerance(key, period)
            })
            .unwrap_or(Tolerance::minutes(3.0 * period)),
        }
    }
}

fn layered<T: Clone>(
    user: Option<&PolicyOverride<T>>,
    name: &str,
    builtin: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    user.and_then(|o| o.lookup(name))
        .cloned()
        .or_else(|| builtin(name))
        .or_else(|| user.and_then(|o| o.lookup(DEFAULT_KEY)).cloned())
        .or_else(|| builtin(DEFAULT_KEY))
}
