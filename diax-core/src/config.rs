//! Alignment configuration files.
//!
//! A config is TOML (or JSON, chosen by the `.json` extension) with the same
//! keys as the aligner's options. Each strategy is either one token for every
//! signal or a table of signal name to token:
//!
//! ```toml
//! sampling_period = 5
//! columns = ["cgm", "bolus", "basal_rate"]
//! missing_tolerance = 30
//!
//! [resample_strategy]
//! basal_rate = "ffill"
//!
//! [missing_strategy]
//! bolus = "fill0"
//! default = "interpolate_inside"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::align::AlignOptions;
use crate::error::AlignError;
use crate::grid::period_to_step;
use crate::policy::{AggregationRule, GapFillRule, PolicyOverride, PolicyOverrides, Tolerance};
use crate::signal::parse_timestamp;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no sampling period given (set sampling_period in the config or on the command line)")]
    MissingSamplingPeriod,

    #[error("invalid {field} '{value}'")]
    InvalidTime { field: &'static str, value: String },

    #[error(transparent)]
    Align(#[from] AlignError),
}

/// File form of [`AlignOptions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sampling_period: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resample_strategy: Option<PolicyOverride<AggregationRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_strategy: Option<PolicyOverride<GapFillRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_tolerance: Option<PolicyOverride<Tolerance>>,
    #[serde(default)]
    pub parallel: bool,
}

impl AlignConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn policies(&self) -> PolicyOverrides {
        PolicyOverrides {
            resample_strategy: self.resample_strategy.clone(),
            missing_strategy: self.missing_strategy.clone(),
            missing_tolerance: self.missing_tolerance.clone(),
        }
    }

    /// Validate and convert into aligner options.
    pub fn to_options(&self) -> Result<AlignOptions, ConfigError> {
        let period = self
            .sampling_period
            .ok_or(ConfigError::MissingSamplingPeriod)?;
        period_to_step(period)?;

        let start = parse_bound("start_time", self.start_time.as_deref())?;
        let end = parse_bound("end_time", self.end_time.as_deref())?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(AlignError::InvalidBounds { start, end }.into());
            }
        }

        let mut options = AlignOptions::new(period)
            .with_bounds(start, end)
            .with_policies(self.policies())
            .with_parallelism(self.parallel);
        options.columns = self.columns.clone();
        Ok(options)
    }

    /// BLAKE3 hex digest of the canonical JSON form. Two configs that align
    /// the same way hash the same.
    pub fn fingerprint(&self) -> String {
        // Plain data with BTreeMap tables: infallible, stable key order.
        let json = serde_json::to_string(self).unwrap_or_default();
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }
}

fn parse_bound(
    field: &'static str,
    value: Option<&str>,
) -> Result<Option<chrono::NaiveDateTime>, ConfigError> {
    value
        .map(|text| {
            parse_timestamp(text).ok_or_else(|| ConfigError::InvalidTime {
                field,
                value: text.to_string(),
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const TOML_CONFIG: &str = r#"
sampling_period = 5
start_time = "2024-01-01 00:00"
columns = ["cgm", "bolus"]
missing_tolerance = 30

[resample_strategy]
basal_rate = "ffill"

[missing_strategy]
bolus = "fill0"
default = "interpolate_inside"
"#;

    #[test]
    fn parses_toml_config() {
        let config = AlignConfig::from_toml(TOML_CONFIG).unwrap();
        assert_eq!(config.sampling_period, Some(5.0));
        assert_eq!(
            config.missing_tolerance,
            Some(PolicyOverride::All(Tolerance::Minutes(30.0)))
        );
        let missing = config.missing_strategy.as_ref().unwrap();
        assert_eq!(missing.lookup("bolus"), Some(&GapFillRule::Constant(0.0)));
        assert_eq!(
            missing.lookup("default"),
            Some(&GapFillRule::InterpolateInside)
        );
        assert!(!config.parallel);
    }

    #[test]
    fn converts_into_options() {
        let options = AlignConfig::from_toml(TOML_CONFIG)
            .unwrap()
            .to_options()
            .unwrap();
        assert_eq!(options.sampling_period, 5.0);
        assert_eq!(
            options.start_time,
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
        );
        assert_eq!(options.end_time, None);
        assert_eq!(
            options.columns,
            Some(vec!["cgm".to_string(), "bolus".to_string()])
        );
        assert!(options.policies.resample_strategy.is_some());
    }

    #[test]
    fn json_config_matches_toml() {
        let json = r#"{
            "sampling_period": 5,
            "start_time": "2024-01-01 00:00",
            "columns": ["cgm", "bolus"],
            "missing_tolerance": 30,
            "resample_strategy": {"basal_rate": "ffill"},
            "missing_strategy": {"bolus": "fill0", "default": "interpolate_inside"}
        }"#;
        let from_json = AlignConfig::from_json(json).unwrap();
        let from_toml = AlignConfig::from_toml(TOML_CONFIG).unwrap();
        assert_eq!(from_json, from_toml);
        assert_eq!(from_json.fingerprint(), from_toml.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_policy() {
        let a = AlignConfig::from_toml("sampling_period = 5").unwrap();
        let b = AlignConfig::from_toml("sampling_period = 5\nresample_strategy = \"sum\"").unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn missing_period_is_an_error() {
        let config = AlignConfig::default();
        assert!(matches!(
            config.to_options(),
            Err(ConfigError::MissingSamplingPeriod)
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_period = AlignConfig::from_toml("sampling_period = -1").unwrap();
        assert!(matches!(
            bad_period.to_options(),
            Err(ConfigError::Align(AlignError::InvalidSamplingPeriod(_)))
        ));

        let bad_time =
            AlignConfig::from_toml("sampling_period = 5\nend_time = \"yesterday\"").unwrap();
        assert!(matches!(
            bad_time.to_options(),
            Err(ConfigError::InvalidTime { field: "end_time", .. })
        ));

        let reversed = AlignConfig::from_toml(
            "sampling_period = 5\nstart_time = \"2024-01-02\"\nend_time = \"2024-01-01\"",
        )
        .unwrap();
        assert!(matches!(
            reversed.to_options(),
            Err(ConfigError::Align(AlignError::InvalidBounds { .. }))
        ));

        assert!(AlignConfig::from_toml("resample_strategy = \"median\"").is_err());
    }

    #[test]
    fn reads_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("align.toml");
        std::fs::write(&toml_path, TOML_CONFIG).unwrap();
        let json_path = dir.path().join("align.json");
        std::fs::write(&json_path, r#"{"sampling_period": 15, "parallel": true}"#).unwrap();

        assert_eq!(
            AlignConfig::from_file(&toml_path).unwrap().sampling_period,
            Some(5.0)
        );
        let json = AlignConfig::from_file(&json_path).unwrap();
        assert_eq!(json.sampling_period, Some(15.0));
        assert!(json.parallel);

        assert!(matches!(
            AlignConfig::from_file(&dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
