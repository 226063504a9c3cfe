//! Batch run manifest.
//!
//! One `manifest.json` per batch output directory records what was aligned,
//! with which configuration, and where each subject's table went. Failed
//! subjects are listed with their error instead of aborting the batch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Current manifest schema version. Manifests with a newer version are
/// rejected on load.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the manifest inside a batch output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Outcome for one input bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectOutcome {
    /// Subject id from the bundle, else the file stem.
    pub subject: String,
    pub source: PathBuf,
    #[serde(default)]
    pub rows: usize,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csv: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parquet: Option<PathBuf>,
    /// BLAKE3 of the CSV bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SubjectOutcome {
    pub fn failed(subject: impl Into<String>, source: PathBuf, error: String) -> Self {
        Self {
            subject: subject.into(),
            source,
            rows: 0,
            columns: Vec::new(),
            csv: None,
            parquet: None,
            data_hash: None,
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchManifest {
    pub schema_version: u32,
    pub tool_version: String,
    /// BLAKE3 fingerprint of the alignment config.
    pub config_fingerprint: String,
    pub sampling_period: f64,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub subjects: Vec<SubjectOutcome>,
}

impl BatchManifest {
    pub fn new(config_fingerprint: String, sampling_period: f64, subjects: Vec<SubjectOutcome>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            config_fingerprint,
            sampling_period,
            created_at: chrono::Utc::now().to_rfc3339(),
            subjects,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.subjects.iter().filter(|s| s.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.subjects.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubjectOutcome> {
        self.subjects.iter().filter(|s| !s.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_successes_and_failures() {
        let ok = SubjectOutcome {
            subject: "145".into(),
            source: "in/145.json".into(),
            rows: 288,
            columns: vec!["cgm".into()],
            csv: Some("out/145.csv".into()),
            parquet: None,
            data_hash: Some("abc".into()),
            error: None,
        };
        let bad = SubjectOutcome::failed("146", "in/146.json".into(), "boom".into());
        let manifest = BatchManifest::new("f".repeat(64), 5.0, vec![ok, bad]);

        assert_eq!(manifest.schema_version, SCHEMA_VERSION);
        assert_eq!(manifest.succeeded(), 1);
        assert_eq!(manifest.failed(), 1);
        assert_eq!(manifest.failures().next().unwrap().subject, "146");
    }

    #[test]
    fn failed_outcome_omits_output_fields() {
        let bad = SubjectOutcome::failed("146", "in/146.json".into(), "boom".into());
        let json = serde_json::to_value(&bad).unwrap();
        assert!(json.get("csv").is_none());
        assert!(json.get("parquet").is_none());
        assert_eq!(json["error"], "boom");
    }
}
