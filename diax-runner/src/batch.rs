//! Batch alignment over a set of subject bundles.
//!
//! Each input file is one subject. Subjects are aligned independently
//! (optionally on the rayon pool); a failing subject is recorded in the
//! manifest and the rest of the batch continues. Only problems with the
//! input listing or the output directory abort the batch.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use diax_core::{align, AlignConfig, AlignOptions, Bundle, ConfigError};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{info, warn};

use crate::export::{write_csv, write_manifest, write_parquet};
use crate::manifest::{BatchManifest, SubjectOutcome, MANIFEST_FILE};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("read input directory {path}: {source}")]
    InputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no bundle files (*.json) in {0}")]
    NoInputs(PathBuf),

    #[error("create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Manifest(#[from] anyhow::Error),
}

/// All `*.json` files directly inside `dir`, sorted by path. A batch
/// manifest left there by an earlier run is not a bundle.
pub fn discover_bundles(dir: &Path) -> Result<Vec<PathBuf>, BatchError> {
    let entries = fs::read_dir(dir).map_err(|source| BatchError::InputDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .filter(|path| !path.ends_with(MANIFEST_FILE))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(BatchError::NoInputs(dir.to_path_buf()));
    }
    Ok(paths)
}

/// Aligns many bundles with one set of options.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    options: AlignOptions,
    config_fingerprint: String,
    parquet: bool,
    parallel: bool,
}

impl BatchRunner {
    /// `config_fingerprint` is recorded in the manifest as-is.
    pub fn new(options: AlignOptions, config_fingerprint: impl Into<String>) -> Self {
        Self {
            options,
            config_fingerprint: config_fingerprint.into(),
            parquet: false,
            parallel: true,
        }
    }

    pub fn from_config(config: &AlignConfig) -> Result<Self, BatchError> {
        Ok(Self::new(config.to_options()?, config.fingerprint()))
    }

    /// Also write a Parquet file next to each CSV.
    pub fn with_parquet(mut self, parquet: bool) -> Self {
        self.parquet = parquet;
        self
    }

    /// Align subjects in parallel (the default) or one after another.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn options(&self) -> &AlignOptions {
        &self.options
    }

    /// Align every bundle in `input_dir` into `output_dir`.
    pub fn run_dir(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchManifest, BatchError> {
        let inputs = discover_bundles(input_dir)?;
        self.run(&inputs, output_dir)
    }

    /// Align `inputs` into `output_dir` and write `manifest.json` there.
    pub fn run(&self, inputs: &[PathBuf], output_dir: &Path) -> Result<BatchManifest, BatchError> {
        fs::create_dir_all(output_dir).map_err(|source| BatchError::OutputDir {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let jobs: Vec<(&PathBuf, String)> = inputs.iter().zip(output_stems(inputs)).collect();
        info!(
            subjects = jobs.len(),
            output = %output_dir.display(),
            parallel = self.parallel,
            "batch started"
        );

        let subjects: Vec<SubjectOutcome> = if self.parallel {
            jobs.par_iter()
                .map(|(input, stem)| self.run_subject(input, stem, output_dir))
                .collect()
        } else {
            jobs.iter()
                .map(|(input, stem)| self.run_subject(input, stem, output_dir))
                .collect()
        };

        let manifest = BatchManifest::new(
            self.config_fingerprint.clone(),
            self.options.sampling_period,
            subjects,
        );
        write_manifest(&manifest, output_dir)?;
        info!(
            succeeded = manifest.succeeded(),
            failed = manifest.failed(),
            "batch finished"
        );
        Ok(manifest)
    }

    fn run_subject(&self, input: &Path, stem: &str, output_dir: &Path) -> SubjectOutcome {
        match self.try_run_subject(input, stem, output_dir) {
            Ok(outcome) => {
                info!(subject = %outcome.subject, rows = outcome.rows, "subject aligned");
                outcome
            }
            Err((subject, err)) => {
                let message = format!("{err:#}");
                warn!(subject = %subject, error = %message, "subject failed");
                SubjectOutcome::failed(subject, input.to_path_buf(), message)
            }
        }
    }

    /// On failure, returns the best subject id known so far with the error.
    fn try_run_subject(
        &self,
        input: &Path,
        stem: &str,
        output_dir: &Path,
    ) -> Result<SubjectOutcome, (String, anyhow::Error)> {
        let bundle = Bundle::from_path(input)
            .with_context(|| format!("failed to load {}", input.display()))
            .map_err(|e| (stem.to_string(), e))?;
        let subject = bundle.subject_id().unwrap_or_else(|| stem.to_string());
        let fail = |e: anyhow::Error| (subject.clone(), e);

        let table = align(&bundle, &self.options)
            .context("alignment failed")
            .map_err(fail)?;

        let csv_path = output_dir.join(format!("{stem}.csv"));
        let csv = write_csv(&table, &csv_path).map_err(fail)?;

        let parquet = if self.parquet {
            let path = output_dir.join(format!("{stem}.parquet"));
            write_parquet(&table, &path).map_err(fail)?;
            Some(path)
        } else {
            None
        };

        Ok(SubjectOutcome {
            subject: subject.clone(),
            source: input.to_path_buf(),
            rows: table.len(),
            columns: table.column_names().into_iter().map(String::from).collect(),
            csv: Some(csv_path),
            parquet,
            data_hash: Some(blake3::hash(csv.as_bytes()).to_hex().to_string()),
            error: None,
        })
    }
}

/// Output file stem per input: the input's file stem, with `-2`, `-3`, ...
/// appended when two inputs share one.
fn output_stems(inputs: &[PathBuf]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    inputs
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "subject".to_string());
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                stem
            } else {
                format!("{stem}-{count}")
            }
        })
        .collect()
}
