//! DIAX Runner: batch alignment, export and run manifests.
//!
//! This crate builds on `diax-core` to provide:
//! - Bundle discovery in an input directory
//! - Parallel per-subject alignment with failure isolation
//! - CSV and Parquet export of aligned tables
//! - A versioned JSON manifest per batch

pub mod batch;
pub mod export;
pub mod manifest;

pub use batch::{discover_bundles, BatchError, BatchRunner};
pub use export::{
    export_csv, export_manifest_json, import_manifest_json, load_manifest, write_csv,
    write_manifest, write_parquet,
};
pub use manifest::{BatchManifest, SubjectOutcome, MANIFEST_FILE, SCHEMA_VERSION};
