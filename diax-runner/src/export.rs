//! Export of aligned tables and manifests.
//!
//! - **CSV**: header `time,<signal...>`, ISO timestamps, empty cell for missing
//! - **Parquet**: the table's polars DataFrame
//! - **JSON**: batch manifests, with schema versioning

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use diax_core::signal::format_timestamp;
use diax_core::AlignedTable;
use polars::prelude::ParquetWriter;

use crate::manifest::{BatchManifest, MANIFEST_FILE, SCHEMA_VERSION};

// ─── CSV export ─────────────────────────────────────────────────────

/// Render an aligned table as CSV.
pub fn export_csv(table: &AlignedTable) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["time"];
    header.extend(table.column_names());
    wtr.write_record(&header)?;

    for (time, values) in table.rows() {
        let mut record = Vec::with_capacity(values.len() + 1);
        record.push(format_timestamp(&time));
        record.extend(
            values
                .iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default()),
        );
        wtr.write_record(&record)?;
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Write the CSV rendering to `path` and return it.
pub fn write_csv(table: &AlignedTable, path: &Path) -> Result<String> {
    let csv = export_csv(table)?;
    fs::write(path, &csv).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(csv)
}

// ─── Parquet export ─────────────────────────────────────────────────

pub fn write_parquet(table: &AlignedTable, path: &Path) -> Result<()> {
    let mut df = table
        .to_dataframe()
        .context("failed to build DataFrame from aligned table")?;
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("failed to write parquet {}", path.display()))?;
    Ok(())
}

// ─── Manifest ───────────────────────────────────────────────────────

pub fn export_manifest_json(manifest: &BatchManifest) -> Result<String> {
    serde_json::to_string_pretty(manifest).context("failed to serialize manifest to JSON")
}

/// Parse a manifest, rejecting unknown schema versions.
pub fn import_manifest_json(json: &str) -> Result<BatchManifest> {
    let manifest: BatchManifest =
        serde_json::from_str(json).context("failed to deserialize manifest from JSON")?;
    if manifest.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            manifest.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(manifest)
}

pub fn write_manifest(manifest: &BatchManifest, output_dir: &Path) -> Result<()> {
    let path = output_dir.join(MANIFEST_FILE);
    let json = export_manifest_json(manifest)?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))
}

pub fn load_manifest(output_dir: &Path) -> Result<BatchManifest> {
    let path = output_dir.join(MANIFEST_FILE);
    let json = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_manifest_json(&json)
}
