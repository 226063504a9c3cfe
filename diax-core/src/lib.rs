//! DIAX Core: time-series alignment for diabetes data bundles.
//!
//! Takes a bundle of irregularly sampled signals (CGM, insulin, carbs, heart
//! rate, ...) and produces one table on a regular time grid:
//! - Bundle ingestion and timestamp normalization
//! - Per-signal policy resolution (aggregation, gap fill, tolerance)
//! - Grid building, right-closed bucketing, tolerance-bounded gap filling
//! - Output as an aligned table, a polars DataFrame or a bundle again

pub mod align;
pub mod bundle;
pub mod config;
pub mod error;
pub mod gapfill;
pub mod grid;
pub mod policy;
pub mod resample;
pub mod signal;
pub mod table;

pub use align::{align, align_path, align_signals, AlignOptions};
pub use bundle::{Bundle, OneOrMany, RawSignal};
pub use config::{AlignConfig, ConfigError};
pub use error::{AlignError, BundleError};
pub use grid::Grid;
pub use policy::{
    AggregationRule, AlignmentPolicy, CustomGapFill, GapFillRule, PolicyOverride,
    PolicyOverrides, PolicyResolver, Tolerance, DEFAULT_KEY,
};
pub use signal::{Sample, Signal};
pub use table::{AlignedTable, SignalColumn};
