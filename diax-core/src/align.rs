//! The aligner: bundle in, aligned table out.
//!
//! Every selected signal is parsed, given its resolved policy, resampled onto
//! one shared grid and gap-filled. Any signal failing aborts the whole call.

use std::collections::HashSet;
use std::path::Path;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use tracing::{debug, debug_span, info_span};

use crate::bundle::Bundle;
use crate::error::AlignError;
use crate::gapfill::fill_gaps;
use crate::grid::{period_to_step, Grid};
use crate::policy::{AlignmentPolicy, PolicyOverrides, PolicyResolver};
use crate::resample::resample;
use crate::signal::Signal;
use crate::table::{AlignedTable, SignalColumn};

/// Parameters of one alignment call.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignOptions {
    /// Grid spacing in minutes.
    pub sampling_period: f64,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    /// Signals to align, in output order. `None` selects every signal key.
    pub columns: Option<Vec<String>>,
    pub policies: PolicyOverrides,
    /// Process signals on the rayon pool. Output is identical either way.
    pub parallel: bool,
}

impl AlignOptions {
    pub fn new(sampling_period: f64) -> Self {
        Self {
            sampling_period,
            start_time: None,
            end_time: None,
            columns: None,
            policies: PolicyOverrides::default(),
            parallel: false,
        }
    }

    pub fn with_bounds(
        mut self,
        start_time: Option<NaiveDateTime>,
        end_time: Option<NaiveDateTime>,
    ) -> Self {
        self.start_time = start_time;
        self.end_time = end_time;
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_policies(mut self, policies: PolicyOverrides) -> Self {
        self.policies = policies;
        self
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// Align the selected signals of `bundle`.
pub fn align(bundle: &Bundle, options: &AlignOptions) -> Result<AlignedTable, AlignError> {
    period_to_step(options.sampling_period)?;

    let names = match &options.columns {
        Some(columns) => {
            let mut seen = HashSet::new();
            columns
                .iter()
                .filter(|c| seen.insert(c.as_str()))
                .cloned()
                .collect()
        }
        None => bundle.signal_names(),
    };

    let signals = names
        .iter()
        .map(|name| Signal::from_raw(name, &bundle.raw_signal(name)?))
        .collect::<Result<Vec<_>, _>>()?;

    align_signals(&signals, options)
}

/// Load a bundle from disk and align it.
pub fn align_path(path: &Path, options: &AlignOptions) -> Result<AlignedTable, AlignError> {
    let bundle = Bundle::from_path(path)?;
    align(&bundle, options)
}

/// Align already-parsed signals. Column order follows `signals`.
pub fn align_signals(
    signals: &[Signal],
    options: &AlignOptions,
) -> Result<AlignedTable, AlignError> {
    let period = options.sampling_period;
    let span = info_span!("align", signals = signals.len(), sampling_period = period);
    let _guard = span.enter();

    let resolver = PolicyResolver::new(&options.policies, period);
    let policies: Vec<AlignmentPolicy> = signals.iter().map(|s| resolver.resolve(s.name())).collect();

    let grid = Grid::covering(signals, period, options.start_time, options.end_time)?;
    debug!(
        points = grid.len(),
        start = %grid.start(),
        last = %grid.last(),
        "grid built"
    );

    let columns = if options.parallel {
        signals
            .par_iter()
            .zip(policies.par_iter())
            .map(|(signal, policy)| align_one(signal, policy, &grid))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        signals
            .iter()
            .zip(&policies)
            .map(|(signal, policy)| align_one(signal, policy, &grid))
            .collect::<Result<Vec<_>, _>>()?
    };

    let table = AlignedTable::from_grid(&grid, columns);
    debug!(
        rows = table.len(),
        dropped = grid.len() - table.len(),
        "empty rows removed"
    );
    Ok(table)
}

fn align_one(
    signal: &Signal,
    policy: &AlignmentPolicy,
    grid: &Grid,
) -> Result<SignalColumn, AlignError> {
    let span = debug_span!("signal", name = signal.name());
    let _guard = span.enter();

    let resampled = resample(signal, policy.aggregation, grid);
    let values = fill_gaps(
        signal.name(),
        resampled,
        &policy.gap_fill,
        policy.tolerance,
        grid.sampling_period(),
    )?;
    debug!(
        samples = signal.len(),
        aggregation = %policy.aggregation,
        gap_fill = %policy.gap_fill,
        tolerance = %policy.tolerance,
        filled = values.iter().filter(|v| v.is_some()).count(),
        "signal aligned"
    );

    Ok(SignalColumn {
        name: signal.name().to_string(),
        values,
    })
}
