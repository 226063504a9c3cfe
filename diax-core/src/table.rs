//! The aligned output table: one regular time index, one column per signal.

use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::bundle::{Bundle, RawSignal};
use crate::grid::Grid;
use crate::signal::format_timestamp;

/// One aligned signal. `values[i]` belongs to `index[i]` of the owning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Aligned, gap-filled signals on a shared regular index.
///
/// Rows where every column is missing have already been removed, so the
/// index is strictly increasing with spacing that is a whole multiple of the
/// sampling period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedTable {
    sampling_period: f64,
    index: Vec<NaiveDateTime>,
    columns: Vec<SignalColumn>,
}

impl AlignedTable {
    /// Assemble full-grid columns and drop the rows that are missing everywhere.
    pub(crate) fn from_grid(grid: &Grid, columns: Vec<SignalColumn>) -> Self {
        let keep: Vec<bool> = (0..grid.len())
            .map(|row| columns.iter().any(|c| c.values[row].is_some()))
            .collect();

        let index = grid
            .points()
            .iter()
            .zip(&keep)
            .filter(|(_, &k)| k)
            .map(|(t, _)| *t)
            .collect();

        let columns = columns
            .into_iter()
            .map(|c| SignalColumn {
                name: c.name,
                values: c
                    .values
                    .into_iter()
                    .zip(&keep)
                    .filter(|(_, &k)| k)
                    .map(|(v, _)| v)
                    .collect(),
            })
            .collect();

        Self {
            sampling_period: grid.sampling_period(),
            index,
            columns,
        }
    }

    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Sampling period in minutes.
    pub fn sampling_period(&self) -> f64 {
        self.sampling_period
    }

    pub fn columns(&self) -> &[SignalColumn] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Value of `name` at `time`, `None` if the row, column or value is absent.
    pub fn value_at(&self, name: &str, time: NaiveDateTime) -> Option<f64> {
        let row = self.index.binary_search(&time).ok()?;
        self.column(name)?[row]
    }

    /// Rows as `(time, values in column order)`.
    pub fn rows(&self) -> impl Iterator<Item = (NaiveDateTime, Vec<Option<f64>>)> + '_ {
        self.index.iter().enumerate().map(move |(row, t)| {
            (*t, self.columns.iter().map(|c| c.values[row]).collect())
        })
    }

    /// Convert back into the bundle shape (missing values become `null`), so
    /// an aligned table can be fed to the aligner again.
    pub fn to_bundle(&self) -> Bundle {
        let times: Vec<String> = self.index.iter().map(format_timestamp).collect();
        let mut bundle = Bundle::new();
        for column in &self.columns {
            bundle.insert_signal(
                column.name.clone(),
                RawSignal::new(times.clone(), column.values.clone()),
            );
        }
        bundle
    }

    /// Polars view: a `time` column (`Datetime[ms]`) plus one nullable `f64`
    /// column per signal.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let millis: Vec<i64> = self
            .index
            .iter()
            .map(|t| t.and_utc().timestamp_millis())
            .collect();

        let mut frame_columns = Vec::with_capacity(self.columns.len() + 1);
        frame_columns.push(
            Column::new("time".into(), millis)
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        );
        for column in &self.columns {
            frame_columns.push(Column::new(
                column.name.as_str().into(),
                column.values.clone(),
            ));
        }
        DataFrame::new(frame_columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn at(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    fn sample_table() -> AlignedTable {
        let grid = Grid::new(at(0), at(15), 5.0).unwrap();
        AlignedTable::from_grid(
            &grid,
            vec![
                SignalColumn {
                    name: "cgm".into(),
                    values: vec![Some(100.0), None, None, Some(120.0)],
                },
                SignalColumn {
                    name: "bolus".into(),
                    values: vec![None, None, Some(2.0), None],
                },
            ],
        )
    }

    #[test]
    fn all_missing_rows_are_dropped() {
        let table = sample_table();
        assert_eq!(table.index(), &[at(0), at(10), at(15)]);
        assert_eq!(table.column("cgm").unwrap(), &[Some(100.0), None, Some(120.0)]);
        assert_eq!(table.column("bolus").unwrap(), &[None, Some(2.0), None]);
        assert_eq!(table.column_names(), vec!["cgm", "bolus"]);
    }

    #[test]
    fn value_lookup_by_time() {
        let table = sample_table();
        assert_eq!(table.value_at("bolus", at(10)), Some(2.0));
        assert_eq!(table.value_at("bolus", at(5)), None);
        assert_eq!(table.value_at("steps", at(0)), None);
    }

    #[test]
    fn rows_follow_column_order() {
        let rows: Vec<_> = sample_table().rows().collect();
        assert_eq!(rows[1], (at(10), vec![None, Some(2.0)]));
    }

    #[test]
    fn bundle_view_keeps_nulls() {
        let bundle = sample_table().to_bundle();
        assert_eq!(bundle.signal_names(), vec!["bolus", "cgm"]);
        let cgm = bundle.raw_signal("cgm").unwrap();
        assert_eq!(cgm.value.as_slice(), &[Some(100.0), None, Some(120.0)]);
        assert_eq!(cgm.time.as_slice()[0], "2024-01-01T00:00:00");
    }

    #[test]
    fn dataframe_view_has_time_and_signal_columns() {
        let df = sample_table().to_dataframe().unwrap();
        assert_eq!(df.height(), 3);
        assert_eq!(df.width(), 3);
        let cgm = df.column("cgm").unwrap().f64().unwrap();
        assert_eq!(cgm.get(0), Some(100.0));
        assert_eq!(cgm.get(1), None);
        assert!(matches!(
            df.column("time").unwrap().dtype(),
            DataType::Datetime(TimeUnit::Milliseconds, None)
        ));
    }

    #[test]
    fn empty_table_when_everything_is_missing() {
        let grid = Grid::new(at(0), at(10), 5.0).unwrap();
        let table = AlignedTable::from_grid(
            &grid,
            vec![SignalColumn {
                name: "steps".into(),
                values: vec![None; 3],
            }],
        );
        assert!(table.is_empty());
        assert_eq!(table.column("steps").unwrap().len(), 0);
    }
}
