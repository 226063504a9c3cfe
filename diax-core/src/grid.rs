//! The shared time axis every signal is aligned onto.
//!
//! Points are `start, start + p, start + 2p, ...` up to and including `end`
//! (the last point lands on or before `end`). Arithmetic is done in whole
//! microseconds so that bucket assignment is exact.

use chrono::{Duration, NaiveDateTime};

use crate::error::AlignError;
use crate::signal::Signal;

const MICROS_PER_MINUTE: f64 = 60_000_000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    sampling_period: f64,
    step: Duration,
    points: Vec<NaiveDateTime>,
}

impl Grid {
    /// Build a grid from explicit bounds.
    pub fn new(
        start: NaiveDateTime,
        end: NaiveDateTime,
        sampling_period: f64,
    ) -> Result<Self, AlignError> {
        let step = period_to_step(sampling_period)?;
        if start > end {
            return Err(AlignError::InvalidBounds { start, end });
        }

        let mut points = Vec::new();
        let mut t = start;
        while t <= end {
            points.push(t);
            match t.checked_add_signed(step) {
                Some(next) => t = next,
                None => break,
            }
        }

        Ok(Self {
            sampling_period,
            step,
            points,
        })
    }

    /// Build a grid whose missing bounds come from the envelope of `signals`.
    pub fn covering(
        signals: &[Signal],
        sampling_period: f64,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<Self, AlignError> {
        let start = match start {
            Some(t) => t,
            None => signals
                .iter()
                .filter_map(Signal::first_time)
                .min()
                .ok_or(AlignError::EmptyGrid)?,
        };
        let end = match end {
            Some(t) => t,
            None => signals
                .iter()
                .filter_map(Signal::last_time)
                .max()
                .ok_or(AlignError::EmptyGrid)?,
        };
        Self::new(start, end, sampling_period)
    }

    pub fn points(&self) -> &[NaiveDateTime] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed grid; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.points[0]
    }

    /// Last grid point (may be earlier than the requested end).
    pub fn last(&self) -> NaiveDateTime {
        self.points[self.points.len() - 1]
    }

    /// Sampling period in minutes.
    pub fn sampling_period(&self) -> f64 {
        self.sampling_period
    }

    pub fn step(&self) -> Duration {
        self.step
    }

    /// Index of the grid point whose bucket `(g - p, g]` contains `t`.
    ///
    /// Returns `None` for instants at or before `start - p` and after the
    /// last point.
    pub fn bucket_of(&self, t: NaiveDateTime) -> Option<usize> {
        let offset = (t - self.start()).num_microseconds()?;
        let step = self.step.num_microseconds()?;
        if offset <= -step {
            return None;
        }
        let index = if offset <= 0 {
            0
        } else {
            (offset - 1) / step + 1
        };
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.points.len())
    }
}

/// Convert a sampling period in minutes into a whole-microsecond step.
pub fn period_to_step(sampling_period: f64) -> Result<Duration, AlignError> {
    if !sampling_period.is_finite() || sampling_period <= 0.0 {
        return Err(AlignError::InvalidSamplingPeriod(sampling_period));
    }
    let micros = (sampling_period * MICROS_PER_MINUTE).round();
    if micros < 1.0 || micros > i64::MAX as f64 {
        return Err(AlignError::InvalidSamplingPeriod(sampling_period));
    }
    Ok(Duration::microseconds(micros as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Sample;
    use chrono::NaiveDate;

    fn at(minute: i64) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            + Duration::minutes(minute)
    }

    #[test]
    fn last_point_lands_on_or_before_end() {
        let grid = Grid::new(at(0), at(12), 5.0).unwrap();
        assert_eq!(grid.points(), &[at(0), at(5), at(10)]);
        assert_eq!(grid.last(), at(10));

        let grid = Grid::new(at(0), at(15), 5.0).unwrap();
        assert_eq!(grid.len(), 4);
    }

    #[test]
    fn single_point_when_start_equals_end() {
        let grid = Grid::new(at(7), at(7), 5.0).unwrap();
        assert_eq!(grid.points(), &[at(7)]);
    }

    #[test]
    fn fractional_periods_are_supported() {
        let grid = Grid::new(at(0), at(5), 2.5).unwrap();
        assert_eq!(grid.len(), 3);
        assert_eq!(grid.points()[1], at(0) + Duration::seconds(150));
    }

    #[test]
    fn invalid_period_and_bounds_fail() {
        for bad in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                Grid::new(at(0), at(10), bad),
                Err(AlignError::InvalidSamplingPeriod(_))
            ));
        }
        assert!(matches!(
            Grid::new(at(10), at(0), 5.0),
            Err(AlignError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn envelope_spans_all_signals() {
        let a = Signal::new("a", vec![Sample::new(at(3), Some(1.0))]);
        let b = Signal::new(
            "b",
            vec![Sample::new(at(0), Some(1.0)), Sample::new(at(20), None)],
        );
        let empty = Signal::new("c", Vec::new());
        let grid = Grid::covering(&[a, b, empty], 5.0, None, None).unwrap();
        assert_eq!(grid.start(), at(0));
        assert_eq!(grid.last(), at(20));
    }

    #[test]
    fn explicit_bound_overrides_envelope_side() {
        let a = Signal::new("a", vec![Sample::new(at(3), Some(1.0))]);
        let grid = Grid::covering(&[a], 5.0, Some(at(-10)), None).unwrap();
        assert_eq!(grid.points(), &[at(-10), at(-5), at(0)]);
    }

    #[test]
    fn no_samples_and_no_bounds_is_empty_grid() {
        assert!(matches!(
            Grid::covering(&[], 5.0, None, None),
            Err(AlignError::EmptyGrid)
        ));
        let empty = Signal::new("steps", Vec::new());
        assert!(matches!(
            Grid::covering(&[empty.clone()], 5.0, Some(at(0)), None),
            Err(AlignError::EmptyGrid)
        ));
        assert!(Grid::covering(&[empty], 5.0, Some(at(0)), Some(at(10))).is_ok());
    }

    #[test]
    fn buckets_are_right_closed() {
        let grid = Grid::new(at(0), at(10), 5.0).unwrap();
        assert_eq!(grid.bucket_of(at(-5)), None);
        assert_eq!(grid.bucket_of(at(-4)), Some(0));
        assert_eq!(grid.bucket_of(at(0)), Some(0));
        assert_eq!(grid.bucket_of(at(0) + Duration::seconds(1)), Some(1));
        assert_eq!(grid.bucket_of(at(5)), Some(1));
        assert_eq!(grid.bucket_of(at(10)), Some(2));
        assert_eq!(grid.bucket_of(at(11)), None);
    }
}
