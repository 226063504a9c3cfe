//! Gap filling on a grid-aligned series.
//!
//! A gap is a maximal run of missing slots. The tolerance caps how many
//! consecutive slots a rule may fill (`floor(tolerance / period)`):
//!
//! - interpolation fills an interior gap completely or not at all, and holds
//!   the nearest known value outward over at most `limit` edge slots;
//! - carry-forward, mean and constant fills cover the first `limit` slots of
//!   each gap and leave the rest missing.
//!
//! Known values are never modified by a built-in rule.

use crate::error::AlignError;
use crate::policy::{GapFillRule, Tolerance};

/// A run of missing slots, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start: usize,
    pub end: usize,
}

impl Gap {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Every maximal run of `None` in `series`, in order.
pub fn find_gaps(series: &[Option<f64>]) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let mut open: Option<usize> = None;
    for (i, value) in series.iter().enumerate() {
        match (value, open) {
            (None, None) => open = Some(i),
            (Some(_), Some(start)) => {
                gaps.push(Gap { start, end: i });
                open = None;
            }
            _ => {}
        }
    }
    if let Some(start) = open {
        gaps.push(Gap {
            start,
            end: series.len(),
        });
    }
    gaps
}

/// Apply `rule` to `series` for the signal `signal`.
pub fn fill_gaps(
    signal: &str,
    series: Vec<Option<f64>>,
    rule: &GapFillRule,
    tolerance: Tolerance,
    sampling_period: f64,
) -> Result<Vec<Option<f64>>, AlignError> {
    let limit = tolerance.max_steps(sampling_period);
    let filled = match rule {
        GapFillRule::None => series,
        GapFillRule::Interpolate => interpolate(series, limit, true),
        GapFillRule::InterpolateInside => interpolate(series, limit, false),
        GapFillRule::CarryForward => carry_forward(series, limit),
        GapFillRule::MeanFill => match known_mean(&series) {
            Some(mean) => fill_with(series, mean, limit),
            None => series,
        },
        GapFillRule::Constant(x) => fill_with(series, *x, limit),
        GapFillRule::Custom(custom) => {
            let out = custom.apply(&series, tolerance, sampling_period);
            if out.len() != series.len() {
                return Err(AlignError::GapFillContract {
                    signal: signal.to_string(),
                    rule: rule.to_string(),
                    expected: series.len(),
                    actual: out.len(),
                });
            }
            out
        }
    };
    Ok(filled)
}

/// Number of slots of a gap of length `len` a capped rule may touch.
fn capped(len: usize, limit: Option<usize>) -> usize {
    limit.map_or(len, |l| len.min(l))
}

fn interpolate(mut series: Vec<Option<f64>>, limit: Option<usize>, edges: bool) -> Vec<Option<f64>> {
    let n = series.len();
    for gap in find_gaps(&series) {
        let left = gap.start.checked_sub(1).and_then(|i| series[i]);
        let right = if gap.end < n { series[gap.end] } else { None };

        match (left, right) {
            (Some(l), Some(r)) => {
                if limit.is_some_and(|lim| gap.len() > lim) {
                    continue;
                }
                let x0 = gap.start - 1;
                let slope = (r - l) / (gap.end - x0) as f64;
                for k in gap.start..gap.end {
                    series[k] = Some(slope * (k - x0) as f64 + l);
                }
            }
            (Some(l), None) if edges => {
                let count = capped(gap.len(), limit);
                series[gap.start..gap.start + count].fill(Some(l));
            }
            (None, Some(r)) if edges => {
                let count = capped(gap.len(), limit);
                series[gap.end - count..gap.end].fill(Some(r));
            }
            _ => {}
        }
    }
    series
}

fn carry_forward(mut series: Vec<Option<f64>>, limit: Option<usize>) -> Vec<Option<f64>> {
    for gap in find_gaps(&series) {
        let Some(last) = gap.start.checked_sub(1).and_then(|i| series[i]) else {
            continue;
        };
        let count = capped(gap.len(), limit);
        series[gap.start..gap.start + count].fill(Some(last));
    }
    series
}

fn fill_with(mut series: Vec<Option<f64>>, value: f64, limit: Option<usize>) -> Vec<Option<f64>> {
    for gap in find_gaps(&series) {
        let count = capped(gap.len(), limit);
        series[gap.start..gap.start + count].fill(Some(value));
    }
    series
}

fn known_mean(series: &[Option<f64>]) -> Option<f64> {
    let (sum, count) = series
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const N: Option<f64> = None;

    fn fill(series: &[Option<f64>], rule: GapFillRule, tolerance: Tolerance) -> Vec<Option<f64>> {
        fill_gaps("test", series.to_vec(), &rule, tolerance, 5.0).unwrap()
    }

    #[test]
    fn finds_leading_interior_and_trailing_gaps() {
        let gaps = find_gaps(&[N, Some(1.0), N, N, Some(2.0), N]);
        assert_eq!(
            gaps,
            vec![
                Gap { start: 0, end: 1 },
                Gap { start: 2, end: 4 },
                Gap { start: 5, end: 6 },
            ]
        );
        assert!(find_gaps(&[Some(1.0)]).is_empty());
        assert_eq!(find_gaps(&[N, N]), vec![Gap { start: 0, end: 2 }]);
    }

    #[test]
    fn interpolate_fills_interior_linearly_and_holds_edges() {
        let out = fill(
            &[N, Some(10.0), N, N, Some(40.0), N],
            GapFillRule::Interpolate,
            Tolerance::Unbounded,
        );
        assert_eq!(
            out,
            vec![Some(10.0), Some(10.0), Some(20.0), Some(30.0), Some(40.0), Some(40.0)]
        );
    }

    #[test]
    fn interpolate_leaves_long_interior_gaps_alone() {
        // 10 minutes at 5-minute spacing: at most 2 slots.
        let series = [Some(0.0), N, N, N, Some(4.0), N, N, Some(10.0)];
        let out = fill(&series, GapFillRule::Interpolate, Tolerance::Minutes(10.0));
        assert_eq!(
            out,
            vec![Some(0.0), N, N, N, Some(4.0), Some(6.0), Some(8.0), Some(10.0)]
        );
    }

    #[test]
    fn interpolate_edges_hold_only_up_to_limit() {
        let series = [N, N, N, Some(5.0), N, N, N];
        let out = fill(&series, GapFillRule::Interpolate, Tolerance::Minutes(10.0));
        assert_eq!(
            out,
            vec![N, Some(5.0), Some(5.0), Some(5.0), Some(5.0), Some(5.0), N]
        );
    }

    #[test]
    fn interpolate_inside_never_touches_edges() {
        let series = [N, Some(1.0), N, Some(3.0), N];
        let out = fill(&series, GapFillRule::InterpolateInside, Tolerance::Unbounded);
        assert_eq!(out, vec![N, Some(1.0), Some(2.0), Some(3.0), N]);
    }

    #[test]
    fn carry_forward_respects_limit() {
        let series = [N, Some(0.9), N, N, N, N, Some(1.1)];
        let out = fill(&series, GapFillRule::CarryForward, Tolerance::Minutes(14.0));
        assert_eq!(
            out,
            vec![N, Some(0.9), Some(0.9), Some(0.9), N, N, Some(1.1)]
        );
    }

    #[test]
    fn zero_step_limit_fills_nothing() {
        let series = [Some(1.0), N, Some(3.0)];
        let out = fill(&series, GapFillRule::CarryForward, Tolerance::Minutes(4.0));
        assert_eq!(out, series.to_vec());
        let out = fill(&series, GapFillRule::Interpolate, Tolerance::Minutes(4.0));
        assert_eq!(out, series.to_vec());
    }

    #[test]
    fn non_positive_minutes_fill_like_unbounded() {
        let series = [Some(1.0), N, N, Some(4.0)];
        let unbounded = fill(&series, GapFillRule::CarryForward, Tolerance::minutes(0.0));
        assert_eq!(unbounded, vec![Some(1.0), Some(1.0), Some(1.0), Some(4.0)]);

        for minutes in [0.0, -5.0, f64::NAN] {
            let out = fill(&series, GapFillRule::CarryForward, Tolerance::Minutes(minutes));
            assert_eq!(out, unbounded, "Minutes({minutes})");
        }
    }

    #[test]
    fn mean_fill_uses_mean_of_known_values() {
        let series = [N, Some(2.0), N, Some(4.0)];
        let out = fill(&series, GapFillRule::MeanFill, Tolerance::Unbounded);
        assert_eq!(out, vec![Some(3.0), Some(2.0), Some(3.0), Some(4.0)]);

        let all_missing = [N, N];
        assert_eq!(
            fill(&all_missing, GapFillRule::MeanFill, Tolerance::Unbounded),
            vec![N, N]
        );
    }

    #[test]
    fn constant_fill_caps_each_gap() {
        let series = [N, N, N, Some(7.0), N];
        let out = fill(&series, GapFillRule::Constant(0.0), Tolerance::Minutes(10.0));
        assert_eq!(out, vec![Some(0.0), Some(0.0), N, Some(7.0), Some(0.0)]);
    }

    #[test]
    fn none_leaves_series_untouched() {
        let series = [N, Some(1.0), N];
        assert_eq!(
            fill(&series, GapFillRule::None, Tolerance::Unbounded),
            series.to_vec()
        );
    }

    #[test]
    fn custom_rule_receives_tolerance_and_period() {
        let rule = GapFillRule::custom("marker", |s: &[Option<f64>], tol, period| {
            let steps = tol.max_steps(period).unwrap_or(usize::MAX) as f64;
            s.iter().map(|v| v.or(Some(steps))).collect()
        });
        let out = fill(&[N, Some(1.0)], rule, Tolerance::Minutes(15.0));
        assert_eq!(out, vec![Some(3.0), Some(1.0)]);
    }

    #[test]
    fn custom_rule_with_wrong_length_violates_contract() {
        let rule = GapFillRule::custom("short", |s: &[Option<f64>], _, _| s[1..].to_vec());
        let err = fill_gaps("cgm", vec![N, Some(1.0)], &rule, Tolerance::Unbounded, 5.0)
            .unwrap_err();
        match err {
            AlignError::GapFillContract {
                signal,
                expected,
                actual,
                ..
            } => {
                assert_eq!(signal, "cgm");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("expected GapFillContract, got {other:?}"),
        }
    }
}
