//! IQR-based fee anomaly detection.
//!
//! Values outside `[Q1 - k·IQR, Q3 + k·IQR]` (lower bound clamped at 0)
//! are flagged, with quartiles computed over the rolling history using
//! linear interpolation between closest ranks.

use std::fmt;

/// Minimum history length before detection is active.
pub const ANOMALY_WARMUP: usize = 100;

/// A single anomaly raised for a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AnomalyFlag {
    /// Only the coinbase transaction was included.
    EmptyBlock,
    /// Total fees above the upper IQR bound.
    HighFees,
    /// Total fees below the lower IQR bound.
    LowFees,
}

impl AnomalyFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyFlag::EmptyBlock => "empty_block",
            AnomalyFlag::HighFees => "high_fees",
            AnomalyFlag::LowFees => "low_fees",
        }
    }
}

impl fmt::Display for AnomalyFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quartile bounds computed over the history.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    /// Computes bounds over `values` widened by `sensitivity`·IQR.
    ///
    /// Returns `None` for an empty input.
    pub fn compute(values: &[f64], sensitivity: f64) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let q1 = percentile(&sorted, 25.0)?;
        let q3 = percentile(&sorted, 75.0)?;
        let iqr = q3 - q1;

        Some(Self {
            q1,
            q3,
            iqr,
            lower: (q1 - iqr * sensitivity).max(0.0),
            upper: q3 + iqr * sensitivity,
        })
    }
}

/// `p`-th percentile (0..=100) of an ascending slice, interpolating
/// linearly between the two closest ranks.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p.clamp(0.0, 100.0) / 100.0) * last as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Outcome of the anomaly check for one block.
///
/// `bounds` is `None` while the history is still warming up; in that case
/// `flags` is always empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnomalyReport {
    pub bounds: Option<IqrBounds>,
    pub flags: Vec<AnomalyFlag>,
}

impl AnomalyReport {
    pub fn is_active(&self) -> bool {
        self.bounds.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}

/// Evaluates one block against the fee history.
///
/// `history_fees` must already include the block being evaluated.
pub fn detect(
    total_fees: i64,
    is_empty_block: bool,
    history_fees: &[f64],
    sensitivity: f64,
) -> AnomalyReport {
    if history_fees.len() < ANOMALY_WARMUP {
        return AnomalyReport::default();
    }
    let Some(bounds) = IqrBounds::compute(history_fees, sensitivity) else {
        return AnomalyReport::default();
    };

    let mut flags = Vec::new();
    if is_empty_block {
        flags.push(AnomalyFlag::EmptyBlock);
    }
    let fees = total_fees as f64;
    if fees > bounds.upper {
        flags.push(AnomalyFlag::HighFees);
    }
    if fees < bounds.lower {
        flags.push(AnomalyFlag::LowFees);
    }

    AnomalyReport {
        bounds: Some(bounds),
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_interpolates_between_ranks() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!(approx(percentile(&v, 25.0).unwrap(), 1.75));
        assert!(approx(percentile(&v, 50.0).unwrap(), 2.5));
        assert!(approx(percentile(&v, 75.0).unwrap(), 3.25));
        assert!(approx(percentile(&v, 100.0).unwrap(), 4.0));
        assert!(approx(percentile(&[7.0], 25.0).unwrap(), 7.0));
        assert!(percentile(&[], 50.0).is_none());
    }

    #[test]
    fn bounds_sort_input_and_clamp_lower_at_zero() {
        let values: Vec<f64> = (0..=100).rev().map(f64::from).collect();
        let b = IqrBounds::compute(&values, 1.0).unwrap();
        assert!(approx(b.q1, 25.0));
        assert!(approx(b.q3, 75.0));
        assert!(approx(b.iqr, 50.0));
        assert!(approx(b.lower, 0.0));
        assert!(approx(b.upper, 125.0));

        let narrow = IqrBounds::compute(&values, 0.5).unwrap();
        assert!(approx(narrow.lower, 0.0));
        assert!(approx(narrow.upper, 100.0));
    }

    #[test]
    fn detection_is_gated_by_warmup() {
        let fees = vec![1_000.0; ANOMALY_WARMUP - 1];
        let report = detect(i64::MAX, true, &fees, 1.0);
        assert!(!report.is_active());
        assert!(report.is_empty());
    }

    #[test]
    fn flags_outliers_once_warm() {
        let mut fees: Vec<f64> = (0..ANOMALY_WARMUP).map(|i| 1_000.0 + i as f64).collect();

        fees.push(50_000.0);
        let high = detect(50_000, false, &fees, 1.0);
        assert!(high.is_active());
        assert_eq!(high.flags, vec![AnomalyFlag::HighFees]);

        fees.pop();
        fees.push(5.0);
        let low = detect(5, true, &fees, 1.0);
        assert_eq!(low.flags, vec![AnomalyFlag::EmptyBlock, AnomalyFlag::LowFees]);

        let normal = detect(1_050, false, &fees, 1.0);
        assert!(normal.is_active());
        assert!(normal.is_empty());
    }

    #[test]
    fn flag_names_match_report_vocabulary() {
        assert_eq!(AnomalyFlag::EmptyBlock.to_string(), "empty_block");
        assert_eq!(AnomalyFlag::HighFees.as_str(), "high_fees");
        assert_eq!(AnomalyFlag::LowFees.as_str(), "low_fees");
    }
}
