//! Block subsidy schedule and fee derivation.

use crate::types::Sats;

/// Halving issuance schedule: `base >> (height / halving_interval)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubsidySchedule {
    pub base: Sats,
    pub halving_interval: u64,
}

impl SubsidySchedule {
    pub fn new(base: Sats, halving_interval: u64) -> Self {
        Self {
            base,
            halving_interval,
        }
    }

    /// Subsidy paid to the block at `height`. Zero once the shift would
    /// exhaust the integer width.
    pub fn subsidy_at(&self, height: u64) -> Sats {
        let epoch = height.checked_div(self.halving_interval).unwrap_or(0);
        u32::try_from(epoch)
            .ok()
            .and_then(|e| self.base.checked_shr(e))
            .unwrap_or(0)
    }

    /// Fees collected by a block: coinbase payout minus subsidy.
    ///
    /// Negative when the miner claimed less than the subsidy.
    pub fn fees(&self, payout: Sats, height: u64) -> i64 {
        let payout = i64::try_from(payout).unwrap_or(i64::MAX);
        let subsidy = i64::try_from(self.subsidy_at(height)).unwrap_or(i64::MAX);
        payout.saturating_sub(subsidy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitcoin() -> SubsidySchedule {
        SubsidySchedule::new(5_000_000_000, 210_000)
    }

    #[test]
    fn first_halving_boundary_halves_subsidy() {
        let s = bitcoin();
        assert_eq!(s.subsidy_at(0), 5_000_000_000);
        assert_eq!(s.subsidy_at(209_999), 5_000_000_000);
        assert_eq!(s.subsidy_at(210_000), s.subsidy_at(0) / 2);
        assert_eq!(s.subsidy_at(840_000), 312_500_000);
    }

    #[test]
    fn subsidy_runs_out_after_enough_halvings() {
        let s = bitcoin();
        assert_eq!(s.subsidy_at(210_000 * 33), 0);
        assert_eq!(s.subsidy_at(210_000 * 64), 0);
        assert_eq!(s.subsidy_at(u64::MAX), 0);
    }

    #[test]
    fn payout_equal_to_subsidy_means_zero_fees() {
        let s = bitcoin();
        assert_eq!(s.fees(s.subsidy_at(210_000), 210_000), 0);
        assert_eq!(s.fees(312_512_345, 840_000), 12_345);
        assert_eq!(s.fees(100, 840_000), 100 - 312_500_000);
    }
}
