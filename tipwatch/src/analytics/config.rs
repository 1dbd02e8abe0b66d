use crate::analytics::anomaly::ANOMALY_WARMUP;
use crate::config::ConfigError;
use crate::types::Sats;

/// Analytics pipeline parameters.
///
/// The subsidy parameters describe the monitored chain's issuance
/// schedule; defaults match Bitcoin mainnet.
#[derive(Clone, Debug)]
pub struct AnalyticsConfig {
    /// Capacity of the rolling metrics history.
    pub max_history: usize,
    /// Blocks strictly larger than this many bytes are flagged `is_large`.
    pub large_block_bytes: u64,
    /// Blocks with total fees strictly above this are flagged `has_high_fees`.
    pub high_fee_sats: Sats,
    /// Subsidy at height 0, in the smallest unit.
    pub base_subsidy_sats: Sats,
    /// Number of blocks between subsidy halvings.
    pub halving_interval: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            max_history: 100,
            large_block_bytes: 1_000_000,
            high_fee_sats: 10_000_000,
            base_subsidy_sats: 50 * 100_000_000,
            halving_interval: 210_000,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Detection only activates once the history reaches the warm-up length.
        if self.max_history < ANOMALY_WARMUP {
            return Err(ConfigError::Invalid(format!(
                "max_history must be at least {ANOMALY_WARMUP}, got {}",
                self.max_history
            )));
        }
        if self.halving_interval == 0 {
            return Err(ConfigError::Invalid(
                "halving_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_shorter_than_warmup_is_rejected() {
        assert!(AnalyticsConfig::default().validate().is_ok());

        let short = AnalyticsConfig {
            max_history: ANOMALY_WARMUP - 1,
            ..AnalyticsConfig::default()
        };
        assert!(matches!(short.validate(), Err(ConfigError::Invalid(_))));

        let zero_interval = AnalyticsConfig {
            halving_interval: 0,
            ..AnalyticsConfig::default()
        };
        assert!(zero_interval.validate().is_err());
    }
}
