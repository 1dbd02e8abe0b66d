use crate::config::ConfigError;

/// Reconciliation parameters.
///
/// `sensitivity` scales the IQR anomaly bounds while the window is being
/// initialised; `extension_sensitivity` is used for blocks ingested while
/// extending or repairing, where narrower bounds are wanted.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Target number of blocks kept in the window.
    pub window_size: usize,
    /// Upper bound on blocks examined by one common-ancestor search.
    /// `None` leaves the search bounded only by the window depth.
    pub max_ancestor_steps: Option<usize>,
    /// IQR multiplier used on the initialisation path.
    pub sensitivity: f64,
    /// IQR multiplier used on the extension and repair paths.
    pub extension_sensitivity: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            window_size: 100,
            max_ancestor_steps: None,
            sensitivity: 1.0,
            extension_sensitivity: 0.5,
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be at least 1".into()));
        }
        if self.max_ancestor_steps == Some(0) {
            return Err(ConfigError::Invalid(
                "max_ancestor_steps must be at least 1 when set".into(),
            ));
        }
        for (name, value) in [
            ("sensitivity", self.sensitivity),
            ("extension_sensitivity", self.extension_sensitivity),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a finite, non-negative number"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_degenerate_values() {
        let ok = ReconcilerConfig::default();
        assert!(ok.validate().is_ok());

        let zero_steps = ReconcilerConfig {
            max_ancestor_steps: Some(0),
            ..ok.clone()
        };
        assert!(zero_steps.validate().is_err());

        let nan = ReconcilerConfig {
            extension_sensitivity: f64::NAN,
            ..ok.clone()
        };
        assert!(nan.validate().is_err());

        let negative = ReconcilerConfig {
            sensitivity: -1.0,
            ..ok
        };
        assert!(negative.validate().is_err());
    }
}
