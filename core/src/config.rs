use crate::error::{QpsError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_SEGMENTS: u32 = 16;
pub const DEFAULT_PROXIMITY_BONUS: f64 = 0.5;

/// Tuning knobs for segment partitioning and proximity scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Upper bound on the number of proximity segments per document.
    pub max_segments: u32,
    /// Added once per query-token pair that shares a segment or sits in adjacent ones.
    pub proximity_bonus: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { max_segments: DEFAULT_MAX_SEGMENTS, proximity_bonus: DEFAULT_PROXIMITY_BONUS }
    }
}

impl IndexConfig {
    pub fn new(max_segments: u32, proximity_bonus: f64) -> Result<Self> {
        let config = Self { max_segments, proximity_bonus };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_segments == 0 {
            return Err(QpsError::InvalidConfig("max_segments must be at least 1".into()));
        }
        if !self.proximity_bonus.is_finite() || self.proximity_bonus < 0.0 {
            return Err(QpsError::InvalidConfig(format!(
                "proximity_bonus must be a non-negative number, got {}",
                self.proximity_bonus
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_segments, 16);
        assert_eq!(config.proximity_bonus, 0.5);
    }

    #[test]
    fn rejects_zero_segments_and_negative_bonus() {
        assert!(matches!(IndexConfig::new(0, 0.5), Err(QpsError::InvalidConfig(_))));
        assert!(matches!(IndexConfig::new(4, -1.0), Err(QpsError::InvalidConfig(_))));
        assert!(matches!(IndexConfig::new(4, f64::NAN), Err(QpsError::InvalidConfig(_))));
        assert!(IndexConfig::new(1, 0.0).is_ok());
    }
}
