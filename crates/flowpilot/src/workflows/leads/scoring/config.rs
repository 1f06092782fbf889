use serde::{Deserialize, Serialize};

const DEFAULT_MINIMUM_SCORE: u8 = 40;
const DEFAULT_HIGH_VALUE_SCORE: u8 = 70;

/// Per-form thresholds steering the automatic status decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingThresholds {
    /// Scores below this are rejected automatically.
    pub minimum_score: u8,
    /// Scores above this are accepted automatically.
    pub high_value_score: u8,
}

impl RoutingThresholds {
    pub fn new(minimum_score: u8, high_value_score: u8) -> Self {
        Self {
            minimum_score,
            high_value_score,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.high_value_score > 100 || self.minimum_score > 100 {
            return Err("thresholds must lie within 0..=100".to_string());
        }
        if self.minimum_score > self.high_value_score {
            return Err(format!(
                "minimum score {} exceeds high-value score {}",
                self.minimum_score, self.high_value_score
            ));
        }
        Ok(())
    }
}

impl Default for RoutingThresholds {
    fn default() -> Self {
        Self::new(DEFAULT_MINIMUM_SCORE, DEFAULT_HIGH_VALUE_SCORE)
    }
}
