use serde::{Deserialize, Serialize};

use super::super::domain::LeadStatus;
use super::config::RoutingThresholds;

/// Automatic routing verdict for a freshly scored lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingDecision {
    AutoRejected,
    HighValue,
    NeedsReview,
}

impl RoutingDecision {
    pub const fn status(self) -> LeadStatus {
        match self {
            RoutingDecision::AutoRejected => LeadStatus::Rejected,
            RoutingDecision::HighValue => LeadStatus::Accepted,
            RoutingDecision::NeedsReview => LeadStatus::Reviewed,
        }
    }

    pub fn summary(&self, score: u8, thresholds: &RoutingThresholds) -> String {
        match self {
            RoutingDecision::AutoRejected => format!(
                "score {score} below minimum {}",
                thresholds.minimum_score
            ),
            RoutingDecision::HighValue => format!(
                "score {score} above high-value threshold {}",
                thresholds.high_value_score
            ),
            RoutingDecision::NeedsReview => format!(
                "score {score} within review band {}..={}",
                thresholds.minimum_score, thresholds.high_value_score
            ),
        }
    }
}

pub fn decide(score: u8, thresholds: &RoutingThresholds) -> RoutingDecision {
    if score < thresholds.minimum_score {
        RoutingDecision::AutoRejected
    } else if score > thresholds.high_value_score {
        RoutingDecision::HighValue
    } else {
        RoutingDecision::NeedsReview
    }
}
