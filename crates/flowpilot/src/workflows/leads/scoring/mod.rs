//! Deterministic lead scoring against a form's rule set.
//!
//! Every configured rule contributes its points to the possible maximum whether or not the
//! question was answered; only matched rules contribute earned points.

mod config;
mod policy;
mod rules;

pub use config::RoutingThresholds;
pub use policy::{decide, RoutingDecision};
pub use rules::{answer_number, answer_text, RuleKind, RuleSet, RuleValue, ScoringRule};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{AnswerMap, QuestionId};

/// Earned versus possible points for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionScore {
    pub earned: i32,
    pub possible: i32,
    pub matched: bool,
}

/// Display band used by dashboards and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreBand {
    Red,
    Orange,
    Green,
}

impl ScoreBand {
    pub const fn for_score(score: u8) -> Self {
        if score >= 70 {
            ScoreBand::Green
        } else if score >= 40 {
            ScoreBand::Orange
        } else {
            ScoreBand::Red
        }
    }
}

/// Outcome of evaluating a rule set against one answer map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub score: u8,
    pub max_possible: i64,
    pub per_question: BTreeMap<QuestionId, QuestionScore>,
    pub band: ScoreBand,
}

impl ScoreResult {
    pub fn earned(&self) -> i64 {
        self.per_question
            .values()
            .map(|detail| i64::from(detail.earned))
            .sum()
    }
}

/// Score `answers` against `rules`. Pure; identical inputs always produce identical output.
pub fn evaluate(rules: &RuleSet, answers: &AnswerMap) -> ScoreResult {
    let mut per_question = BTreeMap::new();
    let mut total_earned: i64 = 0;
    let mut total_possible: i64 = 0;

    for (question_id, rule) in rules {
        let matched = rule.matches(answers.get(question_id));
        let earned = if matched { rule.points } else { 0 };

        total_possible += i64::from(rule.points);
        total_earned += i64::from(earned);

        per_question.insert(
            question_id.clone(),
            QuestionScore {
                earned,
                possible: rule.points,
                matched,
            },
        );
    }

    let score = percentage(total_earned, total_possible);

    ScoreResult {
        score,
        max_possible: total_possible,
        per_question,
        band: ScoreBand::for_score(score),
    }
}

// Half-up rounding, clamped because negative point values can push the ratio outside 0..=100.
fn percentage(earned: i64, possible: i64) -> u8 {
    if possible <= 0 {
        return 0;
    }
    let ratio = 100.0 * earned as f64 / possible as f64;
    (ratio + 0.5).floor().clamp(0.0, 100.0) as u8
}
