use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::domain::QuestionId;

/// Scoring rules keyed by the question they inspect.
pub type RuleSet = BTreeMap<QuestionId, ScoringRule>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    Exact,
    Contains,
    Range,
    Greater,
    Less,
}

/// Comparison payload as configured by the tenant; either a literal or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Number(f64),
    Text(String),
}

impl RuleValue {
    pub fn as_text(&self) -> String {
        match self {
            RuleValue::Number(number) => format_number(*number),
            RuleValue::Text(text) => text.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            RuleValue::Number(number) => Some(*number).filter(|value| value.is_finite()),
            RuleValue::Text(text) => parse_number(text),
        }
    }
}

/// A single per-question rule in the wire shape `{ type, value?|min?|max?, points }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringRule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RuleValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default)]
    pub points: i32,
}

impl ScoringRule {
    pub fn exact(value: &str, points: i32) -> Self {
        Self::with_value(RuleKind::Exact, RuleValue::Text(value.to_string()), points)
    }

    pub fn contains(value: &str, points: i32) -> Self {
        Self::with_value(RuleKind::Contains, RuleValue::Text(value.to_string()), points)
    }

    pub fn range(min: Option<f64>, max: Option<f64>, points: i32) -> Self {
        Self {
            kind: RuleKind::Range,
            value: None,
            min,
            max,
            points,
        }
    }

    pub fn greater(value: f64, points: i32) -> Self {
        Self::with_value(RuleKind::Greater, RuleValue::Number(value), points)
    }

    pub fn less(value: f64, points: i32) -> Self {
        Self::with_value(RuleKind::Less, RuleValue::Number(value), points)
    }

    fn with_value(kind: RuleKind, value: RuleValue, points: i32) -> Self {
        Self {
            kind,
            value: Some(value),
            min: None,
            max: None,
            points,
        }
    }

    /// Structural checks applied when a tenant replaces its rule set.
    pub fn validate(&self) -> Result<(), String> {
        match self.kind {
            RuleKind::Exact | RuleKind::Contains if self.value.is_none() => {
                Err("exact and contains rules need a value".to_string())
            }
            RuleKind::Range => {
                if [self.min, self.max]
                    .iter()
                    .flatten()
                    .any(|bound| !bound.is_finite())
                {
                    return Err("range bounds must be finite".to_string());
                }
                match (self.min, self.max) {
                    (Some(min), Some(max)) if min > max => {
                        Err(format!("range minimum {min} exceeds maximum {max}"))
                    }
                    _ => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Whether `answer` satisfies the rule. Blank answers never match.
    pub fn matches(&self, answer: Option<&Value>) -> bool {
        let Some(text) = answer.and_then(answer_text) else {
            return false;
        };

        match self.kind {
            RuleKind::Exact => self
                .value
                .as_ref()
                .is_some_and(|value| text.to_lowercase() == value.as_text().to_lowercase()),
            RuleKind::Contains => self.value.as_ref().is_some_and(|value| {
                text.to_lowercase()
                    .contains(&value.as_text().to_lowercase())
            }),
            RuleKind::Range => answer.and_then(answer_number).is_some_and(|number| {
                number >= self.min.unwrap_or(0.0) && number <= self.max.unwrap_or(f64::INFINITY)
            }),
            RuleKind::Greater => match (answer.and_then(answer_number), self.comparator(0.0)) {
                (Some(number), Some(bound)) => number > bound,
                _ => false,
            },
            RuleKind::Less => {
                match (answer.and_then(answer_number), self.comparator(f64::INFINITY)) {
                    (Some(number), Some(bound)) => number < bound,
                    _ => false,
                }
            }
        }
    }

    fn comparator(&self, default: f64) -> Option<f64> {
        match &self.value {
            Some(value) => value.as_number(),
            None => Some(default),
        }
    }
}

/// Text form of an answer, or `None` when the answer counts as blank.
pub fn answer_text(answer: &Value) -> Option<String> {
    match answer {
        Value::Null | Value::Object(_) => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Some(integer.to_string()),
            None => number.as_f64().map(format_number),
        },
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(answer_text).collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(","))
            }
        }
    }
}

/// Numeric reading of an answer; only JSON numbers and numeric strings qualify.
pub fn answer_number(answer: &Value) -> Option<f64> {
    match answer {
        Value::Number(number) => number.as_f64().filter(|value| value.is_finite()),
        Value::String(text) => parse_number(text),
        _ => None,
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn format_number(number: f64) -> String {
    format!("{number}")
}
