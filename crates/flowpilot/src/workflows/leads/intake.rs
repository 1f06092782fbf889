use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use super::contact::infer_contact;
use super::domain::{
    Form, Lead, LeadId, LeadStatus, LeadSubmission, Question, QuestionId, QuestionKind,
};
use super::scoring::{answer_number, answer_text};

const DEFAULT_MAX_ANSWER_LENGTH: usize = 5000;

/// Validation errors raised before anything is persisted.
#[derive(Debug, thiserror::Error)]
pub enum IntakeViolation {
    #[error("question {question} is not part of this form")]
    UnknownQuestion { question: QuestionId },
    #[error("question {question} requires an answer")]
    MissingRequiredAnswer { question: QuestionId },
    #[error("answer to {question} exceeds {max} characters")]
    AnswerTooLong { question: QuestionId, max: usize },
    #[error("answer to {question} must be a number")]
    InvalidNumber { question: QuestionId },
    #[error("'{value}' is not an option for {question}")]
    InvalidOption { question: QuestionId, value: String },
    #[error("answer to {question} has an unsupported shape")]
    UnsupportedAnswer { question: QuestionId },
    #[error("customer email must contain '@'")]
    InvalidEmail,
}

impl IntakeViolation {
    /// Offending field for field-level error reporting.
    pub fn field(&self) -> Option<&str> {
        match self {
            IntakeViolation::UnknownQuestion { question }
            | IntakeViolation::MissingRequiredAnswer { question }
            | IntakeViolation::AnswerTooLong { question, .. }
            | IntakeViolation::InvalidNumber { question }
            | IntakeViolation::InvalidOption { question, .. }
            | IntakeViolation::UnsupportedAnswer { question } => Some(question.as_str()),
            IntakeViolation::InvalidEmail => Some("customerEmail"),
        }
    }
}

/// Turns raw public submissions into unsaved `NEW` leads.
#[derive(Debug, Clone)]
pub struct IntakeGuard {
    max_answer_length: usize,
}

impl Default for IntakeGuard {
    fn default() -> Self {
        Self::with_max_answer_length(DEFAULT_MAX_ANSWER_LENGTH)
    }
}

impl IntakeGuard {
    pub fn with_max_answer_length(max_answer_length: usize) -> Self {
        Self { max_answer_length }
    }

    pub fn validate(&self, form: &Form, submission: &LeadSubmission) -> Result<(), IntakeViolation> {
        for (question_id, value) in &submission.answers {
            let question =
                form.question(question_id)
                    .ok_or_else(|| IntakeViolation::UnknownQuestion {
                        question: question_id.clone(),
                    })?;
            self.validate_answer(question, value)?;
        }

        for question in form.questions.iter().filter(|question| question.required) {
            let answered = submission
                .answers
                .get(&question.id)
                .and_then(answer_text)
                .is_some();
            if !answered {
                return Err(IntakeViolation::MissingRequiredAnswer {
                    question: question.id.clone(),
                });
            }
        }

        if let Some(email) = submission.contact.email.as_deref() {
            if !email.trim().is_empty() && !email.contains('@') {
                return Err(IntakeViolation::InvalidEmail);
            }
        }

        Ok(())
    }

    fn validate_answer(&self, question: &Question, value: &Value) -> Result<(), IntakeViolation> {
        let id = || question.id.clone();

        if value.is_object() {
            return Err(IntakeViolation::UnsupportedAnswer { question: id() });
        }

        let Some(text) = answer_text(value) else {
            return Ok(());
        };

        if text.chars().count() > self.max_answer_length {
            return Err(IntakeViolation::AnswerTooLong {
                question: id(),
                max: self.max_answer_length,
            });
        }

        match question.kind {
            QuestionKind::Number if answer_number(value).is_none() => {
                Err(IntakeViolation::InvalidNumber { question: id() })
            }
            kind if kind.is_choice() && !question.options.is_empty() => {
                let chosen: Vec<String> = match value {
                    Value::Array(items) if kind == QuestionKind::MultiSelect => {
                        items.iter().filter_map(answer_text).collect()
                    }
                    Value::Array(_) => {
                        return Err(IntakeViolation::UnsupportedAnswer { question: id() })
                    }
                    _ => vec![text],
                };
                match chosen
                    .into_iter()
                    .find(|choice| !question.options.iter().any(|option| option == choice))
                {
                    Some(value) => Err(IntakeViolation::InvalidOption {
                        question: id(),
                        value,
                    }),
                    None => Ok(()),
                }
            }
            _ => Ok(()),
        }
    }

    /// Validate `submission` and build the lead row it becomes. Explicit contact fields win
    /// over inferred ones.
    pub fn lead_from_submission(
        &self,
        form: &Form,
        submission: LeadSubmission,
    ) -> Result<Lead, IntakeViolation> {
        self.validate(form, &submission)?;

        let LeadSubmission {
            answers,
            contact,
            source,
        } = submission;

        let mut contact = contact.normalized();
        if !contact.is_complete() {
            contact.fill_missing(infer_contact(form, &answers));
        }

        let source = source
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or_else(|| form.id.to_string());

        Ok(Lead {
            id: LeadId::generate(),
            company_id: form.company_id.clone(),
            form_id: form.id.clone(),
            contact,
            answers,
            source,
            score: None,
            breakdown: BTreeMap::new(),
            status: LeadStatus::New,
            assignment: None,
            notes: Vec::new(),
            converted: false,
            created_at: Utc::now(),
        })
    }
}
