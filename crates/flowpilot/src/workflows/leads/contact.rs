//! Best-effort contact extraction. Nothing here can fail or block intake.

use std::sync::OnceLock;

use regex::Regex;

use super::domain::{AnswerMap, ContactFields, Form, Question};
use super::scoring::answer_text;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email pattern")
    })
}

fn digit_run_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{8,}").expect("digit run pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\+?\d(?:[\s\-]?\d){7,}").expect("phone pattern"))
}

/// Pull an email address and phone number out of free text such as a chat transcript.
pub fn scan_message(text: &str) -> ContactFields {
    ContactFields {
        name: None,
        email: email_pattern()
            .find(text)
            .map(|found| found.as_str().to_string()),
        phone: phone_pattern()
            .find(text)
            .map(|found| found.as_str().trim().to_string()),
    }
}

/// Guess contact fields from answers, visiting them in the form's question order.
pub fn infer_contact(form: &Form, answers: &AnswerMap) -> ContactFields {
    let ordered = ordered_answers(form, answers);

    let email = ordered
        .iter()
        .find(|(_, text)| text.contains('@'))
        .map(|(_, text)| {
            email_pattern()
                .find(text)
                .map(|found| found.as_str().to_string())
                .unwrap_or_else(|| text.trim().to_string())
        });

    let phone = ordered
        .iter()
        .find(|(_, text)| digit_run_pattern().is_match(text))
        .map(|(_, text)| {
            if is_phone_shaped(text) {
                text.trim().to_string()
            } else {
                scan_message(text)
                    .phone
                    .unwrap_or_else(|| text.trim().to_string())
            }
        });

    let name = ordered
        .iter()
        .filter(|(question, _)| question.map_or(true, |q| q.kind.may_hold_name()))
        .find(|(_, text)| looks_like_name(text))
        .map(|(_, text)| text.trim().to_string());

    ContactFields { name, email, phone }
}

fn ordered_answers<'a>(
    form: &'a Form,
    answers: &'a AnswerMap,
) -> Vec<(Option<&'a Question>, String)> {
    let mut ordered: Vec<(Option<&Question>, String)> = form
        .questions
        .iter()
        .filter_map(|question| {
            answers
                .get(&question.id)
                .filter(|value| value.is_string())
                .and_then(answer_text)
                .map(|text| (Some(question), text))
        })
        .collect();

    ordered.extend(
        answers
            .iter()
            .filter(|(id, _)| form.question(id).is_none())
            .filter(|(_, value)| value.is_string())
            .filter_map(|(_, value)| answer_text(value).map(|text| (None, text))),
    );

    ordered
}

fn is_phone_shaped(text: &str) -> bool {
    text.trim()
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'))
}

fn looks_like_name(text: &str) -> bool {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if !(3..100).contains(&length) || trimmed.contains('@') {
        return false;
    }

    let mut chars = trimmed.chars();
    chars.next().is_some_and(char::is_alphabetic)
        && chars.all(|c| c.is_alphabetic() || matches!(c, ' ' | '.' | '\'' | '-'))
}
