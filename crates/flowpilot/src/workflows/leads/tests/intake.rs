use serde_json::json;

use super::common::*;
use crate::workflows::leads::domain::{ContactFields, LeadStatus, QuestionId};
use crate::workflows::leads::intake::{IntakeGuard, IntakeViolation};

fn guard() -> IntakeGuard {
    IntakeGuard::default()
}

#[test]
fn builds_new_unscored_lead_from_submission() {
    let form = form();
    let lead = guard()
        .lead_from_submission(&form, submission("This is an urgent request"))
        .expect("valid submission");

    assert_eq!(lead.status, LeadStatus::New);
    assert_eq!(lead.score, None);
    assert_eq!(lead.company_id, form.company_id);
    assert_eq!(lead.form_id, form.id);
    assert_eq!(lead.source, FORM);
    assert_eq!(lead.contact.name.as_deref(), Some("Kari Nordmann"));
    assert_eq!(lead.contact.email.as_deref(), Some("kari@example.no"));
    assert_eq!(lead.contact.phone.as_deref(), Some("+4791234567"));
}

#[test]
fn explicit_contact_fields_win_over_inferred_ones() {
    let mut request = submission("urgent");
    request.contact = ContactFields {
        name: Some("  Ola Hansen ".to_string()),
        email: None,
        phone: Some("".to_string()),
    };
    request.source = Some("facebook".to_string());

    let lead = guard()
        .lead_from_submission(&form(), request)
        .expect("valid submission");

    assert_eq!(lead.contact.name.as_deref(), Some("Ola Hansen"));
    assert_eq!(lead.contact.email.as_deref(), Some("kari@example.no"));
    assert_eq!(lead.contact.phone.as_deref(), Some("+4791234567"));
    assert_eq!(lead.source, "facebook");
}

#[test]
fn rejects_answers_to_unknown_questions() {
    let mut request = submission("urgent");
    request
        .answers
        .insert(QuestionId::from("shoe_size"), json!("44"));

    let err = guard()
        .validate(&form(), &request)
        .expect_err("unknown question");
    assert!(matches!(err, IntakeViolation::UnknownQuestion { .. }));
    assert_eq!(err.field(), Some("shoe_size"));
}

#[test]
fn rejects_blank_required_answer() {
    let err = guard()
        .validate(&form(), &submission("   "))
        .expect_err("blank required answer");
    assert!(matches!(err, IntakeViolation::MissingRequiredAnswer { .. }));
    assert_eq!(err.field(), Some("q1"));
}

#[test]
fn rejects_overlong_answers() {
    let err = guard()
        .validate(&form(), &submission(&"a".repeat(5001)))
        .expect_err("answer too long");
    assert!(matches!(err, IntakeViolation::AnswerTooLong { max: 5000, .. }));

    assert!(guard()
        .validate(&form(), &submission(&"a".repeat(5000)))
        .is_ok());
}

#[test]
fn rejects_non_numeric_number_answers() {
    let mut request = submission("urgent");
    request
        .answers
        .insert(QuestionId::from("budget"), json!("a lot"));

    let err = guard().validate(&form(), &request).expect_err("not a number");
    assert!(matches!(err, IntakeViolation::InvalidNumber { .. }));
}

#[test]
fn rejects_choices_outside_the_option_list() {
    let mut request = submission("urgent");
    request
        .answers
        .insert(QuestionId::from("city"), json!("Trondheim"));

    let err = guard().validate(&form(), &request).expect_err("bad option");
    match err {
        IntakeViolation::InvalidOption { value, .. } => assert_eq!(value, "Trondheim"),
        other => panic!("unexpected violation: {other:?}"),
    }

    request.answers.insert(QuestionId::from("city"), json!("Oslo"));
    assert!(guard().validate(&form(), &request).is_ok());
}

#[test]
fn rejects_object_answers_and_bad_explicit_email() {
    let mut request = submission("urgent");
    request
        .answers
        .insert(QuestionId::from("name"), json!({ "first": "Kari" }));
    let err = guard().validate(&form(), &request).expect_err("object answer");
    assert!(matches!(err, IntakeViolation::UnsupportedAnswer { .. }));

    let mut request = submission("urgent");
    request.contact.email = Some("kari.example.no".to_string());
    let err = guard().validate(&form(), &request).expect_err("bad email");
    assert!(matches!(err, IntakeViolation::InvalidEmail));
    assert_eq!(err.field(), Some("customerEmail"));
}
