use std::sync::Arc;

use super::common::*;
use crate::config::AutomationConfig;
use crate::workflows::leads::assignment::AssignmentConfig;
use crate::workflows::leads::dispatch::{AutomationDispatcher, PendingAutomation, StepOutcome};
use crate::workflows::leads::domain::{CompanyId, Lead, LeadStatus};
use crate::workflows::leads::intake::IntakeGuard;
use crate::workflows::leads::memory::InMemoryLeadRepository;
use crate::workflows::leads::repository::LeadRepository;
use crate::workflows::leads::scoring::{evaluate, RoutingDecision};

fn stored_lead<R: LeadRepository>(repository: &R, need: &str) -> Lead {
    let form = form();
    let mut lead = IntakeGuard::default()
        .lead_from_submission(&form, submission(need))
        .expect("valid submission");
    let score = evaluate(&form.scoring, &lead.answers);
    lead.score = Some(score.score);
    lead.breakdown = score.per_question;
    repository.insert_lead(lead).expect("insert lead")
}

fn dispatcher<R, A, W>(
    repository: Arc<R>,
    alerts: Arc<A>,
    webhooks: Arc<W>,
) -> AutomationDispatcher<R, A, W>
where
    R: LeadRepository + 'static,
    A: crate::workflows::leads::repository::AlertPublisher + 'static,
    W: crate::workflows::leads::webhook::WebhookPublisher + 'static,
{
    AutomationDispatcher::new(
        repository,
        alerts,
        webhooks,
        AutomationConfig::default(),
        AssignmentConfig::default(),
    )
}

#[test]
fn high_value_lead_is_accepted_alerted_and_posted() {
    let repository = seeded_repository(Some("pro"));
    let alerts = Arc::new(RecordingAlerts::default());
    let webhooks = Arc::new(RecordingWebhooks::default());
    let lead = stored_lead(repository.as_ref(), "urgent move next week");

    let report = dispatcher(repository.clone(), alerts.clone(), webhooks.clone()).dispatch(
        &lead,
        &form(),
        Some(&company(Some("pro"))),
    );

    assert_eq!(report.decision, RoutingDecision::HighValue);
    assert_eq!(report.status, Some(LeadStatus::Accepted));
    assert_eq!(report.alert, StepOutcome::Completed);
    assert_eq!(report.webhook, StepOutcome::Completed);

    let stored = repository
        .lead(&CompanyId::from(COMPANY), &lead.id)
        .expect("store available")
        .expect("lead stored");
    assert_eq!(stored.status, LeadStatus::Accepted);
    assert_eq!(stored.assignment, Some(report.assignment.clone()));

    let events = alerts.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].template, "new_lead");
    assert_eq!(events[0].recipient, "owner@acme.test");
    assert_eq!(events[0].details["score"], "100");
    assert_eq!(
        events[0].details["link"],
        format!("http://localhost:3000/dashboard/leads/{}", lead.id)
    );

    let deliveries = webhooks.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].0, "https://hooks.acme.test/leads");
    assert_eq!(deliveries[0].1.status, LeadStatus::Accepted);
    assert_eq!(deliveries[0].1.score, Some(100));
    assert_eq!(deliveries[0].1.customer_email.as_deref(), Some("kari@example.no"));
}

#[test]
fn low_score_lead_is_rejected() {
    let repository = seeded_repository(Some("pro"));
    let lead = stored_lead(repository.as_ref(), "just curious");

    let report = dispatcher(
        repository.clone(),
        Arc::new(RecordingAlerts::default()),
        Arc::new(RecordingWebhooks::default()),
    )
    .dispatch(&lead, &form(), Some(&company(Some("pro"))));

    assert_eq!(report.decision, RoutingDecision::AutoRejected);
    assert_eq!(report.status, Some(LeadStatus::Rejected));
}

#[test]
fn missing_owner_email_and_webhook_are_skipped() {
    let repository = seeded_repository(Some("pro"));
    let webhooks = Arc::new(RecordingWebhooks::default());
    let lead = stored_lead(repository.as_ref(), "urgent");

    let mut quiet = company(Some("pro"));
    quiet.owner_email = None;
    quiet.webhook_url = None;

    let report = dispatcher(
        repository,
        Arc::new(RecordingAlerts::default()),
        webhooks.clone(),
    )
    .dispatch(&lead, &form(), Some(&quiet));

    assert!(matches!(report.alert, StepOutcome::Skipped(_)));
    assert!(matches!(report.webhook, StepOutcome::Skipped(_)));
    assert!(webhooks.deliveries().is_empty());
}

#[test]
fn configured_integration_url_is_used_when_tenant_has_none() {
    let repository = seeded_repository(Some("pro"));
    let webhooks = Arc::new(RecordingWebhooks::default());
    let lead = stored_lead(repository.as_ref(), "urgent");

    let mut tenant = company(Some("pro"));
    tenant.webhook_url = None;
    let settings = AutomationConfig {
        webhook_url: Some("https://integrations.test/flowpilot".to_string()),
        ..AutomationConfig::default()
    };

    let report = AutomationDispatcher::new(
        repository,
        Arc::new(RecordingAlerts::default()),
        webhooks.clone(),
        settings,
        AssignmentConfig::default(),
    )
    .dispatch(&lead, &form(), Some(&tenant));

    assert_eq!(report.webhook, StepOutcome::Completed);
    assert_eq!(
        webhooks.deliveries()[0].0,
        "https://integrations.test/flowpilot"
    );
}

#[test]
fn publisher_failures_are_recorded_not_raised() {
    let repository = seeded_repository(Some("pro"));
    let lead = stored_lead(repository.as_ref(), "urgent");

    let report = dispatcher(
        repository.clone(),
        Arc::new(FailingAlerts),
        Arc::new(FailingWebhooks),
    )
    .dispatch(&lead, &form(), Some(&company(Some("pro"))));

    assert!(report.alert.is_failed());
    assert!(report.webhook.is_failed());
    assert_eq!(report.status, Some(LeadStatus::Accepted));

    let stored = repository
        .lead(&CompanyId::from(COMPANY), &lead.id)
        .expect("store available")
        .expect("lead stored");
    assert_eq!(stored.score, Some(100));
}

#[test]
fn store_failures_during_automation_degrade_gracefully() {
    let repository = Arc::new(AutomationFaultRepository::seeded());
    let webhooks = Arc::new(RecordingWebhooks::default());
    let lead = stored_lead(repository.as_ref(), "urgent");

    let report = dispatcher(
        repository.clone(),
        Arc::new(RecordingAlerts::default()),
        webhooks.clone(),
    )
    .dispatch(&lead, &form(), Some(&company(Some("pro"))));

    assert_eq!(report.status, None);
    assert_eq!(report.assignment.assignee, None);
    assert_eq!(report.assignment.reason, "Error calculating prediction");
    assert_eq!(report.webhook, StepOutcome::Completed);
    // The webhook reports the status the lead actually has.
    assert_eq!(webhooks.deliveries()[0].1.status, LeadStatus::New);

    let stored = repository
        .inner
        .lead(&CompanyId::from(COMPANY), &lead.id)
        .expect("store available")
        .expect("lead stored");
    assert_eq!(stored.status, LeadStatus::New);
    assert_eq!(stored.score, Some(100));
}

#[test]
fn dispatch_assigns_from_history() {
    let repository: Arc<InMemoryLeadRepository> = seeded_repository(Some("pro"));
    repository
        .insert_lead(historical_lead("past-1", "anna", 95, FORM, true))
        .expect("seed history");
    let lead = stored_lead(repository.as_ref(), "urgent");

    let report = dispatcher(
        repository.clone(),
        Arc::new(RecordingAlerts::default()),
        Arc::new(RecordingWebhooks::default()),
    )
    .dispatch(&lead, &form(), Some(&company(Some("pro"))));

    assert_eq!(report.assignment.assignee.as_deref(), Some("anna"));
    assert_eq!(report.assignment.confidence, 100);
}

#[tokio::test]
async fn detached_dispatch_stores_status_before_follow_up_finishes() {
    let repository = seeded_repository(Some("pro"));
    let (alerts, release) = GatedAlerts::new();
    let alerts = Arc::new(alerts);
    let webhooks = Arc::new(RecordingWebhooks::default());
    let lead = stored_lead(repository.as_ref(), "urgent");

    let dispatcher = Arc::new(dispatcher(repository.clone(), alerts.clone(), webhooks.clone()));
    let (status, pending) =
        dispatcher.dispatch_detached(lead.clone(), form(), Some(company(Some("pro"))));

    assert_eq!(status, Some(LeadStatus::Accepted));
    assert!(matches!(pending, PendingAutomation::Running(_)));
    let stored = repository
        .lead(&CompanyId::from(COMPANY), &lead.id)
        .expect("store available")
        .expect("lead stored");
    assert_eq!(stored.status, LeadStatus::Accepted);
    assert_eq!(alerts.delivered(), 0);

    release.send(()).expect("gate open");
    let report = pending.finished().await.expect("automation completes");
    assert_eq!(report.alert, StepOutcome::Completed);
    assert_eq!(report.webhook, StepOutcome::Completed);
    assert_eq!(alerts.delivered(), 1);
    assert_eq!(webhooks.deliveries().len(), 1);
}

#[test]
fn detached_dispatch_runs_inline_without_runtime() {
    let repository = seeded_repository(Some("pro"));
    let lead = stored_lead(repository.as_ref(), "just curious");

    let dispatcher = Arc::new(dispatcher(
        repository,
        Arc::new(RecordingAlerts::default()),
        Arc::new(RecordingWebhooks::default()),
    ));
    let (status, pending) = dispatcher.dispatch_detached(lead, form(), None);

    assert_eq!(status, Some(LeadStatus::Rejected));
    let report = pending.report().expect("ran inline");
    assert!(matches!(report.alert, StepOutcome::Skipped(_)));
}
