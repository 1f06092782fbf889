use std::collections::BTreeMap;
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::config::AutomationConfig;
use crate::workflows::leads::domain::{
    AnswerMap, Assignment, Company, CompanyId, ContactFields, Form, FormId, Lead, LeadId,
    LeadNote, LeadStatus, LeadSubmission, Principal, Question, QuestionId, QuestionKind,
    ResourceKind,
};
use crate::workflows::leads::memory::InMemoryLeadRepository;
use crate::workflows::leads::repository::{
    AlertError, AlertPublisher, LeadAlert, LeadRepository, RepositoryError,
};
use crate::workflows::leads::scoring::{RoutingThresholds, RuleSet, ScoreResult, ScoringRule};
use crate::workflows::leads::service::LeadIntakeService;
use crate::workflows::leads::webhook::{WebhookError, WebhookPayload, WebhookPublisher};

pub(super) const COMPANY: &str = "acme";
pub(super) const FORM: &str = "form-moving";

pub(super) fn principal() -> Principal {
    Principal {
        company_id: CompanyId::from(COMPANY),
        user_id: Some("dispatcher@acme.test".to_string()),
    }
}

pub(super) fn company(plan: Option<&str>) -> Company {
    Company {
        id: CompanyId::from(COMPANY),
        name: "Acme Movers".to_string(),
        plan: plan.map(str::to_string),
        owner_email: Some("owner@acme.test".to_string()),
        webhook_url: Some("https://hooks.acme.test/leads".to_string()),
    }
}

fn question(id: &str, label: &str, kind: QuestionKind, required: bool) -> Question {
    Question {
        id: QuestionId::from(id),
        label: label.to_string(),
        kind,
        required,
        options: Vec::new(),
    }
}

pub(super) fn urgent_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.insert(QuestionId::from("q1"), ScoringRule::contains("urgent", 50));
    rules
}

pub(super) fn form() -> Form {
    let mut city = question("city", "Moving from", QuestionKind::SingleSelect, false);
    city.options = vec!["Oslo".to_string(), "Bergen".to_string()];

    Form {
        id: FormId::from(FORM),
        company_id: CompanyId::from(COMPANY),
        name: "Moving quote".to_string(),
        slug: "moving-quote".to_string(),
        description: None,
        questions: vec![
            question("name", "Your name", QuestionKind::ShortText, false),
            question("q1", "What do you need?", QuestionKind::LongText, true),
            question("email", "Email", QuestionKind::Email, false),
            question("phone", "Phone", QuestionKind::Phone, false),
            question("budget", "Budget", QuestionKind::Number, false),
            city,
        ],
        scoring: urgent_rules(),
        routing: RoutingThresholds::new(40, 70),
        active: true,
        created_at: Utc::now(),
    }
}

pub(super) fn answers(pairs: &[(&str, Value)]) -> AnswerMap {
    pairs
        .iter()
        .map(|(id, value)| (QuestionId::from(*id), value.clone()))
        .collect()
}

pub(super) fn submission(need: &str) -> LeadSubmission {
    LeadSubmission {
        answers: answers(&[
            ("name", json!("Kari Nordmann")),
            ("q1", json!(need)),
            ("email", json!("kari@example.no")),
            ("phone", json!("+4791234567")),
        ]),
        contact: ContactFields::default(),
        source: None,
    }
}

/// A lead already stored for `assignee`, used to build assignment history.
pub(super) fn historical_lead(
    id: &str,
    assignee: &str,
    score: u8,
    source: &str,
    converted: bool,
) -> Lead {
    Lead {
        id: LeadId::from(id),
        company_id: CompanyId::from(COMPANY),
        form_id: FormId::from(FORM),
        contact: ContactFields::default(),
        answers: AnswerMap::new(),
        source: source.to_string(),
        score: Some(score),
        breakdown: BTreeMap::new(),
        status: LeadStatus::Accepted,
        assignment: Some(Assignment {
            assignee: Some(assignee.to_string()),
            confidence: 50,
            reason: "seeded".to_string(),
        }),
        notes: Vec::new(),
        converted,
        created_at: Utc::now() - Duration::days(7),
    }
}

pub(super) fn seeded_repository(plan: Option<&str>) -> Arc<InMemoryLeadRepository> {
    let repository = InMemoryLeadRepository::default();
    repository.upsert_company(company(plan));
    repository.insert_form(form()).expect("seed form");
    Arc::new(repository)
}

pub(super) type TestService =
    LeadIntakeService<InMemoryLeadRepository, RecordingAlerts, RecordingWebhooks>;

pub(super) fn build_service(
    plan: Option<&str>,
) -> (
    TestService,
    Arc<InMemoryLeadRepository>,
    Arc<RecordingAlerts>,
    Arc<RecordingWebhooks>,
) {
    let repository = seeded_repository(plan);
    let alerts = Arc::new(RecordingAlerts::default());
    let webhooks = Arc::new(RecordingWebhooks::default());
    let service = LeadIntakeService::new(
        repository.clone(),
        alerts.clone(),
        webhooks.clone(),
        AutomationConfig::default(),
    );
    (service, repository, alerts, webhooks)
}

#[derive(Default)]
pub(super) struct RecordingAlerts {
    events: Mutex<Vec<LeadAlert>>,
}

impl RecordingAlerts {
    pub(super) fn events(&self) -> Vec<LeadAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }
}

impl AlertPublisher for RecordingAlerts {
    fn publish(&self, alert: LeadAlert) -> Result<(), AlertError> {
        self.events.lock().expect("alert mutex poisoned").push(alert);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingWebhooks {
    deliveries: Mutex<Vec<(String, WebhookPayload)>>,
}

impl RecordingWebhooks {
    pub(super) fn deliveries(&self) -> Vec<(String, WebhookPayload)> {
        self.deliveries
            .lock()
            .expect("webhook mutex poisoned")
            .clone()
    }
}

impl WebhookPublisher for RecordingWebhooks {
    fn publish(&self, url: &str, payload: WebhookPayload) -> Result<(), WebhookError> {
        self.deliveries
            .lock()
            .expect("webhook mutex poisoned")
            .push((url.to_string(), payload));
        Ok(())
    }
}

/// Holds each alert until the test releases it.
pub(super) struct GatedAlerts {
    release: Mutex<mpsc::Receiver<()>>,
    delivered: Mutex<Vec<LeadAlert>>,
}

impl GatedAlerts {
    pub(super) fn new() -> (Self, mpsc::Sender<()>) {
        let (sender, receiver) = mpsc::channel();
        let alerts = Self {
            release: Mutex::new(receiver),
            delivered: Mutex::new(Vec::new()),
        };
        (alerts, sender)
    }

    pub(super) fn delivered(&self) -> usize {
        self.delivered.lock().expect("alert mutex poisoned").len()
    }
}

impl AlertPublisher for GatedAlerts {
    fn publish(&self, alert: LeadAlert) -> Result<(), AlertError> {
        self.release
            .lock()
            .expect("gate mutex poisoned")
            .recv_timeout(StdDuration::from_secs(5))
            .map_err(|_| AlertError::Transport("gate never opened".to_string()))?;
        self.delivered
            .lock()
            .expect("alert mutex poisoned")
            .push(alert);
        Ok(())
    }
}

pub(super) struct FailingAlerts;

impl AlertPublisher for FailingAlerts {
    fn publish(&self, _alert: LeadAlert) -> Result<(), AlertError> {
        Err(AlertError::Transport("smtp offline".to_string()))
    }
}

pub(super) struct FailingWebhooks;

impl WebhookPublisher for FailingWebhooks {
    fn publish(&self, _url: &str, _payload: WebhookPayload) -> Result<(), WebhookError> {
        Err(WebhookError::Transport("connection refused".to_string()))
    }
}

/// Store whose follow-up writes fail while lead inserts succeed.
pub(super) struct AutomationFaultRepository {
    pub(super) inner: InMemoryLeadRepository,
}

impl AutomationFaultRepository {
    pub(super) fn seeded() -> Self {
        let inner = InMemoryLeadRepository::default();
        inner.upsert_company(company(Some("pro")));
        inner.insert_form(form()).expect("seed form");
        Self { inner }
    }
}

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("replica offline".to_string())
}

impl LeadRepository for AutomationFaultRepository {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        self.inner.company(id)
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        self.inner.form(id)
    }

    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError> {
        self.inner.insert_form(form)
    }

    fn save_form(&self, form: Form) -> Result<(), RepositoryError> {
        self.inner.save_form(form)
    }

    fn slug_exists(&self, company: &CompanyId, slug: &str) -> Result<bool, RepositoryError> {
        self.inner.slug_exists(company, slug)
    }

    fn count(&self, company: &CompanyId, resource: ResourceKind) -> Result<u64, RepositoryError> {
        self.inner.count(company, resource)
    }

    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        self.inner.insert_lead(lead)
    }

    fn lead(&self, company: &CompanyId, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        self.inner.lead(company, id)
    }

    fn leads_for_company(&self, _company: &CompanyId) -> Result<Vec<Lead>, RepositoryError> {
        Err(offline())
    }

    fn record_score(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _score: &ScoreResult,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn update_status(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _status: LeadStatus,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn update_assignment(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _assignment: &Assignment,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn append_note(
        &self,
        company: &CompanyId,
        id: &LeadId,
        note: LeadNote,
    ) -> Result<(), RepositoryError> {
        self.inner.append_note(company, id, note)
    }

    fn mark_converted(&self, company: &CompanyId, id: &LeadId) -> Result<(), RepositoryError> {
        self.inner.mark_converted(company, id)
    }
}

/// Store that still serves a cached copy of the seeded form after the row is gone.
pub(super) struct StaleFormRepository {
    pub(super) inner: InMemoryLeadRepository,
}

impl StaleFormRepository {
    pub(super) fn seeded() -> Self {
        let inner = InMemoryLeadRepository::default();
        inner.upsert_company(company(Some("pro")));
        Self { inner }
    }
}

impl LeadRepository for StaleFormRepository {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        self.inner.company(id)
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Ok(Some(form()).filter(|form| &form.id == id))
    }

    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError> {
        self.inner.insert_form(form)
    }

    fn save_form(&self, form: Form) -> Result<(), RepositoryError> {
        self.inner.save_form(form)
    }

    fn slug_exists(&self, company: &CompanyId, slug: &str) -> Result<bool, RepositoryError> {
        self.inner.slug_exists(company, slug)
    }

    fn count(&self, company: &CompanyId, resource: ResourceKind) -> Result<u64, RepositoryError> {
        self.inner.count(company, resource)
    }

    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        self.inner.insert_lead(lead)
    }

    fn lead(&self, company: &CompanyId, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        self.inner.lead(company, id)
    }

    fn leads_for_company(&self, company: &CompanyId) -> Result<Vec<Lead>, RepositoryError> {
        self.inner.leads_for_company(company)
    }

    fn record_score(
        &self,
        company: &CompanyId,
        id: &LeadId,
        score: &ScoreResult,
    ) -> Result<(), RepositoryError> {
        self.inner.record_score(company, id, score)
    }

    fn update_status(
        &self,
        company: &CompanyId,
        id: &LeadId,
        status: LeadStatus,
    ) -> Result<(), RepositoryError> {
        self.inner.update_status(company, id, status)
    }

    fn update_assignment(
        &self,
        company: &CompanyId,
        id: &LeadId,
        assignment: &Assignment,
    ) -> Result<(), RepositoryError> {
        self.inner.update_assignment(company, id, assignment)
    }

    fn append_note(
        &self,
        company: &CompanyId,
        id: &LeadId,
        note: LeadNote,
    ) -> Result<(), RepositoryError> {
        self.inner.append_note(company, id, note)
    }

    fn mark_converted(&self, company: &CompanyId, id: &LeadId) -> Result<(), RepositoryError> {
        self.inner.mark_converted(company, id)
    }
}

/// Store that is down for every call.
pub(super) struct UnavailableRepository;

impl LeadRepository for UnavailableRepository {
    fn company(&self, _id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        Err(offline())
    }

    fn form(&self, _id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Err(offline())
    }

    fn insert_form(&self, _form: Form) -> Result<Form, RepositoryError> {
        Err(offline())
    }

    fn save_form(&self, _form: Form) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn slug_exists(&self, _company: &CompanyId, _slug: &str) -> Result<bool, RepositoryError> {
        Err(offline())
    }

    fn count(&self, _company: &CompanyId, _resource: ResourceKind) -> Result<u64, RepositoryError> {
        Err(offline())
    }

    fn insert_lead(&self, _lead: Lead) -> Result<Lead, RepositoryError> {
        Err(offline())
    }

    fn lead(&self, _company: &CompanyId, _id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Err(offline())
    }

    fn leads_for_company(&self, _company: &CompanyId) -> Result<Vec<Lead>, RepositoryError> {
        Err(offline())
    }

    fn record_score(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _score: &ScoreResult,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn update_status(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _status: LeadStatus,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn update_assignment(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _assignment: &Assignment,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn append_note(
        &self,
        _company: &CompanyId,
        _id: &LeadId,
        _note: LeadNote,
    ) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn mark_converted(&self, _company: &CompanyId, _id: &LeadId) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
