use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use super::assignment::AssignmentConfig;
use super::dispatch::{AutomationDispatcher, PendingAutomation};
use super::domain::{
    Assignment, CompanyId, Form, FormId, Lead, LeadId, LeadNote, LeadStatus, LeadSubmission, Principal,
    Question, QuestionId, QuestionKind, ResourceKind,
};
use super::export::{leads_to_csv, ExportError};
use super::intake::{IntakeGuard, IntakeViolation};
use super::quota::{Limit, LimitCheck, PlanCatalog, QuotaGuard};
use super::repository::{AlertPublisher, LeadRepository, RepositoryError};
use super::scoring::{evaluate, RoutingThresholds, RuleSet, ScoreResult};
use super::webhook::WebhookPublisher;
use crate::config::AutomationConfig;

/// Returned to the public submitter once the lead is stored and scored.
#[derive(Debug)]
pub struct IngestReceipt {
    pub lead_id: LeadId,
    pub score: ScoreResult,
    /// Status stored by routing; NEW when the status write failed.
    pub status: LeadStatus,
    pub automation: PendingAutomation,
}

/// Dashboard request for a new form.
#[derive(Debug, Clone, Deserialize)]
pub struct NewForm {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewQuestion {
    #[serde(default)]
    pub id: Option<QuestionId>,
    pub label: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Vec<String>,
}

/// Service composing intake validation, quota enforcement, scoring and automation.
pub struct LeadIntakeService<R, A, W> {
    guard: Arc<IntakeGuard>,
    quota: Arc<QuotaGuard>,
    repository: Arc<R>,
    dispatcher: Arc<AutomationDispatcher<R, A, W>>,
}

impl<R, A, W> LeadIntakeService<R, A, W>
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        alerts: Arc<A>,
        webhooks: Arc<W>,
        automation: AutomationConfig,
    ) -> Self {
        Self::with_policies(
            repository,
            alerts,
            webhooks,
            automation,
            PlanCatalog::default(),
            AssignmentConfig::default(),
        )
    }

    pub fn with_policies(
        repository: Arc<R>,
        alerts: Arc<A>,
        webhooks: Arc<W>,
        automation: AutomationConfig,
        catalog: PlanCatalog,
        assignment: AssignmentConfig,
    ) -> Self {
        let dispatcher = Arc::new(AutomationDispatcher::new(
            repository.clone(),
            alerts,
            webhooks,
            automation,
            assignment,
        ));

        Self {
            guard: Arc::new(IntakeGuard::default()),
            quota: Arc::new(QuotaGuard::with_catalog(catalog)),
            repository,
            dispatcher,
        }
    }

    /// Accept a public submission: validate, enforce the lead quota, then store the scored
    /// lead in one write and apply its routing status. Alerts, webhooks and assignment run
    /// after the receipt is returned; their failures never fail the ingestion.
    pub fn ingest(
        &self,
        form_id: &FormId,
        submission: LeadSubmission,
    ) -> Result<IngestReceipt, LeadServiceError> {
        let form = self
            .repository
            .form(form_id)?
            .filter(|form| form.active)
            .ok_or_else(|| LeadServiceError::FormNotFound(form_id.clone()))?;

        let mut lead = self.guard.lead_from_submission(&form, submission)?;

        let company = self.repository.company(&form.company_id)?;
        let check = self
            .quota
            .evaluate(company.as_ref(), ResourceKind::Leads, || {
                self.repository.count(&form.company_id, ResourceKind::Leads)
            })?;
        if !check.can_create {
            return Err(LeadServiceError::QuotaExceeded {
                resource: ResourceKind::Leads,
                limit: check.limit,
                current: check.current,
            });
        }

        let score = evaluate(&form.scoring, &lead.answers);
        lead.score = Some(score.score);
        lead.breakdown = score.per_question.clone();

        let lead = self.repository.insert_lead(lead).map_err(|err| {
            error!(form_id = %form.id, error = %err, "unable to persist lead");
            err
        })?;

        info!(
            lead_id = %lead.id,
            company_id = %lead.company_id,
            score = score.score,
            "lead stored"
        );

        let lead_id = lead.id.clone();
        let (status, automation) = self.dispatcher.dispatch_detached(lead, form, company);

        Ok(IngestReceipt {
            lead_id,
            score,
            status: status.unwrap_or(LeadStatus::New),
            automation,
        })
    }

    pub fn check_limit(
        &self,
        principal: &Principal,
        resource: ResourceKind,
    ) -> Result<LimitCheck, LeadServiceError> {
        Ok(self
            .quota
            .check(self.repository.as_ref(), &principal.company_id, resource)?)
    }

    pub fn create_form(
        &self,
        principal: &Principal,
        request: NewForm,
    ) -> Result<Form, LeadServiceError> {
        let check = self.check_limit(principal, ResourceKind::Forms)?;
        if !check.can_create {
            return Err(LeadServiceError::QuotaExceeded {
                resource: ResourceKind::Forms,
                limit: check.limit,
                current: check.current,
            });
        }

        let name = request.name.trim().to_string();
        if name.chars().count() < 2 {
            return Err(LeadServiceError::InvalidForm(
                "form name must be at least 2 characters".to_string(),
            ));
        }
        if request.questions.is_empty() {
            return Err(LeadServiceError::InvalidForm(
                "a form needs at least one question".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut questions = Vec::with_capacity(request.questions.len());
        for (index, question) in request.questions.into_iter().enumerate() {
            let id = question
                .id
                .unwrap_or_else(|| QuestionId(format!("q{}", index + 1)));
            if !seen.insert(id.clone()) {
                return Err(LeadServiceError::InvalidForm(format!(
                    "duplicate question id {id}"
                )));
            }
            if question.kind.is_choice() && question.options.is_empty() {
                return Err(LeadServiceError::InvalidForm(format!(
                    "question {id} needs at least one option"
                )));
            }
            questions.push(Question {
                id,
                label: question.label,
                kind: question.kind,
                required: question.required,
                options: question.options,
            });
        }

        let slug = self.unique_slug(&principal.company_id, &name)?;
        let form = Form {
            id: FormId::generate(),
            company_id: principal.company_id.clone(),
            name,
            slug,
            description: request.description,
            questions,
            scoring: RuleSet::new(),
            routing: RoutingThresholds::default(),
            active: true,
            created_at: Utc::now(),
        };

        Ok(self.repository.insert_form(form)?)
    }

    fn unique_slug(&self, company: &CompanyId, name: &str) -> Result<String, LeadServiceError> {
        let base = slugify(name);
        let base = if base.is_empty() {
            "form".to_string()
        } else {
            base
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.repository.slug_exists(company, &candidate)? {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        Ok(candidate)
    }

    /// Replace the whole rule set of a form owned by the caller.
    pub fn replace_rules(
        &self,
        principal: &Principal,
        form_id: &FormId,
        rules: RuleSet,
    ) -> Result<Form, LeadServiceError> {
        let mut form = self.owned_form(principal, form_id)?;

        for (question, rule) in &rules {
            if form.question(question).is_none() {
                return Err(LeadServiceError::InvalidRule {
                    question: question.clone(),
                    reason: "question is not part of this form".to_string(),
                });
            }
            rule.validate()
                .map_err(|reason| LeadServiceError::InvalidRule {
                    question: question.clone(),
                    reason,
                })?;
        }

        form.scoring = rules;
        self.store_form(&form)?;
        info!(form_id = %form.id, rules = form.scoring.len(), "scoring rules replaced");
        Ok(form)
    }

    pub fn update_routing(
        &self,
        principal: &Principal,
        form_id: &FormId,
        thresholds: RoutingThresholds,
    ) -> Result<Form, LeadServiceError> {
        thresholds
            .validate()
            .map_err(LeadServiceError::InvalidThresholds)?;

        let mut form = self.owned_form(principal, form_id)?;
        form.routing = thresholds;
        self.store_form(&form)?;
        Ok(form)
    }

    /// Soft-deactivate; leads keep referencing the form.
    pub fn deactivate_form(
        &self,
        principal: &Principal,
        form_id: &FormId,
    ) -> Result<Form, LeadServiceError> {
        let mut form = self.owned_form(principal, form_id)?;
        form.active = false;
        self.store_form(&form)?;
        Ok(form)
    }

    fn owned_form(&self, principal: &Principal, form_id: &FormId) -> Result<Form, LeadServiceError> {
        self.repository
            .form(form_id)?
            .filter(|form| form.company_id == principal.company_id)
            .ok_or_else(|| LeadServiceError::FormNotFound(form_id.clone()))
    }

    fn store_form(&self, form: &Form) -> Result<(), LeadServiceError> {
        self.repository
            .save_form(form.clone())
            .map_err(|err| match err {
                RepositoryError::NotFound => LeadServiceError::FormNotFound(form.id.clone()),
                other => other.into(),
            })
    }

    pub fn lead(&self, principal: &Principal, lead_id: &LeadId) -> Result<Lead, LeadServiceError> {
        self.repository
            .lead(&principal.company_id, lead_id)?
            .ok_or_else(|| LeadServiceError::LeadNotFound(lead_id.clone()))
    }

    /// Manual dashboard transition. No status is terminal.
    pub fn transition(
        &self,
        principal: &Principal,
        lead_id: &LeadId,
        status: LeadStatus,
    ) -> Result<Lead, LeadServiceError> {
        if !status.is_manual_target() {
            return Err(LeadServiceError::InvalidTransition(status));
        }
        self.lead(principal, lead_id)?;
        self.repository
            .update_status(&principal.company_id, lead_id, status)?;
        self.lead(principal, lead_id)
    }

    pub fn add_note(
        &self,
        principal: &Principal,
        lead_id: &LeadId,
        content: &str,
    ) -> Result<Lead, LeadServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LeadServiceError::EmptyNote);
        }
        self.lead(principal, lead_id)?;
        self.repository.append_note(
            &principal.company_id,
            lead_id,
            LeadNote {
                author: principal.user_id.clone(),
                content: content.to_string(),
                created_at: Utc::now(),
            },
        )?;
        self.lead(principal, lead_id)
    }

    /// Re-run the evaluator against the form's current rules. Status is left as is.
    pub fn rescore(&self, principal: &Principal, lead_id: &LeadId) -> Result<Lead, LeadServiceError> {
        let lead = self.lead(principal, lead_id)?;
        let form = self
            .repository
            .form(&lead.form_id)?
            .ok_or_else(|| LeadServiceError::FormNotFound(lead.form_id.clone()))?;

        let score = evaluate(&form.scoring, &lead.answers);
        self.repository
            .record_score(&principal.company_id, lead_id, &score)?;
        self.lead(principal, lead_id)
    }

    /// Manual dashboard assignment. `None` or a blank name clears the assignee.
    pub fn assign(
        &self,
        principal: &Principal,
        lead_id: &LeadId,
        assignee: Option<&str>,
    ) -> Result<Lead, LeadServiceError> {
        let assignment = match assignee.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => Assignment {
                assignee: Some(name.to_string()),
                confidence: 0,
                reason: "manual".to_string(),
            },
            None => Assignment::unassigned("manual"),
        };

        self.lead(principal, lead_id)?;
        self.repository
            .update_assignment(&principal.company_id, lead_id, &assignment)?;
        self.lead(principal, lead_id)
    }

    pub fn mark_converted(
        &self,
        principal: &Principal,
        lead_id: &LeadId,
    ) -> Result<Lead, LeadServiceError> {
        self.lead(principal, lead_id)?;
        self.repository
            .mark_converted(&principal.company_id, lead_id)?;
        self.lead(principal, lead_id)
    }

    pub fn export_leads(&self, principal: &Principal) -> Result<String, LeadServiceError> {
        let leads = self.repository.leads_for_company(&principal.company_id)?;
        Ok(leads_to_csv(&leads)?)
    }
}

/// Lowercase ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Error raised by the lead service.
#[derive(Debug, thiserror::Error)]
pub enum LeadServiceError {
    #[error(transparent)]
    Intake(#[from] IntakeViolation),
    #[error("form {0} not found")]
    FormNotFound(FormId),
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),
    #[error("{resource} limit reached ({limit})")]
    QuotaExceeded {
        resource: ResourceKind,
        limit: Limit,
        current: u64,
    },
    #[error("invalid rule for question {question}: {reason}")]
    InvalidRule { question: QuestionId, reason: String },
    #[error("invalid routing thresholds: {0}")]
    InvalidThresholds(String),
    #[error("invalid form: {0}")]
    InvalidForm(String),
    #[error("status {0} cannot be set manually")]
    InvalidTransition(LeadStatus),
    #[error("note content required")]
    EmptyNote,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Export(#[from] ExportError),
}
