use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::assignment::{AssignmentConfig, AssignmentHeuristic};
use super::domain::{Assignment, Company, Form, Lead, LeadStatus};
use super::repository::{AlertPublisher, LeadAlert, LeadRepository};
use super::scoring::{decide, RoutingDecision};
use super::webhook::{WebhookPayload, WebhookPublisher};
use crate::config::AutomationConfig;

/// Result of one automation phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// What automation managed to do for a lead. Failures are recorded here and logged,
/// never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub decision: RoutingDecision,
    /// Status actually stored; `None` when the status write failed.
    pub status: Option<LeadStatus>,
    pub assignment: Assignment,
    pub alert: StepOutcome,
    pub webhook: StepOutcome,
}

/// Follow-up automation for an ingested lead. Runs on the blocking pool when a runtime is
/// available so the submitter never waits on alert or webhook transports.
#[derive(Debug)]
pub enum PendingAutomation {
    Finished(DispatchReport),
    Running(JoinHandle<DispatchReport>),
}

impl PendingAutomation {
    /// Report of a run that completed inline.
    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            PendingAutomation::Finished(report) => Some(report),
            PendingAutomation::Running(_) => None,
        }
    }

    /// Wait for the follow-up steps. `None` when the task was cancelled or panicked.
    pub async fn finished(self) -> Option<DispatchReport> {
        match self {
            PendingAutomation::Finished(report) => Some(report),
            PendingAutomation::Running(task) => match task.await {
                Ok(report) => Some(report),
                Err(err) => {
                    warn!(error = %err, "lead automation task aborted");
                    None
                }
            },
        }
    }
}

/// Applies routing, assignment and notifications to freshly scored leads.
pub struct AutomationDispatcher<R, A, W> {
    repository: Arc<R>,
    alerts: Arc<A>,
    webhooks: Arc<W>,
    heuristic: AssignmentHeuristic,
    settings: AutomationConfig,
}

impl<R, A, W> AutomationDispatcher<R, A, W>
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        alerts: Arc<A>,
        webhooks: Arc<W>,
        settings: AutomationConfig,
        assignment: AssignmentConfig,
    ) -> Self {
        Self {
            repository,
            alerts,
            webhooks,
            heuristic: AssignmentHeuristic::new(assignment),
            settings,
        }
    }

    /// Run every step inline.
    pub fn dispatch(&self, lead: &Lead, form: &Form, company: Option<&Company>) -> DispatchReport {
        let (decision, status) = self.route(lead, form);
        self.follow_up(lead, form, company, decision, status)
    }

    /// Store the automatic status, then hand alert, webhook and assignment to the blocking
    /// pool. Without a runtime the follow-up runs inline.
    pub fn dispatch_detached(
        self: &Arc<Self>,
        lead: Lead,
        form: Form,
        company: Option<Company>,
    ) -> (Option<LeadStatus>, PendingAutomation) {
        let (decision, status) = self.route(&lead, &form);

        let Ok(handle) = Handle::try_current() else {
            let report = self.follow_up(&lead, &form, company.as_ref(), decision, status);
            return (status, PendingAutomation::Finished(report));
        };

        let dispatcher = Arc::clone(self);
        let task = handle.spawn_blocking(move || {
            dispatcher.follow_up(&lead, &form, company.as_ref(), decision, status)
        });
        (status, PendingAutomation::Running(task))
    }

    /// Decide and store the automatic status. `None` when the write failed.
    pub fn route(&self, lead: &Lead, form: &Form) -> (RoutingDecision, Option<LeadStatus>) {
        let decision = decide(lead.score.unwrap_or(0), &form.routing);
        let target = decision.status();

        let status = match self
            .repository
            .update_status(&lead.company_id, &lead.id, target)
        {
            Ok(()) => Some(target),
            Err(err) => {
                warn!(lead_id = %lead.id, error = %err, "unable to store automatic status");
                None
            }
        };
        (decision, status)
    }

    fn follow_up(
        &self,
        lead: &Lead,
        form: &Form,
        company: Option<&Company>,
        decision: RoutingDecision,
        status: Option<LeadStatus>,
    ) -> DispatchReport {
        let score = lead.score.unwrap_or(0);
        let assignment = self.assign(lead);
        let alert = self.alert_owner(lead, form, company, decision);
        let webhook = self.post_webhook(lead, company, status.unwrap_or(lead.status));

        info!(
            lead_id = %lead.id,
            company_id = %lead.company_id,
            score,
            decision = ?decision,
            reason = %decision.summary(score, &form.routing),
            assignee = assignment.assignee.as_deref().unwrap_or("unassigned"),
            "lead automation finished"
        );

        DispatchReport {
            decision,
            status,
            assignment,
            alert,
            webhook,
        }
    }

    fn assign(&self, lead: &Lead) -> Assignment {
        let assignment = match self
            .heuristic
            .predict(self.repository.as_ref(), &lead.company_id, lead)
        {
            Ok(assignment) => assignment,
            Err(err) => {
                warn!(lead_id = %lead.id, error = %err, "assignment history unavailable");
                return Assignment::unassigned("Error calculating prediction");
            }
        };

        if let Err(err) =
            self.repository
                .update_assignment(&lead.company_id, &lead.id, &assignment)
        {
            warn!(lead_id = %lead.id, error = %err, "unable to store assignment");
        }
        assignment
    }

    fn alert_owner(
        &self,
        lead: &Lead,
        form: &Form,
        company: Option<&Company>,
        decision: RoutingDecision,
    ) -> StepOutcome {
        let Some(recipient) = company.and_then(|company| company.owner_email.clone()) else {
            return StepOutcome::Skipped("no owner email".to_string());
        };

        let mut details = BTreeMap::new();
        details.insert("form".to_string(), form.name.clone());
        details.insert(
            "name".to_string(),
            lead.contact.name.clone().unwrap_or_else(|| "Unknown".to_string()),
        );
        details.insert(
            "email".to_string(),
            lead.contact
                .email
                .clone()
                .unwrap_or_else(|| "No email provided".to_string()),
        );
        details.insert("score".to_string(), lead.score.unwrap_or(0).to_string());
        details.insert(
            "decision".to_string(),
            decision.status().label().to_ascii_lowercase(),
        );
        details.insert(
            "link".to_string(),
            self.settings.dashboard_link(lead.id.as_str()),
        );

        let alert = LeadAlert {
            template: "new_lead".to_string(),
            recipient,
            company_id: lead.company_id.clone(),
            lead_id: lead.id.clone(),
            details,
        };

        match self.alerts.publish(alert) {
            Ok(()) => StepOutcome::Completed,
            Err(err) => {
                warn!(lead_id = %lead.id, error = %err, "owner alert failed");
                StepOutcome::Failed(err.to_string())
            }
        }
    }

    fn post_webhook(
        &self,
        lead: &Lead,
        company: Option<&Company>,
        status: LeadStatus,
    ) -> StepOutcome {
        let url = company
            .and_then(|company| company.webhook_url.clone())
            .or_else(|| self.settings.webhook_url.clone());
        let Some(url) = url else {
            return StepOutcome::Skipped("no webhook configured".to_string());
        };

        let payload = WebhookPayload::from_lead(
            lead,
            status,
            self.settings.dashboard_link(lead.id.as_str()),
        );

        match self.webhooks.publish(&url, payload) {
            Ok(()) => StepOutcome::Completed,
            Err(err) => {
                warn!(lead_id = %lead.id, error = %err, "webhook dispatch failed");
                StepOutcome::Failed(err.to_string())
            }
        }
    }
}
