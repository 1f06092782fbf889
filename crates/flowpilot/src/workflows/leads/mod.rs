//! Lead intake workflow: validate a public form submission, enforce plan limits, persist and
//! score the lead, then run best-effort automation (routing status, salesman assignment,
//! owner alert, outbound webhook). Dashboard operations manage forms and leads per tenant.

pub mod assignment;
pub mod contact;
pub mod dispatch;
pub mod domain;
pub mod export;
pub mod intake;
pub mod memory;
pub mod quota;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
pub mod webhook;

#[cfg(test)]
mod tests;

pub use dispatch::{AutomationDispatcher, DispatchReport, PendingAutomation, StepOutcome};
pub use domain::{
    Company, CompanyId, ContactFields, Form, FormId, Lead, LeadId, LeadStatus, LeadSubmission,
    Principal, Question, QuestionId, QuestionKind, ResourceKind,
};
pub use memory::{Fixtures, InMemoryLeadRepository};
pub use repository::{AlertError, AlertPublisher, LeadAlert, LeadRepository, RepositoryError};
pub use router::lead_router;
pub use scoring::{evaluate, RoutingThresholds, RuleSet, ScoreResult, ScoringRule};
pub use service::{IngestReceipt, LeadIntakeService, LeadServiceError, NewForm, NewQuestion};
pub use webhook::{HttpWebhookPublisher, WebhookError, WebhookPayload, WebhookPublisher};
