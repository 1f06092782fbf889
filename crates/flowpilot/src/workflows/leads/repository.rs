use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Assignment, Company, CompanyId, Form, FormId, Lead, LeadId, LeadNote, LeadStatus,
    ResourceKind,
};
use super::scoring::ScoreResult;

/// Storage contract required by the lead engine. Every lead operation is scoped by tenant,
/// and each update method is a single write so concurrent automation runs cannot lose updates.
pub trait LeadRepository: Send + Sync {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError>;
    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError>;
    fn save_form(&self, form: Form) -> Result<(), RepositoryError>;
    fn slug_exists(&self, company: &CompanyId, slug: &str) -> Result<bool, RepositoryError>;

    fn count(&self, company: &CompanyId, resource: ResourceKind) -> Result<u64, RepositoryError>;

    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError>;
    fn lead(&self, company: &CompanyId, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn leads_for_company(&self, company: &CompanyId) -> Result<Vec<Lead>, RepositoryError>;

    fn record_score(
        &self,
        company: &CompanyId,
        id: &LeadId,
        score: &ScoreResult,
    ) -> Result<(), RepositoryError>;
    fn update_status(
        &self,
        company: &CompanyId,
        id: &LeadId,
        status: LeadStatus,
    ) -> Result<(), RepositoryError>;
    fn update_assignment(
        &self,
        company: &CompanyId,
        id: &LeadId,
        assignment: &Assignment,
    ) -> Result<(), RepositoryError>;
    fn append_note(
        &self,
        company: &CompanyId,
        id: &LeadId,
        note: LeadNote,
    ) -> Result<(), RepositoryError>;
    fn mark_converted(&self, company: &CompanyId, id: &LeadId) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound owner notification hook (e-mail, chat, ...).
pub trait AlertPublisher: Send + Sync {
    fn publish(&self, alert: LeadAlert) -> Result<(), AlertError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadAlert {
    pub template: String,
    pub recipient: String,
    pub company_id: CompanyId,
    pub lead_id: LeadId,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert transport unavailable: {0}")]
    Transport(String),
}
