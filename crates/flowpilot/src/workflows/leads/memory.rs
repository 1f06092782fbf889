use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use serde::Deserialize;

use super::domain::{
    Assignment, Company, CompanyId, Form, FormId, Lead, LeadId, LeadNote, LeadStatus,
    ResourceKind,
};
use super::repository::{LeadRepository, RepositoryError};
use super::scoring::ScoreResult;

/// Seed data accepted by [`InMemoryLeadRepository::from_fixtures`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub companies: Vec<Company>,
    #[serde(default)]
    pub forms: Vec<Form>,
    #[serde(default)]
    pub leads: Vec<Lead>,
}

#[derive(Default)]
struct Tables {
    companies: HashMap<CompanyId, Company>,
    forms: HashMap<FormId, Form>,
    leads: HashMap<LeadId, Lead>,
}

/// Process-local store used by the API binary and the test suites.
#[derive(Default)]
pub struct InMemoryLeadRepository {
    tables: Mutex<Tables>,
}

impl InMemoryLeadRepository {
    pub fn from_fixtures(fixtures: Fixtures) -> Self {
        let repository = Self::default();
        {
            let mut tables = repository.lock();
            for company in fixtures.companies {
                tables.companies.insert(company.id.clone(), company);
            }
            for form in fixtures.forms {
                tables.forms.insert(form.id.clone(), form);
            }
            for lead in fixtures.leads {
                tables.leads.insert(lead.id.clone(), lead);
            }
        }
        repository
    }

    pub fn upsert_company(&self, company: Company) {
        self.lock().companies.insert(company.id.clone(), company);
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("repository mutex poisoned")
    }

    fn with_lead<T>(
        &self,
        company: &CompanyId,
        id: &LeadId,
        update: impl FnOnce(&mut Lead) -> T,
    ) -> Result<T, RepositoryError> {
        let mut tables = self.lock();
        match tables.leads.get_mut(id) {
            Some(lead) if &lead.company_id == company => Ok(update(lead)),
            _ => Err(RepositoryError::NotFound),
        }
    }
}

impl LeadRepository for InMemoryLeadRepository {
    fn company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        Ok(self.lock().companies.get(id).cloned())
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Ok(self.lock().forms.get(id).cloned())
    }

    fn insert_form(&self, form: Form) -> Result<Form, RepositoryError> {
        let mut tables = self.lock();
        if tables.forms.contains_key(&form.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.forms.insert(form.id.clone(), form.clone());
        Ok(form)
    }

    fn save_form(&self, form: Form) -> Result<(), RepositoryError> {
        let mut tables = self.lock();
        match tables.forms.get_mut(&form.id) {
            Some(existing) if existing.company_id == form.company_id => {
                *existing = form;
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }

    fn slug_exists(&self, company: &CompanyId, slug: &str) -> Result<bool, RepositoryError> {
        Ok(self
            .lock()
            .forms
            .values()
            .any(|form| &form.company_id == company && form.slug == slug))
    }

    fn count(&self, company: &CompanyId, resource: ResourceKind) -> Result<u64, RepositoryError> {
        let tables = self.lock();
        let count = match resource {
            ResourceKind::Leads => tables
                .leads
                .values()
                .filter(|lead| &lead.company_id == company)
                .count(),
            ResourceKind::Forms => tables
                .forms
                .values()
                .filter(|form| &form.company_id == company)
                .count(),
        };
        Ok(count as u64)
    }

    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut tables = self.lock();
        if tables.leads.contains_key(&lead.id) {
            return Err(RepositoryError::Conflict);
        }
        tables.leads.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    fn lead(&self, company: &CompanyId, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self
            .lock()
            .leads
            .get(id)
            .filter(|lead| &lead.company_id == company)
            .cloned())
    }

    fn leads_for_company(&self, company: &CompanyId) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .lock()
            .leads
            .values()
            .filter(|lead| &lead.company_id == company)
            .cloned()
            .collect())
    }

    fn record_score(
        &self,
        company: &CompanyId,
        id: &LeadId,
        score: &ScoreResult,
    ) -> Result<(), RepositoryError> {
        self.with_lead(company, id, |lead| {
            lead.score = Some(score.score);
            lead.breakdown = score.per_question.clone();
        })
    }

    fn update_status(
        &self,
        company: &CompanyId,
        id: &LeadId,
        status: LeadStatus,
    ) -> Result<(), RepositoryError> {
        self.with_lead(company, id, |lead| lead.status = status)
    }

    fn update_assignment(
        &self,
        company: &CompanyId,
        id: &LeadId,
        assignment: &Assignment,
    ) -> Result<(), RepositoryError> {
        self.with_lead(company, id, |lead| {
            lead.assignment = Some(assignment.clone())
        })
    }

    fn append_note(
        &self,
        company: &CompanyId,
        id: &LeadId,
        note: LeadNote,
    ) -> Result<(), RepositoryError> {
        self.with_lead(company, id, |lead| lead.notes.push(note))
    }

    fn mark_converted(&self, company: &CompanyId, id: &LeadId) -> Result<(), RepositoryError> {
        self.with_lead(company, id, |lead| lead.converted = true)
    }
}
