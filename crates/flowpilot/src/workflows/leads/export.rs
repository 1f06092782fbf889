use serde::Serialize;

use super::domain::Lead;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("unable to flush csv writer: {0}")]
    Flush(String),
    #[error(transparent)]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[derive(Debug, Serialize)]
struct LeadRow<'a> {
    id: &'a str,
    created_at: String,
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    status: &'static str,
    score: Option<u8>,
    assignee: &'a str,
    confidence: Option<u8>,
    source: &'a str,
}

impl<'a> From<&'a Lead> for LeadRow<'a> {
    fn from(lead: &'a Lead) -> Self {
        Self {
            id: lead.id.as_str(),
            created_at: lead.created_at.to_rfc3339(),
            name: lead.contact.name.as_deref().unwrap_or_default(),
            email: lead.contact.email.as_deref().unwrap_or_default(),
            phone: lead.contact.phone.as_deref().unwrap_or_default(),
            status: lead.status.label(),
            score: lead.score,
            assignee: lead.assignee().unwrap_or_default(),
            confidence: lead.assignment.as_ref().map(|assignment| assignment.confidence),
            source: &lead.source,
        }
    }
}

/// Render leads as CSV, newest first.
pub fn leads_to_csv(leads: &[Lead]) -> Result<String, ExportError> {
    let mut ordered: Vec<&Lead> = leads.iter().collect();
    ordered.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut writer = csv::Writer::from_writer(Vec::new());
    for lead in ordered {
        writer.serialize(LeadRow::from(lead))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ExportError::Flush(err.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}
