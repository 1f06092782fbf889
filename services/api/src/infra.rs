use flowpilot::error::AppError;
use flowpilot::workflows::leads::{AlertError, AlertPublisher, Fixtures, LeadAlert};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Owner alerts are logged; mail delivery is handled outside this service.
#[derive(Default, Clone)]
pub(crate) struct LoggingAlertPublisher {
    events: Arc<Mutex<Vec<LeadAlert>>>,
}

impl AlertPublisher for LoggingAlertPublisher {
    fn publish(&self, alert: LeadAlert) -> Result<(), AlertError> {
        info!(
            template = %alert.template,
            recipient = %alert.recipient,
            company_id = %alert.company_id,
            lead_id = %alert.lead_id,
            "owner alert queued"
        );
        let mut guard = self.events.lock().expect("alert mutex poisoned");
        guard.push(alert);
        Ok(())
    }
}

impl LoggingAlertPublisher {
    pub(crate) fn events(&self) -> Vec<LeadAlert> {
        self.events.lock().expect("alert mutex poisoned").clone()
    }
}

pub(crate) fn parse_fixtures(raw: &str) -> Result<Fixtures, AppError> {
    Ok(serde_json::from_str(raw)?)
}

pub(crate) fn load_fixtures(path: Option<&Path>) -> Result<Fixtures, AppError> {
    let Some(path) = path else {
        return Ok(Fixtures::default());
    };

    let raw = std::fs::read_to_string(path)?;
    let fixtures = parse_fixtures(&raw)?;
    info!(
        path = %path.display(),
        companies = fixtures.companies.len(),
        forms = fixtures.forms.len(),
        "fixtures loaded"
    );
    Ok(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot::workflows::leads::{CompanyId, LeadId};
    use std::collections::BTreeMap;

    #[test]
    fn parses_company_and_form_fixtures() {
        let fixtures = parse_fixtures(
            r#"{
                "companies": [{ "id": "acme", "name": "Acme", "plan": "pro" }],
                "forms": [{
                    "id": "form-1",
                    "company_id": "acme",
                    "name": "Quote",
                    "slug": "quote",
                    "questions": [{ "id": "q1", "label": "Need", "kind": "long_text", "required": true }],
                    "scoring": { "q1": { "type": "contains", "value": "urgent", "points": 50 } }
                }]
            }"#,
        )
        .expect("fixtures parse");

        assert_eq!(fixtures.companies[0].plan.as_deref(), Some("pro"));
        let form = &fixtures.forms[0];
        assert!(form.active);
        assert_eq!(form.routing.minimum_score, 40);
        assert_eq!(form.scoring.len(), 1);
    }

    #[test]
    fn rejects_malformed_fixtures() {
        assert!(matches!(
            parse_fixtures("{\"forms\": 3}"),
            Err(AppError::Fixture(_))
        ));
    }

    #[test]
    fn missing_fixture_path_yields_empty_store() {
        let fixtures = load_fixtures(None).expect("no file needed");
        assert!(fixtures.companies.is_empty());
        assert!(fixtures.forms.is_empty());
    }

    #[test]
    fn alert_publisher_records_alerts() {
        let publisher = LoggingAlertPublisher::default();
        publisher
            .publish(LeadAlert {
                template: "new_lead".to_string(),
                recipient: "owner@acme.test".to_string(),
                company_id: CompanyId::from("acme"),
                lead_id: LeadId::from("lead-1"),
                details: BTreeMap::new(),
            })
            .expect("logging never fails");
        assert_eq!(publisher.events().len(), 1);
    }
}
