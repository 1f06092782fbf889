use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::domain::{
    AnswerMap, CompanyId, ContactFields, FormId, LeadId, LeadStatus, LeadSubmission, Principal,
    ResourceKind,
};
use super::repository::{AlertPublisher, LeadRepository, RepositoryError};
use super::scoring::{RoutingThresholds, RuleSet};
use super::service::{LeadIntakeService, LeadServiceError, NewForm};
use super::webhook::WebhookPublisher;

pub const COMPANY_HEADER: &str = "x-flowpilot-company";
pub const USER_HEADER: &str = "x-flowpilot-user";

type SharedService<R, A, W> = State<Arc<LeadIntakeService<R, A, W>>>;

/// Public intake plus tenant dashboard endpoints.
pub fn lead_router<R, A, W>(service: Arc<LeadIntakeService<R, A, W>>) -> Router
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    Router::new()
        .route("/api/v1/submissions", post(submit_handler::<R, A, W>))
        .route(
            "/api/v1/forms/:form_id/submissions",
            post(submit_to_form_handler::<R, A, W>),
        )
        .route("/api/v1/forms", post(create_form_handler::<R, A, W>))
        .route(
            "/api/v1/forms/:form_id/scoring",
            put(replace_rules_handler::<R, A, W>),
        )
        .route(
            "/api/v1/forms/:form_id/routing",
            put(update_routing_handler::<R, A, W>),
        )
        .route(
            "/api/v1/forms/:form_id/deactivate",
            post(deactivate_form_handler::<R, A, W>),
        )
        .route("/api/v1/leads/export", get(export_handler::<R, A, W>))
        .route("/api/v1/leads/:lead_id", get(lead_handler::<R, A, W>))
        .route(
            "/api/v1/leads/:lead_id/status",
            patch(transition_handler::<R, A, W>),
        )
        .route(
            "/api/v1/leads/:lead_id/assignee",
            patch(assign_handler::<R, A, W>),
        )
        .route(
            "/api/v1/leads/:lead_id/notes",
            post(add_note_handler::<R, A, W>),
        )
        .route(
            "/api/v1/leads/:lead_id/rescore",
            post(rescore_handler::<R, A, W>),
        )
        .route(
            "/api/v1/leads/:lead_id/convert",
            post(convert_handler::<R, A, W>),
        )
        .route("/api/v1/quota/:resource", get(quota_handler::<R, A, W>))
        .with_state(service)
}

/// Public submission body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    #[serde(default)]
    pub form_id: Option<FormId>,
    #[serde(default)]
    pub answers: AnswerMap,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl SubmissionRequest {
    fn into_submission(self) -> (Option<FormId>, LeadSubmission) {
        let submission = LeadSubmission {
            answers: self.answers,
            contact: ContactFields {
                name: self.customer_name,
                email: self.customer_email,
                phone: self.customer_phone,
            },
            source: self.source,
        };
        (self.form_id, submission)
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: LeadStatus,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    #[serde(default)]
    pub assignee: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub content: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).ok_or_else(|| {
            error_body(
                StatusCode::UNAUTHORIZED,
                "Unauthorized",
                "missing tenant credentials",
                None,
            )
        })
    }
}

fn principal_from_headers(headers: &HeaderMap) -> Option<Principal> {
    let header_text = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    let company_id = header_text(COMPANY_HEADER)?;
    Some(Principal {
        company_id: CompanyId(company_id),
        user_id: header_text(USER_HEADER),
    })
}

fn error_body(status: StatusCode, kind: &str, message: &str, extra: Option<(&str, Value)>) -> Response {
    let mut payload = json!({
        "error": message,
        "kind": kind,
    });
    if let (Some((key, value)), Some(object)) = (extra, payload.as_object_mut()) {
        object.insert(key.to_string(), value);
    }
    (status, Json(payload)).into_response()
}

fn rejection_response(rejection: JsonRejection) -> Response {
    error_body(
        StatusCode::BAD_REQUEST,
        "Validation",
        &rejection.body_text(),
        None,
    )
}

pub(crate) fn service_error_response(error: LeadServiceError) -> Response {
    let message = error.to_string();
    match &error {
        LeadServiceError::Intake(violation) => error_body(
            StatusCode::BAD_REQUEST,
            "Validation",
            &message,
            violation
                .field()
                .map(|field| ("field", Value::String(field.to_string()))),
        ),
        LeadServiceError::FormNotFound(_) => {
            error_body(StatusCode::NOT_FOUND, "FormNotFound", &message, None)
        }
        LeadServiceError::LeadNotFound(_)
        | LeadServiceError::Repository(RepositoryError::NotFound) => {
            error_body(StatusCode::NOT_FOUND, "LeadNotFound", &message, None)
        }
        LeadServiceError::QuotaExceeded { limit, .. } => error_body(
            StatusCode::FORBIDDEN,
            "QuotaExceeded",
            &message,
            Some(("limit", json!(limit))),
        ),
        LeadServiceError::InvalidRule { question, .. } => error_body(
            StatusCode::BAD_REQUEST,
            "Validation",
            &message,
            Some(("field", Value::String(question.to_string()))),
        ),
        LeadServiceError::InvalidThresholds(_)
        | LeadServiceError::InvalidForm(_)
        | LeadServiceError::InvalidTransition(_)
        | LeadServiceError::EmptyNote => {
            error_body(StatusCode::BAD_REQUEST, "Validation", &message, None)
        }
        LeadServiceError::Repository(RepositoryError::Conflict) => {
            error_body(StatusCode::CONFLICT, "Conflict", &message, None)
        }
        LeadServiceError::Repository(RepositoryError::Unavailable(_))
        | LeadServiceError::Export(_) => error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal",
            &message,
            None,
        ),
    }
}

fn respond<T: serde::Serialize>(status: StatusCode, result: Result<T, LeadServiceError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(err) => service_error_response(err),
    }
}

fn ingest<R, A, W>(
    service: &LeadIntakeService<R, A, W>,
    form_id: FormId,
    submission: LeadSubmission,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match service.ingest(&form_id, submission) {
        Ok(receipt) => {
            let payload = json!({
                "success": true,
                "leadId": receipt.lead_id,
                "score": receipt.score.score,
                "status": receipt.status,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn submit_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    body: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    let (form_id, submission) = request.into_submission();
    let Some(form_id) = form_id.filter(|id| !id.as_str().trim().is_empty()) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Validation",
            "formId is required",
            Some(("field", Value::String("formId".to_string()))),
        );
    };

    ingest(service.as_ref(), form_id, submission)
}

pub(crate) async fn submit_to_form_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    Path(form_id): Path<String>,
    body: Result<Json<SubmissionRequest>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(rejection),
    };

    let (_, submission) = request.into_submission();
    ingest(service.as_ref(), FormId(form_id), submission)
}

pub(crate) async fn create_form_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    body: Result<Json<NewForm>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(request)) => respond(
            StatusCode::CREATED,
            service.create_form(&principal, request),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn replace_rules_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(form_id): Path<String>,
    body: Result<Json<RuleSet>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(rules)) => respond(
            StatusCode::OK,
            service.replace_rules(&principal, &FormId(form_id), rules),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn update_routing_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(form_id): Path<String>,
    body: Result<Json<RoutingThresholds>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(thresholds)) => respond(
            StatusCode::OK,
            service.update_routing(&principal, &FormId(form_id), thresholds),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn deactivate_form_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(form_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.deactivate_form(&principal, &FormId(form_id)),
    )
}

pub(crate) async fn export_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match service.export_leads(&principal) {
        Ok(csv) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"leads.csv\""),
            ],
            csv,
        )
            .into_response(),
        Err(err) => service_error_response(err),
    }
}

pub(crate) async fn lead_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    respond(StatusCode::OK, service.lead(&principal, &LeadId(lead_id)))
}

pub(crate) async fn transition_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
    body: Result<Json<TransitionRequest>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(request)) => respond(
            StatusCode::OK,
            service.transition(&principal, &LeadId(lead_id), request.status),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn assign_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
    body: Result<Json<AssignRequest>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(request)) => respond(
            StatusCode::OK,
            service.assign(&principal, &LeadId(lead_id), request.assignee.as_deref()),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn add_note_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
    body: Result<Json<NoteRequest>, JsonRejection>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    match body {
        Ok(Json(request)) => respond(
            StatusCode::CREATED,
            service.add_note(&principal, &LeadId(lead_id), &request.content),
        ),
        Err(rejection) => rejection_response(rejection),
    }
}

pub(crate) async fn rescore_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    respond(StatusCode::OK, service.rescore(&principal, &LeadId(lead_id)))
}

pub(crate) async fn convert_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(lead_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.mark_converted(&principal, &LeadId(lead_id)),
    )
}

pub(crate) async fn quota_handler<R, A, W>(
    State(service): SharedService<R, A, W>,
    principal: Principal,
    Path(resource): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    A: AlertPublisher + 'static,
    W: WebhookPublisher + 'static,
{
    let resource = match resource.parse::<ResourceKind>() {
        Ok(resource) => resource,
        Err(message) => {
            return error_body(
                StatusCode::BAD_REQUEST,
                "Validation",
                &message,
                Some(("field", Value::String("resource".to_string()))),
            )
        }
    };
    respond(StatusCode::OK, service.check_limit(&principal, resource))
}
