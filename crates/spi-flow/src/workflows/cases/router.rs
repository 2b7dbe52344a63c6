use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::catalog::ServiceCode;
use super::documents::{FileRef, ReviewDecision};
use super::domain::{CaseId, CompanyId, DocumentId, NewCase, PaymentKind, Principal, Role, Stage, UserId};
use super::error::CaseError;
use super::repository::{CaseFilter, CaseRepository, NotificationPublisher};
use super::service::CaseService;

pub const PRINCIPAL_ID_HEADER: &str = "x-principal-id";
pub const PRINCIPAL_ROLE_HEADER: &str = "x-principal-role";
pub const PRINCIPAL_COMPANY_HEADER: &str = "x-principal-company";

/// Router builder exposing the case workflow over HTTP.
pub fn case_router<R, N>(service: Arc<CaseService<R, N>>) -> Router
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/cases",
            post(open_case_handler::<R, N>).get(list_cases_handler::<R, N>),
        )
        .route("/api/v1/cases/:case_id", get(case_handler::<R, N>))
        .route(
            "/api/v1/cases/:case_id/advance",
            post(advance_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/payments",
            post(payment_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/closing-amount",
            get(closing_amount_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/assignments",
            post(assign_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/assignments/:user_id",
            delete(unassign_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/comments",
            post(comment_handler::<R, N>),
        )
        .route(
            "/api/v1/cases/:case_id/documents",
            get(documents_handler::<R, N>),
        )
        .route("/api/v1/cases/:case_id/audit", get(audit_handler::<R, N>))
        .route(
            "/api/v1/documents/:document_id/submit",
            post(submit_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/replace",
            post(replace_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/review",
            post(review_handler::<R, N>),
        )
        .route(
            "/api/v1/documents/:document_id/analysis",
            post(analysis_handler::<R, N>),
        )
        .route("/api/v1/vault/:client_id", get(vault_handler::<R, N>))
        .route(
            "/api/v1/vault/:client_id/match",
            get(vault_match_handler::<R, N>),
        )
        .route(
            "/api/v1/vault/:client_id/reuse",
            post(vault_reuse_handler::<R, N>),
        )
        .route("/api/v1/dashboard", get(dashboard_handler::<R, N>))
        .with_state(service)
}

/// Principal forwarded by the authentication proxy.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        principal_from_headers(&parts.headers).map(Caller).map_err(|reason| {
            let payload = json!({ "error": reason });
            (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
        })
    }
}

fn principal_from_headers(headers: &HeaderMap) -> Result<Principal, String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    let id = header(PRINCIPAL_ID_HEADER).ok_or_else(|| format!("missing {PRINCIPAL_ID_HEADER}"))?;
    let raw_role =
        header(PRINCIPAL_ROLE_HEADER).ok_or_else(|| format!("missing {PRINCIPAL_ROLE_HEADER}"))?;
    let role = Role::parse(raw_role).ok_or_else(|| format!("unknown role {raw_role}"))?;
    Ok(Principal::new(id, role, header(PRINCIPAL_COMPANY_HEADER)))
}

fn respond<T: Serialize>(status: StatusCode, result: Result<T, CaseError>) -> Response {
    match result {
        Ok(body) => (status, Json(body)).into_response(),
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct OpenCaseRequest {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    pub title: String,
    pub service_code: ServiceCode,
    pub amount_base: u64,
}

pub(crate) async fn open_case_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Json(request): Json<OpenCaseRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let client_id = request
        .client_id
        .map(UserId)
        .unwrap_or_else(|| principal.id.clone());
    let new_case = NewCase {
        client_id,
        company_id: request.company_id.map(CompanyId),
        title: request.title,
        service_code: request.service_code,
        amount_base: request.amount_base,
    };
    respond(StatusCode::CREATED, service.open_case(&principal, new_case))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCasesQuery {
    pub client_id: Option<String>,
    pub company_id: Option<String>,
    pub stage: Option<Stage>,
}

pub(crate) async fn list_cases_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Query(query): Query<ListCasesQuery>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let filter = CaseFilter {
        client_id: query.client_id.map(UserId),
        company_id: query.company_id.map(CompanyId),
        stage: query.stage,
    };
    respond(StatusCode::OK, service.list_cases(&principal, filter))
}

pub(crate) async fn case_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.get_case(&principal, &CaseId(case_id)))
}

#[derive(Debug, Default, Deserialize)]
pub struct AdvanceRequest {
    #[serde(default)]
    pub expected_stage: Option<Stage>,
}

pub(crate) async fn advance_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
    request: Option<Json<AdvanceRequest>>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let case_id = CaseId(case_id);
    let expected = request.and_then(|Json(body)| body.expected_stage);
    let result = match expected {
        Some(stage) => service.advance_from(&principal, &case_id, stage),
        None => service.advance(&principal, &case_id),
    };
    respond(StatusCode::OK, result)
}

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub kind: PaymentKind,
}

/// Callback used by the payment integration, which authenticates as SPI staff.
pub(crate) async fn payment_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
    Json(request): Json<PaymentRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    if principal.role != Role::SpiAdmin {
        return CaseError::Authorization("only the payment integration confirms payments".to_string())
            .into_response();
    }
    respond(
        StatusCode::OK,
        service.confirm_payment(&CaseId(case_id), request.kind),
    )
}

pub(crate) async fn closing_amount_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.compute_closing_amount(&principal, &CaseId(case_id)),
    )
}

#[derive(Debug, Deserialize)]
pub struct AssignmentRequest {
    pub user_id: String,
}

pub(crate) async fn assign_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
    Json(request): Json<AssignmentRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.assign_user(&principal, &CaseId(case_id), UserId(request.user_id)),
    )
}

pub(crate) async fn unassign_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path((case_id, user_id)): Path<(String, String)>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.unassign_user(&principal, &CaseId(case_id), UserId(user_id)),
    )
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

pub(crate) async fn comment_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
    Json(request): Json<CommentRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let result = service
        .add_comment(&principal, &CaseId(case_id), &request.text)
        .map(|()| json!({ "recorded": true }));
    respond(StatusCode::CREATED, result)
}

pub(crate) async fn documents_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.list_documents(&principal, &CaseId(case_id)),
    )
}

pub(crate) async fn audit_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(case_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(StatusCode::OK, service.audit_log(&principal, &CaseId(case_id)))
}

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub file_ref: String,
}

pub(crate) async fn submit_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(document_id): Path<String>,
    Json(request): Json<FileRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.submit_document(
            &principal,
            &DocumentId(document_id),
            FileRef(request.file_ref),
        ),
    )
}

pub(crate) async fn replace_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(document_id): Path<String>,
    Json(request): Json<FileRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.replace_document(
            &principal,
            &DocumentId(document_id),
            FileRef(request.file_ref),
        ),
    )
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub reason: Option<String>,
}

pub(crate) async fn review_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(document_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.review_document(
            &principal,
            &DocumentId(document_id),
            request.decision,
            request.reason.as_deref(),
        ),
    )
}

pub(crate) async fn analysis_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(document_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let document_id = DocumentId(document_id);
    let result = service
        .request_automated_analysis(&principal, &document_id)
        .await;
    respond(StatusCode::OK, result)
}

pub(crate) async fn vault_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(client_id): Path<String>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.vault_entries(&principal, &UserId(client_id)),
    )
}

#[derive(Debug, Deserialize)]
pub struct VaultMatchQuery {
    pub document_type: String,
}

pub(crate) async fn vault_match_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(client_id): Path<String>,
    Query(query): Query<VaultMatchQuery>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    match service.find_reusable(&principal, &UserId(client_id), &query.document_type) {
        Ok(Some(entry)) => (StatusCode::OK, Json(entry)).into_response(),
        Ok(None) => {
            let payload = json!({
                "document_type": query.document_type,
                "match": serde_json::Value::Null,
            });
            (StatusCode::NOT_FOUND, Json(payload)).into_response()
        }
        Err(error) => error.into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct VaultReuseRequest {
    pub document_type: String,
    pub case_id: String,
}

pub(crate) async fn vault_reuse_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
    Path(client_id): Path<String>,
    Json(request): Json<VaultReuseRequest>,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::CREATED,
        service.reuse_from_vault(
            &principal,
            &UserId(client_id),
            &request.document_type,
            &CaseId(request.case_id),
        ),
    )
}

pub(crate) async fn dashboard_handler<R, N>(
    State(service): State<Arc<CaseService<R, N>>>,
    Caller(principal): Caller,
) -> Response
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    respond(
        StatusCode::OK,
        service.dashboard(&principal).map(|report| report.summary()),
    )
}
