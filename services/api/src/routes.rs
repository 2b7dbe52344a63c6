use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use serde::Serialize;
use serde_json::json;
use spi_flow::workflows::cases::{
    case_router, CaseRepository, CaseService, DocumentTemplate, NotificationPublisher,
    ServiceArea, ServiceCatalog, ServiceCode,
};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub(crate) struct CatalogEntry {
    pub(crate) code: ServiceCode,
    pub(crate) label: &'static str,
    pub(crate) area: ServiceArea,
    pub(crate) area_label: &'static str,
    pub(crate) documents: Vec<CatalogDocument>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CatalogDocument {
    #[serde(flatten)]
    pub(crate) template: DocumentTemplate,
    pub(crate) kind_label: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) vault_retention_days: Option<i64>,
}

pub(crate) fn with_case_routes<R, N>(service: Arc<CaseService<R, N>>) -> axum::Router
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let catalog = Arc::new(catalog_entries(service.catalog()));
    case_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
        .route(
            "/api/v1/catalog",
            axum::routing::get(move || catalog_endpoint(catalog.clone())),
        )
}

pub(crate) fn catalog_entries(catalog: &ServiceCatalog) -> Vec<CatalogEntry> {
    ServiceCode::ordered()
        .into_iter()
        .map(|code| CatalogEntry {
            code,
            label: code.label(),
            area: code.area(),
            area_label: code.area().label(),
            documents: catalog
                .templates_for(code)
                .iter()
                .map(|template| CatalogDocument {
                    template: template.clone(),
                    kind_label: template.kind.label(),
                    vault_retention_days: catalog
                        .vault_retention(template.document_type)
                        .map(|window| window.num_days()),
                })
                .collect(),
        })
        .collect()
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

pub(crate) async fn catalog_endpoint(catalog: Arc<Vec<CatalogEntry>>) -> impl IntoResponse {
    Json(json!({ "services": catalog.as_ref() }))
}
