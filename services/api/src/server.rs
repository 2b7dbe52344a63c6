use crate::cli::ServeArgs;
use crate::infra::{AppState, HeuristicAnalyzer, LoggingNotifier};
use crate::routes::with_case_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use spi_flow::config::AppConfig;
use spi_flow::error::AppError;
use spi_flow::telemetry;
use spi_flow::workflows::cases::{CaseService, MemoryCaseStore};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryCaseStore::default());
    let notifier = Arc::new(LoggingNotifier::default());
    let case_service = Arc::new(CaseService::new(
        store,
        notifier,
        Arc::new(HeuristicAnalyzer::default()),
        config.engine.clone(),
    ));

    let app = with_case_routes(case_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        deadline_days = config.engine.pricing.deadline_window_days,
        "case lifecycle engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
