use async_trait::async_trait;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::Value;
use spi_flow::workflows::cases::{
    AnalysisReport, AnalysisRequest, AnalyzerError, CaseNotification, ContentAnalyzer,
    NotificationPublisher, NotifyError, ServiceCode,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Notification sink that only logs. Stands in for the e-mail and push adapters.
#[derive(Default)]
pub(crate) struct LoggingNotifier {
    delivered: AtomicUsize,
}

impl LoggingNotifier {
    pub(crate) fn delivered(&self) -> usize {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl NotificationPublisher for LoggingNotifier {
    fn publish(&self, notification: CaseNotification) -> Result<(), NotifyError> {
        info!(
            template = %notification.template,
            case_id = %notification.case_id,
            details = ?notification.details,
            "notification dispatched"
        );
        self.delivered.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Offline classifier for local runs: trusts the declared type and scores by file name.
///
/// File references containing `blur` score below the acceptance threshold, `mismatch` reports
/// a different document type, and `offline` fails as an unreachable classifier would.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeuristicAnalyzer {
    pub(crate) confidence: f32,
}

impl Default for HeuristicAnalyzer {
    fn default() -> Self {
        Self { confidence: 0.92 }
    }
}

#[async_trait]
impl ContentAnalyzer for HeuristicAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalyzerError> {
        let file = request.file_ref.0.to_ascii_lowercase();
        if file.contains("offline") {
            return Err(AnalyzerError::Unavailable(
                "classifier endpoint refused the connection".to_string(),
            ));
        }

        let confidence = if file.contains("blur") {
            0.55
        } else {
            self.confidence
        };
        let document_type = if file.contains("mismatch") {
            "desconocido".to_string()
        } else {
            request.expected_type
        };

        Ok(AnalysisReport {
            document_type,
            confidence,
            extracted_fields: BTreeMap::from([(
                "source".to_string(),
                request.file_ref.0.clone(),
            )]),
            valid_until: None,
        })
    }
}

pub(crate) fn parse_service_code(raw: &str) -> Result<ServiceCode, String> {
    let normalized = raw.trim().to_ascii_uppercase().replace('-', "_");
    serde_json::from_value(Value::String(normalized)).map_err(|_| {
        let known: Vec<String> = ServiceCode::ordered()
            .into_iter()
            .filter_map(|code| serde_json::to_value(code).ok())
            .filter_map(|value| value.as_str().map(str::to_string))
            .collect();
        format!("unknown service code '{raw}' (expected one of {})", known.join(", "))
    })
}
