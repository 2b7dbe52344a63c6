use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::documents::FileRef;
use super::domain::DocumentId;

/// Reason recorded when the analyzer is not confident enough to validate a document.
pub const LOW_CONFIDENCE_REASON: &str =
    "No pudimos validar el documento con total confianza. Asegúrate de que la imagen no esté borrosa.";

/// What the engine hands to the external classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub document_id: DocumentId,
    pub expected_type: String,
    pub file_ref: FileRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub document_type: String,
    pub confidence: f32,
    #[serde(default)]
    pub extracted_fields: BTreeMap<String, String>,
    /// Expiry printed on the document, when the analyzer finds one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer unavailable: {0}")]
    Unavailable(String),
    #[error("analyzer timed out after {0:?}")]
    Timeout(Duration),
}

/// External content classifier.
#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisReport, AnalyzerError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPolicy {
    pub min_confidence: f32,
    /// Bound on a single analyzer round trip.
    pub timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for AnalysisPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

impl AnalysisPolicy {
    pub fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::Exponential {
            initial_delay: self.initial_backoff,
            max_delay: self.initial_backoff * 8,
            multiplier: 2.0,
        }
    }

    pub fn accepts(&self, report: &AnalysisReport) -> bool {
        report.confidence >= self.min_confidence
    }
}

/// Delay schedule between analyzer attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    None,
    Fixed {
        delay: Duration,
    },
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
        multiplier: f64,
    },
}

impl RetryStrategy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            RetryStrategy::None => Duration::ZERO,
            RetryStrategy::Fixed { delay } => *delay,
            RetryStrategy::Exponential {
                initial_delay,
                max_delay,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1) as i32;
                let delay = initial_delay.as_secs_f64() * multiplier.powi(exponent);
                Duration::from_secs_f64(delay.min(max_delay.as_secs_f64()))
            }
        }
    }
}

/// Calls the analyzer with a per-attempt timeout, retrying with backoff up to
/// `policy.max_attempts` times. Returns the last error once attempts are exhausted.
pub async fn analyze_with_retry(
    analyzer: &dyn ContentAnalyzer,
    request: &AnalysisRequest,
    policy: &AnalysisPolicy,
) -> Result<AnalysisReport, AnalyzerError> {
    let strategy = policy.retry_strategy();
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = match tokio::time::timeout(policy.timeout, analyzer.analyze(request.clone()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Timeout(policy.timeout)),
        };

        match outcome {
            Ok(report) => return Ok(report),
            Err(err) if attempt >= attempts => return Err(err),
            Err(err) => {
                let delay = strategy.delay_for_attempt(attempt);
                warn!(
                    document_id = %request.document_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "document analysis failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
