//! Case service: the only entry point that mutates cases and documents.
//!
//! Every mutation follows the same shape: take the per-case lock, reload the records, check
//! the caller's capability, apply a pure transition, persist with an optimistic version
//! check, then append one audit event. The analyzer round trip in
//! [`CaseService::request_automated_analysis`] runs without any lock held.

mod documents;
mod queries;
mod stages;
mod vault;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use super::analysis::{AnalysisPolicy, ContentAnalyzer};
use super::audit::{AuditTrail, MemoryAuditTrail, NewAuditEvent};
use super::catalog::ServiceCatalog;
use super::documents::DocumentRecord;
use super::domain::{CaseId, CaseRecord, DocumentId};
use super::error::CaseError;
use super::locks::CaseLocks;
use super::repository::{CaseNotification, CaseRepository, NotificationPublisher};
use super::time_policy::{Clock, SystemClock, TimePolicy};
use crate::config::EngineConfig;

pub use documents::AnalysisOutcome;

/// Case with its documents, as returned by intake and detail queries.
#[derive(Debug, Clone, Serialize)]
pub struct CaseDetail {
    pub case: CaseRecord,
    pub documents: Vec<DocumentRecord>,
}

pub struct CaseService<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    analyzer: Arc<dyn ContentAnalyzer>,
    audit: Arc<dyn AuditTrail>,
    clock: Arc<dyn Clock>,
    catalog: Arc<ServiceCatalog>,
    time: TimePolicy,
    analysis: AnalysisPolicy,
    locks: CaseLocks,
    case_sequence: AtomicU64,
    document_sequence: AtomicU64,
}

impl<R, N> CaseService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        analyzer: Arc<dyn ContentAnalyzer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repository,
            notifications,
            analyzer,
            audit: Arc::new(MemoryAuditTrail::default()),
            clock: Arc::new(SystemClock),
            catalog: Arc::new(ServiceCatalog::standard()),
            time: TimePolicy::new(config.pricing),
            analysis: config.analysis,
            locks: CaseLocks::default(),
            case_sequence: AtomicU64::new(1),
            document_sequence: AtomicU64::new(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditTrail>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_catalog(mut self, catalog: ServiceCatalog) -> Self {
        self.catalog = Arc::new(catalog);
        self
    }

    pub fn catalog(&self) -> &ServiceCatalog {
        &self.catalog
    }

    pub fn time_policy(&self) -> &TimePolicy {
        &self.time
    }

    #[cfg(test)]
    pub(crate) fn tracked_locks(&self) -> usize {
        self.locks.tracked()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn next_case_id(&self) -> CaseId {
        let id = self.case_sequence.fetch_add(1, Ordering::Relaxed);
        CaseId(format!("ot-{id:06}"))
    }

    fn next_document_id(&self) -> DocumentId {
        let id = self.document_sequence.fetch_add(1, Ordering::Relaxed);
        DocumentId(format!("doc-{id:06}"))
    }

    fn load_case(&self, case_id: &CaseId) -> Result<CaseRecord, CaseError> {
        self.repository
            .fetch_case(case_id)?
            .ok_or_else(|| CaseError::NotFound(format!("case {case_id}")))
    }

    fn load_document(&self, document_id: &DocumentId) -> Result<DocumentRecord, CaseError> {
        self.repository
            .fetch_document(document_id)?
            .ok_or_else(|| CaseError::NotFound(format!("document {document_id}")))
    }

    /// Appends to the audit trail after a committed write. The write is not rolled back when
    /// the trail is unavailable.
    fn record(&self, event: NewAuditEvent) {
        let case_id = event.case_id.clone();
        if let Err(err) = self.audit.append(event) {
            error!(case_id = %case_id, error = %err, "audit append failed");
        }
    }

    fn notify(&self, notification: CaseNotification) {
        let template = notification.template.clone();
        let case_id = notification.case_id.clone();
        if let Err(err) = self.notifications.publish(notification) {
            warn!(case_id = %case_id, %template, error = %err, "notification delivery failed");
        }
    }
}

fn authorize(allowed: bool, action: &str) -> Result<(), CaseError> {
    if allowed {
        Ok(())
    } else {
        Err(CaseError::Authorization(format!("caller may not {action}")))
    }
}

fn ensure_open(case: &CaseRecord) -> Result<(), CaseError> {
    if case.is_finalized() {
        return Err(CaseError::TerminalState(format!(
            "case {} is finalized",
            case.id
        )));
    }
    Ok(())
}
