use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use super::{authorize, ensure_open, CaseService};
use crate::workflows::cases::analysis::{
    analyze_with_retry, AnalysisReport, AnalysisRequest, LOW_CONFIDENCE_REASON,
};
use crate::workflows::cases::audit::NewAuditEvent;
use crate::workflows::cases::authorization::{can_review, can_submit};
use crate::workflows::cases::documents::{
    DocumentRecord, DocumentStatus, FileRef, ReviewDecision,
};
use crate::workflows::cases::domain::{CaseRecord, DocumentId, Principal};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::repository::{
    CaseNotification, CaseRepository, NotificationPublisher,
};

const TYPE_MISMATCH_REASON: &str = "El documento no corresponde al tipo solicitado.";

/// Result of an automated analysis round.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub document: DocumentRecord,
    pub confidence: f32,
    pub accepted: bool,
}

impl<R, N> CaseService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Runs `mutate` on a fresh copy of the document under its case's lock, persists it and
    /// records the event built by `event` against it.
    fn mutate_document<F>(
        &self,
        document_id: &DocumentId,
        event: impl FnOnce(&CaseRecord, &DocumentRecord) -> NewAuditEvent,
        mutate: F,
    ) -> Result<DocumentRecord, CaseError>
    where
        F: FnOnce(&CaseRecord, &mut DocumentRecord) -> Result<(), CaseError>,
    {
        let case_id = self.load_document(document_id)?.case_id;
        let lock = self.locks.handle(&case_id);
        let _guard = lock.acquire();

        let case = self.load_case(&case_id)?;
        let mut document = self.load_document(document_id)?;
        mutate(&case, &mut document)?;

        let stored = self.repository.save_document(document)?;
        self.record(event(&case, &stored).for_document(&stored.id));
        Ok(stored)
    }

    pub fn submit_document(
        &self,
        actor: &Principal,
        document_id: &DocumentId,
        file_ref: FileRef,
    ) -> Result<DocumentRecord, CaseError> {
        let now = self.now();
        let stored = self.mutate_document(
            document_id,
            |case, doc| {
                let text = format!("Documento enviado: {}", doc.name);
                NewAuditEvent::user(&case.id, &actor.id, text, now)
            },
            |case, doc| {
                authorize(can_submit(actor, case), "submit documents for this case")?;
                ensure_open(case)?;
                doc.submit(file_ref, now)
            },
        )?;
        info!(document_id = %stored.id, case_id = %stored.case_id, "document submitted");
        Ok(stored)
    }

    /// New submission for an already validated document.
    pub fn replace_document(
        &self,
        actor: &Principal,
        document_id: &DocumentId,
        file_ref: FileRef,
    ) -> Result<DocumentRecord, CaseError> {
        let now = self.now();
        let stored = self.mutate_document(
            document_id,
            |case, doc| {
                NewAuditEvent::user(
                    &case.id,
                    &actor.id,
                    format!("Documento reemplazado: {}", doc.name),
                    now,
                )
            },
            |case, doc| {
                authorize(can_submit(actor, case), "replace documents for this case")?;
                ensure_open(case)?;
                doc.replace(file_ref, now)
            },
        )?;
        info!(document_id = %stored.id, case_id = %stored.case_id, "document replaced");
        Ok(stored)
    }

    /// Manual review by SPI staff.
    pub fn review_document(
        &self,
        actor: &Principal,
        document_id: &DocumentId,
        decision: ReviewDecision,
        reason: Option<&str>,
    ) -> Result<DocumentRecord, CaseError> {
        let now = self.now();
        let reason = reason.map(str::trim).unwrap_or_default();
        let stored = self.mutate_document(
            document_id,
            |case, doc| {
                let text = match decision {
                    ReviewDecision::Approve => format!("Documento aprobado: {}", doc.name),
                    ReviewDecision::Reject => {
                        format!("Documento rechazado: {} ({reason})", doc.name)
                    }
                };
                NewAuditEvent::user(&case.id, &actor.id, text, now)
            },
            |case, doc| {
                authorize(can_review(actor, case), "review documents")?;
                if decision == ReviewDecision::Reject && reason.is_empty() {
                    return Err(CaseError::Validation(
                        "a rejection reason is required".to_string(),
                    ));
                }
                ensure_open(case)?;
                match decision {
                    ReviewDecision::Approve => {
                        let retention = self.catalog.vault_retention(&doc.document_type);
                        doc.validate(now, retention, BTreeMap::new())
                    }
                    ReviewDecision::Reject => doc.reject(reason, now),
                }
            },
        )?;

        info!(
            document_id = %stored.id,
            status = stored.status.label(),
            reviewer = %actor.id,
            "document reviewed"
        );
        if stored.status == DocumentStatus::Rejected {
            self.notify_rejection(&stored);
        }
        Ok(stored)
    }

    /// Sends a submitted document to the content analyzer.
    ///
    /// The document sits in `analyzing` for the duration of the round trip and always leaves
    /// it: validated or rejected on a result, back to `submitted` on failure, timeout or
    /// cancellation of the returned future.
    pub async fn request_automated_analysis(
        &self,
        actor: &Principal,
        document_id: &DocumentId,
    ) -> Result<AnalysisOutcome, CaseError> {
        let request = self.begin_analysis(actor, document_id)?;
        let mut pending = PendingAnalysis {
            service: self,
            document_id,
            armed: true,
        };

        let outcome = match analyze_with_retry(self.analyzer.as_ref(), &request, &self.analysis)
            .await
        {
            Ok(report) => self.apply_analysis(document_id, report),
            Err(err) => {
                warn!(document_id = %document_id, error = %err, "document analysis gave up");
                Err(err.into())
            }
        };
        pending.armed = false;

        if let Err(err) = &outcome {
            // A conflict means a reviewer already moved the document on.
            if !matches!(err, CaseError::Conflict(_)) {
                if let Err(release) = self.abort_analysis(document_id, &err.to_string()) {
                    warn!(
                        document_id = %document_id,
                        error = %release,
                        "could not return document to submitted"
                    );
                }
            }
        }
        outcome
    }

    fn begin_analysis(
        &self,
        actor: &Principal,
        document_id: &DocumentId,
    ) -> Result<AnalysisRequest, CaseError> {
        let now = self.now();
        let stored = self.mutate_document(
            document_id,
            |case, doc| {
                NewAuditEvent::system(
                    &case.id,
                    format!("Análisis automático iniciado: {}", doc.name),
                    now,
                )
            },
            |case, doc| {
                authorize(can_submit(actor, case), "request analysis for this case")?;
                ensure_open(case)?;
                if doc.file_ref.is_none() {
                    return Err(CaseError::InvalidState(format!("document {} has no file", doc.id)));
                }
                doc.begin_analysis(now)
            },
        )?;

        let file_ref = stored.file_ref.clone().ok_or_else(|| {
            CaseError::InvalidState(format!("document {} has no file", stored.id))
        })?;
        Ok(AnalysisRequest {
            document_id: stored.id,
            expected_type: stored.document_type,
            file_ref,
        })
    }

    fn apply_analysis(
        &self,
        document_id: &DocumentId,
        report: AnalysisReport,
    ) -> Result<AnalysisOutcome, CaseError> {
        let now = self.now();
        let accepted = self.analysis.accepts(&report);
        let confidence = report.confidence;
        let percent = (confidence * 100.0).round() as u32;

        let stored = self.mutate_document(
            document_id,
            |case, doc| {
                let text = match doc.status {
                    DocumentStatus::Validated => format!(
                        "Documento validado automáticamente: {} ({percent}% confianza)",
                        doc.name
                    ),
                    _ => format!(
                        "Documento rechazado automáticamente: {} ({percent}% confianza)",
                        doc.name
                    ),
                };
                NewAuditEvent::system(&case.id, text, now)
            },
            |_case, doc| {
                if doc.status != DocumentStatus::Analyzing {
                    return Err(CaseError::Conflict(format!(
                        "document {} changed while analysis was in flight",
                        doc.id
                    )));
                }
                if !accepted {
                    return doc.reject(LOW_CONFIDENCE_REASON, now);
                }
                if report.document_type != doc.document_type {
                    return doc.reject(TYPE_MISMATCH_REASON, now);
                }
                let retention = self.catalog.vault_retention(&doc.document_type);
                doc.validate(now, retention, report.extracted_fields)?;
                if let Some(printed) = report.valid_until {
                    doc.cap_vault_expiry(printed, now);
                }
                Ok(())
            },
        )?;

        info!(
            document_id = %stored.id,
            status = stored.status.label(),
            confidence,
            "document analysis applied"
        );
        if stored.status == DocumentStatus::Rejected {
            self.notify_rejection(&stored);
        }
        Ok(AnalysisOutcome {
            accepted: stored.status == DocumentStatus::Validated,
            document: stored,
            confidence,
        })
    }

    /// Returns an `analyzing` document to `submitted`. No-op when it already left `analyzing`.
    fn abort_analysis(&self, document_id: &DocumentId, cause: &str) -> Result<(), CaseError> {
        let now = self.now();
        let result = self.mutate_document(
            document_id,
            |case, doc| {
                let text = format!(
                    "Análisis automático fallido ({cause}): {} vuelve a enviado",
                    doc.name
                );
                NewAuditEvent::system(&case.id, text, now)
            },
            |_case, doc| doc.abort_analysis(now),
        );
        match result {
            Ok(_) | Err(CaseError::InvalidState(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    fn notify_rejection(&self, document: &DocumentRecord) {
        self.notify(
            CaseNotification::new("document_rejected", &document.case_id)
                .with("document_id", &document.id)
                .with("reason", document.rejection_reason.as_deref().unwrap_or_default()),
        );
    }
}

/// Puts the document back to `submitted` if the analysis future is dropped mid-flight.
struct PendingAnalysis<'a, R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    service: &'a CaseService<R, N>,
    document_id: &'a DocumentId,
    armed: bool,
}

impl<R, N> Drop for PendingAnalysis<'_, R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(err) = self.service.abort_analysis(self.document_id, "cancelled") {
            warn!(
                document_id = %self.document_id,
                error = %err,
                "could not release cancelled analysis"
            );
        }
    }
}
