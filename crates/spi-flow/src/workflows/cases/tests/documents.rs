use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use super::common::*;
use crate::workflows::cases::analysis::LOW_CONFIDENCE_REASON;
use crate::workflows::cases::audit::AuditKind;
use crate::workflows::cases::catalog::ServiceCode;
use crate::workflows::cases::documents::{DocumentStatus, FileRef, ReviewDecision};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::repository::CaseRepository;
use crate::workflows::cases::service::CaseService;
use crate::workflows::cases::time_policy::ManualClock;

#[test]
fn submission_moves_pending_documents_forward() {
    let h = harness();
    let detail = h.open(ServiceCode::Rm);
    let poder = &detail.documents[0];

    let submitted = h.submit(&poder.id);
    assert_eq!(submitted.status, DocumentStatus::Submitted);
    assert!(submitted.file_ref.is_some());
    assert_eq!(submitted.version, poder.version + 1);

    let events = h
        .service
        .audit_log(&client(), &detail.case.id)
        .expect("audit readable");
    let last = events.last().expect("submission event");
    assert_eq!(last.metadata.document_id.as_ref(), Some(&poder.id));
    assert_eq!(last.kind, AuditKind::User);

    assert!(matches!(
        h.service.submit_document(
            &client(),
            &poder.id,
            FileRef("blob://again.pdf".to_string())
        ),
        Err(CaseError::InvalidState(_))
    ));
}

#[test]
fn only_spi_staff_review_documents() {
    let h = harness();
    let detail = h.open(ServiceCode::Busq);
    let document = &detail.documents[0];
    h.submit(&document.id);

    for reviewer in [client(), company_admin()] {
        assert!(matches!(
            h.service
                .review_document(&reviewer, &document.id, ReviewDecision::Approve, None),
            Err(CaseError::Authorization(_))
        ));
    }
    assert_eq!(h.document(&document.id).status, DocumentStatus::Submitted);
}

#[test]
fn pending_documents_cannot_be_approved() {
    let h = harness();
    let detail = h.open(ServiceCode::Busq);

    assert!(matches!(
        h.service.review_document(
            &spi_admin(),
            &detail.documents[0].id,
            ReviewDecision::Approve,
            None
        ),
        Err(CaseError::InvalidState(_))
    ));
}

#[test]
fn rejection_requires_a_reason_and_reopens_the_slot() {
    let h = harness();
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    h.submit(&cedula.id);

    assert!(matches!(
        h.service
            .review_document(&spi_admin(), &cedula.id, ReviewDecision::Reject, Some("  ")),
        Err(CaseError::Validation(_))
    ));
    assert_eq!(h.document(&cedula.id).status, DocumentStatus::Submitted);

    let rejected = h
        .service
        .review_document(
            &spi_admin(),
            &cedula.id,
            ReviewDecision::Reject,
            Some("Foto ilegible"),
        )
        .expect("rejection recorded");
    assert_eq!(rejected.status, DocumentStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Foto ilegible"));
    assert!(rejected.invariants_hold());
    assert!(h
        .notifications
        .templates()
        .contains(&"document_rejected".to_string()));

    let resubmitted = h.submit(&cedula.id);
    assert_eq!(resubmitted.status, DocumentStatus::Submitted);
    assert_eq!(resubmitted.rejection_reason, None);
}

#[test]
fn approval_enters_vaultable_types_into_the_vault() {
    let h = harness();
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    let logo = h.document_of_type(&detail.case.id, "logo_marca");

    h.submit(&cedula.id);
    let approved = h.approve(&cedula.id);
    assert!(approved.is_vault_eligible);
    assert_eq!(approved.valid_until, Some(start() + Duration::days(365)));

    h.submit(&logo.id);
    let logo = h.approve(&logo.id);
    assert!(!logo.is_vault_eligible);
    assert_eq!(logo.valid_until, None);
}

#[test]
fn replacement_only_applies_to_validated_documents() {
    let h = harness();
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");

    assert!(matches!(
        h.service
            .replace_document(&client(), &cedula.id, FileRef("blob://new.pdf".to_string())),
        Err(CaseError::InvalidState(_))
    ));

    h.submit(&cedula.id);
    h.approve(&cedula.id);
    let replaced = h
        .service
        .replace_document(&client(), &cedula.id, FileRef("blob://new.pdf".to_string()))
        .expect("replacement accepted");
    assert_eq!(replaced.status, DocumentStatus::Submitted);
    assert!(!replaced.is_vault_eligible);
    assert_eq!(replaced.validated_at, None);
}

#[test]
fn validated_documents_can_be_revoked_by_staff() {
    let h = harness();
    let detail = h.open(ServiceCode::Busq);
    let document = &detail.documents[0];
    h.submit(&document.id);
    h.approve(&document.id);

    let revoked = h
        .service
        .review_document(
            &spi_admin(),
            &document.id,
            ReviewDecision::Reject,
            Some("Firma no coincide"),
        )
        .expect("revocation");
    assert_eq!(revoked.status, DocumentStatus::Rejected);
    assert_eq!(revoked.validated_at, None);
}

#[tokio::test]
async fn confident_analysis_validates_the_document() {
    let h = harness();
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    h.submit(&cedula.id);

    let outcome = h
        .service
        .request_automated_analysis(&client(), &cedula.id)
        .await
        .expect("analysis completes");

    assert!(outcome.accepted);
    assert_eq!(outcome.document.status, DocumentStatus::Validated);
    assert!(outcome.document.is_vault_eligible);
    assert_eq!(
        outcome.document.extracted_fields.get("rut").map(String::as_str),
        Some("76.123.456-7")
    );

    let events = h
        .service
        .audit_log(&client(), &detail.case.id)
        .expect("audit readable");
    let system: Vec<_> = events
        .iter()
        .filter(|event| event.kind == AuditKind::System)
        .collect();
    assert_eq!(system.len(), 2);
    assert!(system
        .iter()
        .all(|event| event.metadata.document_id.as_ref() == Some(&cedula.id)));
}

#[tokio::test]
async fn low_confidence_analysis_rejects_with_guidance() {
    let h = harness_with(Script::Confident(0.65));
    let detail = h.open(ServiceCode::Rm);
    let poder = h.document_of_type(&detail.case.id, "poder_legal");
    h.submit(&poder.id);

    let outcome = h
        .service
        .request_automated_analysis(&client(), &poder.id)
        .await
        .expect("analysis completes");

    assert!(!outcome.accepted);
    assert_eq!(outcome.document.status, DocumentStatus::Rejected);
    assert_eq!(
        outcome.document.rejection_reason.as_deref(),
        Some(LOW_CONFIDENCE_REASON)
    );
    let texts = h.audit_texts(&detail.case.id);
    assert!(texts.iter().any(|text| text.contains("65% confianza")));
}

#[tokio::test]
async fn mismatched_document_type_is_rejected() {
    let h = harness_with(Script::WrongType("logo_marca"));
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    h.submit(&cedula.id);

    let outcome = h
        .service
        .request_automated_analysis(&client(), &cedula.id)
        .await
        .expect("analysis completes");
    assert_eq!(outcome.document.status, DocumentStatus::Rejected);
    assert!(!outcome.accepted);
}

#[tokio::test]
async fn printed_expiry_shortens_vault_retention() {
    let printed = start() + Duration::days(40);
    let h = harness_with(Script::PrintedExpiry(printed));
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    h.submit(&cedula.id);

    let outcome = h
        .service
        .request_automated_analysis(&client(), &cedula.id)
        .await
        .expect("analysis completes");
    assert_eq!(outcome.document.valid_until, Some(printed));
}

#[tokio::test]
async fn expired_printed_date_validates_without_vault_admission() {
    let h = harness_with(Script::PrintedExpiry(start() - Duration::days(1)));
    let detail = h.open(ServiceCode::Rm);
    let cedula = h.document_of_type(&detail.case.id, "cedula_identidad");
    h.submit(&cedula.id);

    let outcome = h
        .service
        .request_automated_analysis(&client(), &cedula.id)
        .await
        .expect("analysis completes");
    assert_eq!(outcome.document.status, DocumentStatus::Validated);
    assert!(!outcome.document.is_vault_eligible);
    assert!(outcome.document.valid_until.is_none());
    assert!(h
        .service
        .find_reusable(&client(), &client().id, "cedula_identidad")
        .expect("vault readable")
        .is_none());
}

#[tokio::test]
async fn failed_write_of_the_analysis_result_returns_the_document_to_submitted() {
    let store = Arc::new(FlakyStore::default());
    let analyzer = Arc::new(ScriptedAnalyzer::new(Script::Confident(0.95)));
    let service = CaseService::new(
        store.clone(),
        Arc::new(MemoryNotifications::default()),
        analyzer.clone(),
        engine_config(),
    )
    .with_clock(Arc::new(ManualClock::new(start())));
    let detail = service
        .open_case(&client(), new_case(ServiceCode::Busq))
        .expect("case opens");
    let document = &detail.documents[0];
    service
        .submit_document(&client(), &document.id, FileRef("blob://busqueda.pdf".to_string()))
        .expect("submitted");

    let flaky = store.clone();
    analyzer.before_reply(move || flaky.fail_next_document_saves(1));
    let err = service
        .request_automated_analysis(&client(), &document.id)
        .await
        .expect_err("result write fails");
    assert!(matches!(err, CaseError::Storage(_)));

    let stored = store
        .fetch_document(&document.id)
        .expect("store readable")
        .expect("document stored");
    assert_eq!(stored.status, DocumentStatus::Submitted);

    let outcome = service
        .request_automated_analysis(&client(), &document.id)
        .await
        .expect("second round succeeds");
    assert_eq!(outcome.document.status, DocumentStatus::Validated);
}

#[tokio::test]
async fn analyzer_outage_returns_the_document_to_submitted() {
    let h = harness_with(Script::Failing);
    let detail = h.open(ServiceCode::Busq);
    let document = &detail.documents[0];
    h.submit(&document.id);

    let err = h
        .service
        .request_automated_analysis(&client(), &document.id)
        .await
        .expect_err("analyzer offline");
    assert!(matches!(err, CaseError::AnalysisFailed(_)));
    assert!(err.is_retryable());
    assert_eq!(h.analyzer.calls(), 2);
    assert_eq!(h.document(&document.id).status, DocumentStatus::Submitted);

    h.analyzer.set(Script::Confident(0.88));
    let outcome = h
        .service
        .request_automated_analysis(&client(), &document.id)
        .await
        .expect("retry succeeds");
    assert_eq!(outcome.document.status, DocumentStatus::Validated);
}

#[tokio::test]
async fn analyzer_timeouts_are_bounded() {
    let h = harness_with(Script::Stalled);
    let detail = h.open(ServiceCode::Busq);
    let document = &detail.documents[0];
    h.submit(&document.id);

    let err = h
        .service
        .request_automated_analysis(&client(), &document.id)
        .await
        .expect_err("analyzer stalls");
    assert!(matches!(err, CaseError::AnalysisFailed(_)));
    assert_eq!(h.document(&document.id).status, DocumentStatus::Submitted);
}

#[tokio::test]
async fn cancelled_analysis_releases_the_document() {
    let h = harness_with(Script::Stalled);
    let detail = h.open(ServiceCode::Busq);
    let document = &detail.documents[0];
    h.submit(&document.id);

    let attempt = tokio::time::timeout(
        StdDuration::from_millis(5),
        h.service.request_automated_analysis(&client(), &document.id),
    )
    .await;
    assert!(attempt.is_err(), "analysis should still be in flight");
    assert_eq!(h.document(&document.id).status, DocumentStatus::Submitted);
}

#[tokio::test]
async fn analysis_requires_a_submitted_file() {
    let h = harness();
    let detail = h.open(ServiceCode::Busq);

    let err = h
        .service
        .request_automated_analysis(&client(), &detail.documents[0].id)
        .await
        .expect_err("nothing uploaded");
    assert!(matches!(err, CaseError::InvalidState(_)));
    assert_eq!(h.analyzer.calls(), 0);
    assert_eq!(
        h.document(&detail.documents[0].id).status,
        DocumentStatus::Pending
    );
}

#[tokio::test]
async fn staff_review_during_analysis_wins() {
    let h = harness();
    let detail = h.open(ServiceCode::Busq);
    let document_id = detail.documents[0].id.clone();
    h.submit(&document_id);

    let service = Arc::clone(&h.service);
    let reviewed = document_id.clone();
    h.analyzer.before_reply(move || {
        service
            .review_document(
                &spi_admin(),
                &reviewed,
                ReviewDecision::Reject,
                Some("Documento vencido"),
            )
            .expect("staff review while analyzing");
    });

    let err = h
        .service
        .request_automated_analysis(&client(), &document_id)
        .await
        .expect_err("late analyzer result");
    assert!(matches!(err, CaseError::Conflict(_)));

    let stored = h.document(&document_id);
    assert_eq!(stored.status, DocumentStatus::Rejected);
    assert_eq!(stored.rejection_reason.as_deref(), Some("Documento vencido"));
}
