use super::common::*;
use crate::workflows::cases::catalog::ServiceCode;
use crate::workflows::cases::documents::DocumentStatus;
use crate::workflows::cases::domain::{PaymentKind, Stage};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::time_policy::{DeadlineBadge, PricingAdjustment};

#[test]
fn early_closing_earns_the_discount() {
    let h = harness();
    let case_id = h.open(ServiceCode::Busq).case.id;
    h.days_pass(10);

    let quote = h
        .service
        .compute_closing_amount(&client(), &case_id)
        .expect("quote");
    assert_eq!(quote.adjustment, PricingAdjustment::EarlyDiscount);
    assert_eq!(quote.discount, 50_000);
    assert_eq!(quote.total, 450_000);
    assert_eq!(quote.days_left, 80);
}

#[test]
fn mid_window_closing_pays_the_base() {
    let h = harness();
    let case_id = h.open(ServiceCode::Busq).case.id;
    h.days_pass(45);

    let quote = h
        .service
        .compute_closing_amount(&client(), &case_id)
        .expect("quote");
    assert_eq!(quote.adjustment, PricingAdjustment::OnTime);
    assert_eq!(quote.total, BASE_AMOUNT);
}

#[test]
fn overdue_closing_adds_the_flat_surcharge() {
    let h = harness();
    let case_id = h.open(ServiceCode::Busq).case.id;
    h.days_pass(95);

    let quote = h
        .service
        .compute_closing_amount(&client(), &case_id)
        .expect("quote");
    assert_eq!(quote.adjustment, PricingAdjustment::LateSurcharge);
    assert_eq!(quote.surcharge, 50_000);
    assert_eq!(quote.total, BASE_AMOUNT + 50_000);
    assert_eq!(quote.days_left, -5);
}

#[test]
fn quotes_are_read_only() {
    let h = harness();
    let case_id = h.open(ServiceCode::Busq).case.id;
    let before = h.case(&case_id);

    h.service
        .compute_closing_amount(&client(), &case_id)
        .expect("quote");
    assert_eq!(h.case(&case_id), before);
    assert!(matches!(
        h.service.compute_closing_amount(&other_client(), &case_id),
        Err(CaseError::Authorization(_))
    ));
}

#[test]
fn late_confirmation_locks_the_surcharge() {
    let h = harness();
    let case_id = h.open(ServiceCode::Busq).case.id;
    h.drive_to(&case_id, Stage::PagoCierre);
    h.days_pass(100);

    h.service
        .confirm_payment(&case_id, PaymentKind::Closing)
        .expect("closing confirmed");
    let locked = h.case(&case_id).closing_quote.expect("quote locked");
    assert_eq!(locked.total, BASE_AMOUNT + 50_000);
    assert_eq!(locked.computed_at, h.case(&case_id).created_at + chrono::Duration::days(100));
}

#[test]
fn dashboard_summarizes_visible_cases() {
    let h = harness();
    let finished = h.open(ServiceCode::Busq).case.id;
    h.drive_to(&finished, Stage::Finalizado);
    let urgent = h.open(ServiceCode::Rm).case.id;
    h.open(ServiceCode::Prec);
    h.days_pass(89);

    let summary = h
        .service
        .dashboard(&client())
        .expect("dashboard")
        .summary();

    assert_eq!(summary.total_cases, 3);
    assert_eq!(summary.active_cases, 2);
    assert_eq!(summary.at_risk_cases, 2);
    let finalized = summary
        .stage_distribution
        .iter()
        .find(|entry| entry.stage == Stage::Finalizado)
        .expect("stage listed");
    assert_eq!(finalized.count, 1);
    assert_eq!(summary.stage_distribution.len(), Stage::ordered().len());

    let validated = summary
        .document_status
        .iter()
        .find(|entry| entry.status == DocumentStatus::Validated)
        .expect("validated documents counted");
    assert_eq!(validated.count, 2);

    let first = summary.cases.first().expect("cards present");
    assert_ne!(first.case_id, finished);
    assert_eq!(first.badge, DeadlineBadge::DueSoon);
    assert_eq!(
        summary.cases.last().map(|card| card.case_id.clone()),
        Some(finished)
    );
    assert!(summary.cases.iter().any(|card| card.case_id == urgent));

    let outsider = h
        .service
        .dashboard(&other_client())
        .expect("dashboard")
        .summary();
    assert_eq!(outsider.total_cases, 0);
}
