use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::super::documents::{DocumentRecord, DocumentStatus};
use super::super::domain::{CaseId, CaseRecord, Stage};
use super::super::time_policy::{ClosingQuote, DeadlineBadge, PricingAdjustment, TimePolicy};
use super::views::{
    CaseCardView, DashboardSummary, DocumentStatusEntry, PricingOutlookEntry, StageCountEntry,
};

/// Active cases with fewer days than this left are flagged at risk.
const AT_RISK_DAYS: i64 = 2;

#[derive(Debug, Default)]
pub struct CaseReport {
    pub stage_counts: HashMap<Stage, usize>,
    pub document_status: HashMap<DocumentStatus, usize>,
    pub pricing_outlook: HashMap<PricingAdjustment, usize>,
    pub cases: Vec<CaseSnapshot>,
}

impl CaseReport {
    pub fn record_case(
        &mut self,
        case: &CaseRecord,
        documents: &[DocumentRecord],
        time: &TimePolicy,
        quote: ClosingQuote,
        now: DateTime<Utc>,
    ) {
        *self.stage_counts.entry(case.stage).or_default() += 1;
        for doc in documents {
            *self.document_status.entry(doc.status).or_default() += 1;
        }
        *self.pricing_outlook.entry(quote.adjustment).or_default() += 1;

        self.cases.push(CaseSnapshot {
            case_id: case.id.clone(),
            title: case.title.clone(),
            stage: case.stage,
            days_left: time.deadline_status(now, case.deadline).days_left,
            badge: time.badge(now, case.deadline),
            quote,
            documents_validated: documents
                .iter()
                .filter(|doc| doc.status == DocumentStatus::Validated)
                .count(),
            documents_total: documents.len(),
        });
    }

    pub fn total_cases(&self) -> usize {
        self.cases.len()
    }

    pub fn active_cases(&self) -> usize {
        self.cases.iter().filter(|case| case.is_active()).count()
    }

    pub fn at_risk_cases(&self) -> usize {
        self.cases.iter().filter(|case| case.is_at_risk()).count()
    }

    pub fn summary(&self) -> DashboardSummary {
        let stage_distribution = Stage::ordered()
            .into_iter()
            .map(|stage| StageCountEntry {
                stage,
                stage_label: stage.label(),
                count: self.stage_counts.get(&stage).copied().unwrap_or_default(),
            })
            .collect();

        let document_status = DocumentStatus::ordered()
            .into_iter()
            .filter_map(|status| {
                self.document_status
                    .get(&status)
                    .map(|count| DocumentStatusEntry {
                        status,
                        count: *count,
                    })
            })
            .collect();

        let pricing_outlook = PricingAdjustment::ordered()
            .into_iter()
            .map(|adjustment| PricingOutlookEntry {
                adjustment,
                adjustment_label: adjustment.label(),
                count: self.pricing_outlook.get(&adjustment).copied().unwrap_or_default(),
            })
            .collect();

        let mut cases: Vec<CaseCardView> = self.cases.iter().map(CaseSnapshot::to_view).collect();
        cases.sort_by(|left, right| {
            (left.stage == Stage::Finalizado)
                .cmp(&(right.stage == Stage::Finalizado))
                .then(left.days_left.cmp(&right.days_left))
                .then(left.case_id.cmp(&right.case_id))
        });

        DashboardSummary {
            total_cases: self.total_cases(),
            active_cases: self.active_cases(),
            at_risk_cases: self.at_risk_cases(),
            stage_distribution,
            document_status,
            pricing_outlook,
            cases,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseSnapshot {
    pub case_id: CaseId,
    pub title: String,
    pub stage: Stage,
    pub days_left: i64,
    pub badge: DeadlineBadge,
    pub quote: ClosingQuote,
    pub documents_validated: usize,
    pub documents_total: usize,
}

impl CaseSnapshot {
    pub fn is_active(&self) -> bool {
        !self.stage.is_terminal()
    }

    pub fn is_at_risk(&self) -> bool {
        self.is_active() && self.days_left < AT_RISK_DAYS
    }

    pub fn to_view(&self) -> CaseCardView {
        CaseCardView {
            case_id: self.case_id.clone(),
            title: self.title.clone(),
            stage: self.stage,
            stage_label: self.stage.label(),
            days_left: self.days_left,
            badge: self.badge,
            badge_label: self.badge.label(),
            closing_total: self.quote.total,
            adjustment: self.quote.adjustment,
            documents_validated: self.documents_validated,
            documents_total: self.documents_total,
        }
    }
}
