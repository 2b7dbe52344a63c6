use serde::Serialize;

use super::super::documents::DocumentStatus;
use super::super::domain::{CaseId, Stage};
use super::super::time_policy::{DeadlineBadge, PricingAdjustment};

#[derive(Debug, Clone, Serialize)]
pub struct StageCountEntry {
    pub stage: Stage,
    pub stage_label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentStatusEntry {
    pub status: DocumentStatus,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PricingOutlookEntry {
    pub adjustment: PricingAdjustment,
    pub adjustment_label: &'static str,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseCardView {
    pub case_id: CaseId,
    pub title: String,
    pub stage: Stage,
    pub stage_label: &'static str,
    pub days_left: i64,
    pub badge: DeadlineBadge,
    pub badge_label: &'static str,
    pub closing_total: u64,
    pub adjustment: PricingAdjustment,
    pub documents_validated: usize,
    pub documents_total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_cases: usize,
    pub active_cases: usize,
    pub at_risk_cases: usize,
    pub stage_distribution: Vec<StageCountEntry>,
    pub document_status: Vec<DocumentStatusEntry>,
    pub pricing_outlook: Vec<PricingOutlookEntry>,
    pub cases: Vec<CaseCardView>,
}
