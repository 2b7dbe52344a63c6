//! Service order (OT) lifecycle: stage gates, document review, deadline pricing, the
//! client document vault, and the per-case audit trail.

pub mod analysis;
pub mod audit;
pub mod authorization;
pub mod catalog;
pub mod documents;
pub mod domain;
pub mod error;
pub(crate) mod locks;
pub mod memory;
pub mod report;
pub mod repository;
pub mod router;
pub mod service;
pub mod time_policy;
pub mod vault;

#[cfg(test)]
mod tests;

pub use analysis::{
    AnalysisPolicy, AnalysisReport, AnalysisRequest, AnalyzerError, ContentAnalyzer,
    RetryStrategy, LOW_CONFIDENCE_REASON,
};
pub use audit::{AuditEvent, AuditKind, AuditTrail, MemoryAuditTrail, NewAuditEvent};
pub use catalog::{DocumentKind, DocumentTemplate, ServiceArea, ServiceCatalog, ServiceCode};
pub use documents::{DocumentRecord, DocumentStatus, FileRef, ReviewDecision};
pub use domain::{
    CaseId, CaseRecord, CaseStatusView, CompanyId, DocumentId, NewCase, PaymentKind,
    PaymentStatus, Principal, Role, Stage, UserId,
};
pub use error::{CaseError, ErrorKind};
pub use memory::MemoryCaseStore;
pub use report::views::DashboardSummary;
pub use report::CaseReport;
pub use repository::{
    CaseCommit, CaseFilter, CaseNotification, CaseRepository, NotificationPublisher, NotifyError,
    RepositoryError,
};
pub use router::case_router;
pub use service::{AnalysisOutcome, CaseDetail, CaseService};
pub use time_policy::{
    ClosingQuote, Clock, DeadlineBadge, DeadlineStatus, ManualClock, PricingAdjustment,
    PricingPolicy, SystemClock, TimePolicy,
};
pub use vault::VaultEntryView;
