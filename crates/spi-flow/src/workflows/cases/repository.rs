use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::documents::DocumentRecord;
use super::domain::{CaseId, CaseRecord, CompanyId, DocumentId, Stage, UserId};

/// Case and document persisted together in one atomic write.
#[derive(Debug, Clone)]
pub struct CaseCommit {
    pub case: CaseRecord,
    pub documents: Vec<DocumentRecord>,
}

/// Storage abstraction for cases and their documents.
///
/// Writes are optimistic: `save_*` succeeds only while the stored version still equals the
/// version on the record being written, and returns the record with its version bumped.
pub trait CaseRepository: Send + Sync {
    fn insert_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError>;
    /// Saves the case and any of its documents in one step; nothing is written on conflict.
    fn save_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError>;
    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError>;
    fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, RepositoryError>;

    fn insert_document(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError>;
    fn save_document(&self, record: DocumentRecord) -> Result<DocumentRecord, RepositoryError>;
    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError>;
    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError>;
    fn documents_for_client(&self, client_id: &UserId)
        -> Result<Vec<DocumentRecord>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Query over cases. Unset fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseFilter {
    /// Matches the owning client or any assigned team member.
    #[serde(default)]
    pub client_id: Option<UserId>,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    #[serde(default)]
    pub stage: Option<Stage>,
}

impl CaseFilter {
    pub fn matches(&self, case: &CaseRecord) -> bool {
        let client_matches = self.client_id.as_ref().map_or(true, |client| {
            &case.client_id == client || case.assigned_user_ids.contains(client)
        });
        let company_matches = self
            .company_id
            .as_ref()
            .map_or(true, |company| &case.company_id == company);
        let stage_matches = self.stage.map_or(true, |stage| case.stage == stage);
        client_matches && company_matches && stage_matches
    }
}

/// Outbound hook for e-mail / push adapters.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, notification: CaseNotification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseNotification {
    pub template: String,
    pub case_id: CaseId,
    pub details: BTreeMap<String, String>,
}

impl CaseNotification {
    pub fn new(template: &str, case_id: &CaseId) -> Self {
        Self {
            template: template.to_string(),
            case_id: case_id.clone(),
            details: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
