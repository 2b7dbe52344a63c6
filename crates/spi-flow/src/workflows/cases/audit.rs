//! Append-only case history.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{CaseId, DocumentId, UserId};
use super::repository::RepositoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    System,
    User,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<DocumentId>,
}

/// Entry as handed to [`AuditTrail::append`]; the trail assigns the sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditEvent {
    pub case_id: CaseId,
    pub actor_id: UserId,
    pub kind: AuditKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub document_id: Option<DocumentId>,
}

impl NewAuditEvent {
    pub fn system(case_id: &CaseId, text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            case_id: case_id.clone(),
            actor_id: UserId::system(),
            kind: AuditKind::System,
            text: text.into(),
            timestamp: at,
            document_id: None,
        }
    }

    pub fn user(
        case_id: &CaseId,
        actor_id: &UserId,
        text: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            case_id: case_id.clone(),
            actor_id: actor_id.clone(),
            kind: AuditKind::User,
            text: text.into(),
            timestamp: at,
            document_id: None,
        }
    }

    pub fn for_document(mut self, document_id: &DocumentId) -> Self {
        self.document_id = Some(document_id.clone());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub case_id: CaseId,
    /// Insertion order within the case; breaks timestamp ties.
    pub sequence: u64,
    pub actor_id: UserId,
    pub kind: AuditKind,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: AuditMetadata,
}

pub trait AuditTrail: Send + Sync {
    fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, RepositoryError>;
    /// Events for one case ordered by timestamp, then insertion order.
    fn events_for(&self, case_id: &CaseId) -> Result<Vec<AuditEvent>, RepositoryError>;
}

type CaseLog = Arc<Mutex<Vec<AuditEvent>>>;

/// In-process audit trail. Each case has its own log so appends on different cases never
/// contend beyond the brief map lookup.
#[derive(Debug, Default)]
pub struct MemoryAuditTrail {
    logs: RwLock<HashMap<CaseId, CaseLog>>,
}

impl MemoryAuditTrail {
    fn log_for(&self, case_id: &CaseId) -> Result<CaseLog, RepositoryError> {
        {
            let logs = self.logs.read().map_err(|_| poisoned())?;
            if let Some(log) = logs.get(case_id) {
                return Ok(log.clone());
            }
        }
        let mut logs = self.logs.write().map_err(|_| poisoned())?;
        Ok(logs.entry(case_id.clone()).or_default().clone())
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("audit log lock poisoned".to_string())
}

impl AuditTrail for MemoryAuditTrail {
    fn append(&self, event: NewAuditEvent) -> Result<AuditEvent, RepositoryError> {
        let log = self.log_for(&event.case_id)?;
        let mut entries = log.lock().map_err(|_| poisoned())?;
        let stored = AuditEvent {
            sequence: entries.len() as u64 + 1,
            case_id: event.case_id,
            actor_id: event.actor_id,
            kind: event.kind,
            text: event.text,
            timestamp: event.timestamp,
            metadata: AuditMetadata {
                document_id: event.document_id,
            },
        };
        entries.push(stored.clone());
        Ok(stored)
    }

    fn events_for(&self, case_id: &CaseId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let log = {
            let logs = self.logs.read().map_err(|_| poisoned())?;
            match logs.get(case_id) {
                Some(log) => log.clone(),
                None => return Ok(Vec::new()),
            }
        };
        let mut events = log.lock().map_err(|_| poisoned())?.clone();
        events.sort_by(|left, right| {
            left.timestamp
                .cmp(&right.timestamp)
                .then(left.sequence.cmp(&right.sequence))
        });
        Ok(events)
    }
}
