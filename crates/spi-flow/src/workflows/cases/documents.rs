//! Per-document approval state machine.
//!
//! ```text
//! pending ──submit──▶ submitted ──analysis──▶ analyzing ──▶ validated | rejected
//!                        ▲                                      │          │
//!                        └──────────── replace ◀────────────────┘          │
//!                        └──────────── submit  ◀───────────────────────────┘
//! ```
//!
//! The transition methods here are pure: they mutate a record in place and never touch storage.
//! The case service owns locking, persistence and audit emission.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{DocumentKind, DocumentTemplate};
use super::domain::{CaseId, DocumentId, UserId};
use super::error::CaseError;

/// Opaque handle to stored document content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRef(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Submitted,
    Analyzing,
    Validated,
    Rejected,
}

impl DocumentStatus {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Pending,
            Self::Submitted,
            Self::Analyzing,
            Self::Validated,
            Self::Rejected,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Analyzing => "analyzing",
            Self::Validated => "validated",
            Self::Rejected => "rejected",
        }
    }

    /// Slot still waiting on the client.
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Pending | Self::Rejected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    pub case_id: CaseId,
    pub client_id: UserId,
    pub name: String,
    /// Catalog key such as `poder_legal` or `cedula_identidad`.
    pub document_type: String,
    pub kind: DocumentKind,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    pub is_vault_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_ref: Option<FileRef>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extracted_fields: BTreeMap<String, String>,
    /// Vault entry this record was copied from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reused_from: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl DocumentRecord {
    pub(crate) fn from_template(
        id: DocumentId,
        case_id: CaseId,
        client_id: UserId,
        template: &DocumentTemplate,
        at: DateTime<Utc>,
    ) -> Self {
        Self::pending(
            id,
            case_id,
            client_id,
            (template.name.to_string(), template.document_type.to_string(), template.kind),
            at,
        )
    }

    /// Empty slot on `case_id` shaped like `source`, used when a vault copy has no template
    /// slot to fill.
    pub(crate) fn slot_like(
        id: DocumentId,
        case_id: CaseId,
        source: &DocumentRecord,
        at: DateTime<Utc>,
    ) -> Self {
        Self::pending(
            id,
            case_id,
            source.client_id.clone(),
            (source.name.clone(), source.document_type.clone(), source.kind),
            at,
        )
    }

    fn pending(
        id: DocumentId,
        case_id: CaseId,
        client_id: UserId,
        (name, document_type, kind): (String, String, DocumentKind),
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            case_id,
            client_id,
            name,
            document_type,
            kind,
            status: DocumentStatus::Pending,
            rejection_reason: None,
            is_vault_eligible: false,
            valid_until: None,
            file_ref: None,
            extracted_fields: BTreeMap::new(),
            reused_from: None,
            validated_at: None,
            archived_at: None,
            updated_at: at,
            version: 0,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }

    /// True when this record may be offered from the vault at `now`.
    pub fn is_vault_entry(&self, now: DateTime<Utc>) -> bool {
        self.status == DocumentStatus::Validated
            && self.is_vault_eligible
            && self.valid_until.map_or(true, |until| until > now)
    }

    /// `rejection_reason` is present exactly when the document is rejected, and vault
    /// eligibility never outlives validation.
    pub fn invariants_hold(&self) -> bool {
        let reason_matches = match self.status {
            DocumentStatus::Rejected => self
                .rejection_reason
                .as_deref()
                .is_some_and(|reason| !reason.trim().is_empty()),
            _ => self.rejection_reason.is_none(),
        };
        let vault_matches = !self.is_vault_eligible || self.status == DocumentStatus::Validated;
        reason_matches && vault_matches
    }

    fn ensure_mutable(&self) -> Result<(), CaseError> {
        if self.is_archived() {
            return Err(CaseError::TerminalState(format!(
                "document {} is archived with its finalized case",
                self.id
            )));
        }
        Ok(())
    }

    fn invalid(&self, action: &str) -> CaseError {
        CaseError::InvalidState(format!(
            "cannot {action} document {} while it is {}",
            self.id,
            self.status.label()
        ))
    }

    fn withdraw_from_vault(&mut self) {
        self.is_vault_eligible = false;
        self.valid_until = None;
    }

    pub(crate) fn submit(&mut self, file_ref: FileRef, at: DateTime<Utc>) -> Result<(), CaseError> {
        self.ensure_mutable()?;
        if !self.status.is_open() {
            return Err(self.invalid("submit"));
        }
        self.status = DocumentStatus::Submitted;
        self.rejection_reason = None;
        self.file_ref = Some(file_ref);
        self.extracted_fields.clear();
        self.withdraw_from_vault();
        self.updated_at = at;
        Ok(())
    }

    /// New submission for a document that was already validated.
    pub(crate) fn replace(&mut self, file_ref: FileRef, at: DateTime<Utc>) -> Result<(), CaseError> {
        self.ensure_mutable()?;
        if self.status != DocumentStatus::Validated {
            return Err(self.invalid("replace"));
        }
        self.status = DocumentStatus::Submitted;
        self.file_ref = Some(file_ref);
        self.extracted_fields.clear();
        self.reused_from = None;
        self.validated_at = None;
        self.withdraw_from_vault();
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn begin_analysis(&mut self, at: DateTime<Utc>) -> Result<(), CaseError> {
        self.ensure_mutable()?;
        if self.status != DocumentStatus::Submitted {
            return Err(self.invalid("analyze"));
        }
        self.status = DocumentStatus::Analyzing;
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn abort_analysis(&mut self, at: DateTime<Utc>) -> Result<(), CaseError> {
        if self.status != DocumentStatus::Analyzing {
            return Err(self.invalid("abort analysis of"));
        }
        self.status = DocumentStatus::Submitted;
        self.updated_at = at;
        Ok(())
    }

    /// Moves the document to `validated`. `retention` is the catalog's vault window for the
    /// document type; `None` keeps the document out of the vault.
    pub(crate) fn validate(
        &mut self,
        at: DateTime<Utc>,
        retention: Option<Duration>,
        extracted_fields: BTreeMap<String, String>,
    ) -> Result<(), CaseError> {
        self.ensure_mutable()?;
        if !matches!(
            self.status,
            DocumentStatus::Submitted | DocumentStatus::Analyzing | DocumentStatus::Rejected
        ) {
            return Err(self.invalid("approve"));
        }
        self.status = DocumentStatus::Validated;
        self.rejection_reason = None;
        self.validated_at = Some(at);
        if !extracted_fields.is_empty() {
            self.extracted_fields = extracted_fields;
        }
        match retention {
            Some(window) => {
                self.is_vault_eligible = true;
                self.valid_until = Some(at + window);
            }
            None => self.withdraw_from_vault(),
        }
        self.updated_at = at;
        Ok(())
    }

    /// Caps vault retention at an expiry printed on the document. An already expired document
    /// stays validated for its case but never enters the vault.
    pub(crate) fn cap_vault_expiry(&mut self, printed: DateTime<Utc>, now: DateTime<Utc>) {
        if printed <= now {
            self.withdraw_from_vault();
            return;
        }
        if let Some(until) = self.valid_until {
            self.valid_until = Some(until.min(printed));
        }
    }

    pub(crate) fn reject(&mut self, reason: &str, at: DateTime<Utc>) -> Result<(), CaseError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CaseError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }
        self.ensure_mutable()?;
        if !matches!(
            self.status,
            DocumentStatus::Submitted | DocumentStatus::Analyzing | DocumentStatus::Validated
        ) {
            return Err(self.invalid("reject"));
        }
        self.status = DocumentStatus::Rejected;
        self.rejection_reason = Some(reason.to_string());
        self.validated_at = None;
        self.withdraw_from_vault();
        self.updated_at = at;
        Ok(())
    }

    /// Fills an open slot (or a fresh record) from a vault entry. The copy is never vaultable.
    pub(crate) fn adopt_vault_copy(
        &mut self,
        source: &DocumentRecord,
        at: DateTime<Utc>,
    ) -> Result<(), CaseError> {
        self.ensure_mutable()?;
        if !self.status.is_open() {
            return Err(CaseError::Conflict(format!(
                "document {} is already {}",
                self.id,
                self.status.label()
            )));
        }
        self.status = DocumentStatus::Validated;
        self.rejection_reason = None;
        self.file_ref = source.file_ref.clone();
        self.extracted_fields = source.extracted_fields.clone();
        self.reused_from = Some(source.id.clone());
        self.validated_at = Some(at);
        self.withdraw_from_vault();
        self.updated_at = at;
        Ok(())
    }

    pub(crate) fn archive(&mut self, at: DateTime<Utc>) {
        if self.archived_at.is_none() {
            self.archived_at = Some(at);
        }
    }
}
