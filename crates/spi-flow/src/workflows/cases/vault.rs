use chrono::{DateTime, Utc};
use serde::Serialize;

use super::documents::DocumentRecord;
use super::domain::{CaseId, DocumentId, UserId};

/// Picks the best reusable vault entry among `candidates`.
///
/// Candidates are filtered to the client's validated, vault-eligible, unexpired documents of
/// `document_type`. Ties resolve to the latest `valid_until` (no expiry counts as most
/// durable), then the most recent validation.
pub fn find_reusable<'a, I>(
    candidates: I,
    client_id: &UserId,
    document_type: &str,
    now: DateTime<Utc>,
) -> Option<&'a DocumentRecord>
where
    I: IntoIterator<Item = &'a DocumentRecord>,
{
    candidates
        .into_iter()
        .filter(|doc| &doc.client_id == client_id)
        .filter(|doc| doc.document_type == document_type)
        .filter(|doc| doc.is_vault_entry(now))
        .max_by(|left, right| {
            durability(left)
                .cmp(&durability(right))
                .then(left.validated_at.cmp(&right.validated_at))
                .then(left.id.cmp(&right.id))
        })
}

fn durability(doc: &DocumentRecord) -> (bool, Option<DateTime<Utc>>) {
    (doc.valid_until.is_none(), doc.valid_until)
}

/// Vault entry as presented to the owning client.
#[derive(Debug, Clone, Serialize)]
pub struct VaultEntryView {
    pub document_id: DocumentId,
    pub case_id: CaseId,
    pub name: String,
    pub document_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_to_expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
}

impl VaultEntryView {
    pub fn from_record(record: &DocumentRecord, now: DateTime<Utc>) -> Self {
        Self {
            document_id: record.id.clone(),
            case_id: record.case_id.clone(),
            name: record.name.clone(),
            document_type: record.document_type.clone(),
            valid_until: record.valid_until,
            days_to_expiry: record
                .valid_until
                .map(|until| (until - now).num_days()),
            validated_at: record.validated_at,
        }
    }
}

/// Every live vault entry for `client_id`, soonest expiry first.
pub fn vault_listing<'a, I>(
    candidates: I,
    client_id: &UserId,
    now: DateTime<Utc>,
) -> Vec<VaultEntryView>
where
    I: IntoIterator<Item = &'a DocumentRecord>,
{
    let mut entries: Vec<VaultEntryView> = candidates
        .into_iter()
        .filter(|doc| &doc.client_id == client_id && doc.is_vault_entry(now))
        .map(|doc| VaultEntryView::from_record(doc, now))
        .collect();
    entries.sort_by(|left, right| {
        left.days_to_expiry
            .unwrap_or(i64::MAX)
            .cmp(&right.days_to_expiry.unwrap_or(i64::MAX))
            .then(left.document_type.cmp(&right.document_type))
    });
    entries
}
