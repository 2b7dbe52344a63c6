use tracing::{debug, info};

use super::{authorize, ensure_open, CaseService};
use crate::workflows::cases::audit::NewAuditEvent;
use crate::workflows::cases::authorization::can_submit;
use crate::workflows::cases::documents::DocumentRecord;
use crate::workflows::cases::domain::{CaseId, Principal, Role, UserId};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::repository::{CaseRepository, NotificationPublisher};
use crate::workflows::cases::vault::{find_reusable, vault_listing, VaultEntryView};

fn can_open_vault(actor: &Principal, client_id: &UserId) -> bool {
    actor.role == Role::SpiAdmin || &actor.id == client_id
}

impl<R, N> CaseService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn find_reusable(
        &self,
        actor: &Principal,
        client_id: &UserId,
        document_type: &str,
    ) -> Result<Option<VaultEntryView>, CaseError> {
        authorize(can_open_vault(actor, client_id), "open this vault")?;
        let now = self.now();
        let documents = self.repository.documents_for_client(client_id)?;
        Ok(find_reusable(&documents, client_id, document_type, now)
            .map(|doc| VaultEntryView::from_record(doc, now)))
    }

    pub fn vault_entries(
        &self,
        actor: &Principal,
        client_id: &UserId,
    ) -> Result<Vec<VaultEntryView>, CaseError> {
        authorize(can_open_vault(actor, client_id), "open this vault")?;
        let documents = self.repository.documents_for_client(client_id)?;
        Ok(vault_listing(&documents, client_id, self.now()))
    }

    /// Satisfies `document_type` on `target_case_id` with the client's best vault entry.
    ///
    /// Fills the case's open slot for that type when there is one, otherwise adds a new
    /// document. The vault scan reads without locking other cases, so the source is checked
    /// again right before the write and a lost race surfaces as `Conflict` or `NotFound`.
    pub fn reuse_from_vault(
        &self,
        actor: &Principal,
        client_id: &UserId,
        document_type: &str,
        target_case_id: &CaseId,
    ) -> Result<DocumentRecord, CaseError> {
        let lock = self.locks.handle(target_case_id);
        let _guard = lock.acquire();

        let case = self.load_case(target_case_id)?;
        authorize(
            can_submit(actor, &case) && &case.client_id == client_id,
            "reuse vault documents on this case",
        )?;
        ensure_open(&case)?;

        let case_documents = self.repository.documents_for_case(target_case_id)?;
        if let Some(existing) = case_documents.iter().find(|doc| {
            doc.document_type == document_type && !doc.status.is_open()
        }) {
            return Err(CaseError::Conflict(format!(
                "case {target_case_id} already has {document_type} ({})",
                existing.status.label()
            )));
        }

        let now = self.now();
        let client_documents = self.repository.documents_for_client(client_id)?;
        let source = find_reusable(&client_documents, client_id, document_type, now)
            .cloned()
            .ok_or_else(|| {
                CaseError::NotFound(format!("no vault entry of type {document_type}"))
            })?;

        let slot = case_documents
            .into_iter()
            .find(|doc| doc.document_type == document_type && doc.status.is_open());
        let mut target = match slot {
            Some(slot) => slot,
            None => DocumentRecord::slot_like(
                self.next_document_id(),
                target_case_id.clone(),
                &source,
                now,
            ),
        };
        target.adopt_vault_copy(&source, now)?;

        let current = self.repository.fetch_document(&source.id)?;
        if !current.is_some_and(|doc| doc.version == source.version && doc.is_vault_entry(now)) {
            debug!(source = %source.id, "vault entry changed during reuse");
            return Err(CaseError::Conflict(format!(
                "vault entry {} changed, retry",
                source.id
            )));
        }

        let stored = if target.version == 0 {
            self.repository.insert_document(target)?
        } else {
            self.repository.save_document(target)?
        };
        info!(
            document_id = %stored.id,
            source = %source.id,
            case_id = %target_case_id,
            "vault document reused"
        );
        self.record(
            NewAuditEvent::user(
                target_case_id,
                &actor.id,
                format!(
                    "Documento reutilizado desde la bóveda: {} ({})",
                    stored.name, source.id
                ),
                now,
            )
            .for_document(&stored.id),
        );
        Ok(stored)
    }
}
