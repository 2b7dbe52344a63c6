use std::collections::HashMap;
use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use super::documents::DocumentRecord;
use super::domain::{CaseId, CaseRecord, DocumentId, UserId};
use super::repository::{CaseCommit, CaseFilter, CaseRepository, RepositoryError};

/// In-process store backing the demo service and the test suite.
///
/// Lock order is always cases, then documents.
#[derive(Debug, Default)]
pub struct MemoryCaseStore {
    cases: RwLock<HashMap<CaseId, CaseRecord>>,
    documents: RwLock<HashMap<DocumentId, DocumentRecord>>,
}

fn poisoned() -> RepositoryError {
    RepositoryError::Unavailable("case store lock poisoned".to_string())
}

impl MemoryCaseStore {
    fn cases_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<CaseId, CaseRecord>>, RepositoryError> {
        self.cases.read().map_err(|_| poisoned())
    }

    fn cases_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<CaseId, CaseRecord>>, RepositoryError> {
        self.cases.write().map_err(|_| poisoned())
    }

    fn documents_read(
        &self,
    ) -> Result<RwLockReadGuard<'_, HashMap<DocumentId, DocumentRecord>>, RepositoryError> {
        self.documents.read().map_err(|_| poisoned())
    }

    fn documents_write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, HashMap<DocumentId, DocumentRecord>>, RepositoryError> {
        self.documents.write().map_err(|_| poisoned())
    }
}

fn check_version(
    stored: Option<u64>,
    expected: u64,
    id: &dyn fmt::Display,
) -> Result<(), RepositoryError> {
    match stored {
        None => Err(RepositoryError::NotFound),
        Some(version) if version != expected => {
            debug!(record = %id, stored = version, expected, "version conflict");
            Err(RepositoryError::Conflict)
        }
        Some(_) => Ok(()),
    }
}

impl CaseRepository for MemoryCaseStore {
    fn insert_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        let mut cases = self.cases_write()?;
        let mut documents = self.documents_write()?;
        if cases.contains_key(&commit.case.id)
            || commit
                .documents
                .iter()
                .any(|doc| documents.contains_key(&doc.id))
        {
            return Err(RepositoryError::Conflict);
        }

        let mut case = commit.case;
        case.version = 1;
        cases.insert(case.id.clone(), case.clone());

        let mut stored = Vec::with_capacity(commit.documents.len());
        for mut doc in commit.documents {
            doc.version = 1;
            documents.insert(doc.id.clone(), doc.clone());
            stored.push(doc);
        }

        Ok(CaseCommit {
            case,
            documents: stored,
        })
    }

    fn save_case(&self, commit: CaseCommit) -> Result<CaseCommit, RepositoryError> {
        let mut cases = self.cases_write()?;
        let mut documents = self.documents_write()?;

        check_version(
            cases.get(&commit.case.id).map(|case| case.version),
            commit.case.version,
            &commit.case.id,
        )?;
        for doc in &commit.documents {
            check_version(
                documents.get(&doc.id).map(|stored| stored.version),
                doc.version,
                &doc.id,
            )?;
        }

        let mut case = commit.case;
        case.version += 1;
        cases.insert(case.id.clone(), case.clone());

        let mut stored = Vec::with_capacity(commit.documents.len());
        for mut doc in commit.documents {
            doc.version += 1;
            documents.insert(doc.id.clone(), doc.clone());
            stored.push(doc);
        }

        Ok(CaseCommit {
            case,
            documents: stored,
        })
    }

    fn fetch_case(&self, id: &CaseId) -> Result<Option<CaseRecord>, RepositoryError> {
        Ok(self.cases_read()?.get(id).cloned())
    }

    fn list_cases(&self, filter: &CaseFilter) -> Result<Vec<CaseRecord>, RepositoryError> {
        let mut cases: Vec<CaseRecord> = self
            .cases_read()?
            .values()
            .filter(|case| filter.matches(case))
            .cloned()
            .collect();
        cases.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(cases)
    }

    fn insert_document(&self, mut record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        let mut documents = self.documents_write()?;
        if documents.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        record.version = 1;
        documents.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn save_document(&self, mut record: DocumentRecord) -> Result<DocumentRecord, RepositoryError> {
        let mut documents = self.documents_write()?;
        check_version(
            documents.get(&record.id).map(|stored| stored.version),
            record.version,
            &record.id,
        )?;
        record.version += 1;
        documents.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch_document(&self, id: &DocumentId) -> Result<Option<DocumentRecord>, RepositoryError> {
        Ok(self.documents_read()?.get(id).cloned())
    }

    fn documents_for_case(&self, id: &CaseId) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut docs: Vec<DocumentRecord> = self
            .documents_read()?
            .values()
            .filter(|doc| &doc.case_id == id)
            .cloned()
            .collect();
        docs.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(docs)
    }

    fn documents_for_client(
        &self,
        client_id: &UserId,
    ) -> Result<Vec<DocumentRecord>, RepositoryError> {
        let mut docs: Vec<DocumentRecord> = self
            .documents_read()?
            .values()
            .filter(|doc| &doc.client_id == client_id)
            .cloned()
            .collect();
        docs.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(docs)
    }
}
