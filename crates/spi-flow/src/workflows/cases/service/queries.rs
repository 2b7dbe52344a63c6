use super::{authorize, CaseDetail, CaseService};
use crate::workflows::cases::audit::AuditEvent;
use crate::workflows::cases::authorization::can_view;
use crate::workflows::cases::documents::DocumentRecord;
use crate::workflows::cases::domain::{CaseId, CaseRecord, Principal, Role};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::report::CaseReport;
use crate::workflows::cases::repository::{CaseFilter, CaseRepository, NotificationPublisher};

impl<R, N> CaseService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn get_case(&self, actor: &Principal, case_id: &CaseId) -> Result<CaseDetail, CaseError> {
        let case = self.load_case(case_id)?;
        authorize(can_view(actor, &case), "view this case")?;
        let documents = self.repository.documents_for_case(case_id)?;
        Ok(CaseDetail { case, documents })
    }

    /// Cases visible to `actor`, narrowed by `filter`. Clients are pinned to their own cases
    /// and company admins to their company.
    pub fn list_cases(
        &self,
        actor: &Principal,
        filter: CaseFilter,
    ) -> Result<Vec<CaseRecord>, CaseError> {
        let filter = scoped_filter(actor, filter)?;
        Ok(self.repository.list_cases(&filter)?)
    }

    pub fn list_documents(
        &self,
        actor: &Principal,
        case_id: &CaseId,
    ) -> Result<Vec<DocumentRecord>, CaseError> {
        Ok(self.get_case(actor, case_id)?.documents)
    }

    pub fn audit_log(
        &self,
        actor: &Principal,
        case_id: &CaseId,
    ) -> Result<Vec<AuditEvent>, CaseError> {
        let case = self.load_case(case_id)?;
        authorize(can_view(actor, &case), "view this case")?;
        Ok(self.audit.events_for(case_id)?)
    }

    /// Dashboard over every case the actor can see.
    pub fn dashboard(&self, actor: &Principal) -> Result<CaseReport, CaseError> {
        let cases = self.list_cases(actor, CaseFilter::default())?;
        let now = self.now();
        let mut report = CaseReport::default();
        for case in &cases {
            let documents = self.repository.documents_for_case(&case.id)?;
            report.record_case(case, &documents, &self.time, self.quote_for(case), now);
        }
        Ok(report)
    }
}

fn scoped_filter(actor: &Principal, mut filter: CaseFilter) -> Result<CaseFilter, CaseError> {
    match actor.role {
        Role::SpiAdmin => {}
        Role::ClientAdmin => {
            let company = actor.company_id.clone().ok_or_else(|| {
                CaseError::Authorization("client admin has no company".to_string())
            })?;
            if filter.company_id.as_ref().is_some_and(|requested| requested != &company) {
                return Err(CaseError::Authorization(
                    "cannot list another company's cases".to_string(),
                ));
            }
            filter.company_id = Some(company);
        }
        Role::Client => {
            if filter.client_id.as_ref().is_some_and(|requested| requested != &actor.id) {
                return Err(CaseError::Authorization(
                    "cannot list another client's cases".to_string(),
                ));
            }
            filter.client_id = Some(actor.id.clone());
        }
    }
    Ok(filter)
}
