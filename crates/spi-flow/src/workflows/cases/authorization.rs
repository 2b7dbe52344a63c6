//! Capability predicates. Every mutating operation asks exactly one of these.

use super::domain::{CaseRecord, Principal, Role};

pub fn can_view(actor: &Principal, case: &CaseRecord) -> bool {
    match actor.role {
        Role::SpiAdmin => true,
        Role::ClientAdmin => actor.company_id.as_ref() == Some(&case.company_id),
        Role::Client => actor.id == case.client_id || case.assigned_user_ids.contains(&actor.id),
    }
}

/// Uploading, resubmitting, replacing or requesting analysis of a case document.
pub fn can_submit(actor: &Principal, case: &CaseRecord) -> bool {
    can_view(actor, case)
}

pub fn can_review(actor: &Principal, _case: &CaseRecord) -> bool {
    actor.role == Role::SpiAdmin
}

/// Team assignment belongs to the client-admin of the owning company.
pub fn can_assign(actor: &Principal, case: &CaseRecord) -> bool {
    actor.role == Role::ClientAdmin && actor.company_id.as_ref() == Some(&case.company_id)
}

pub fn can_advance(actor: &Principal, case: &CaseRecord) -> bool {
    can_view(actor, case)
}

pub fn can_comment(actor: &Principal, case: &CaseRecord) -> bool {
    can_view(actor, case)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::cases::catalog::ServiceCode;
    use crate::workflows::cases::domain::{
        CaseId, CompanyId, PaymentStatus, Stage, UserId,
    };
    use chrono::{Duration, Utc};
    use std::collections::BTreeSet;

    fn case() -> CaseRecord {
        let created = Utc::now();
        CaseRecord {
            id: CaseId("ot-000001".to_string()),
            client_id: UserId("client-1".to_string()),
            company_id: CompanyId("acme".to_string()),
            title: "Registro marca ACME".to_string(),
            service_code: ServiceCode::Rm,
            area: ServiceCode::Rm.area(),
            stage: Stage::Gestion,
            amount_base: 500_000,
            created_at: created,
            deadline: created + Duration::days(90),
            payment_status: PaymentStatus::default(),
            closing_quote: None,
            assigned_user_ids: BTreeSet::new(),
            version: 3,
        }
    }

    #[test]
    fn only_spi_admins_review() {
        let case = case();
        assert!(can_review(&Principal::new("spi-1", Role::SpiAdmin, None), &case));
        assert!(!can_review(
            &Principal::new("client-1", Role::Client, Some("acme")),
            &case
        ));
        assert!(!can_review(
            &Principal::new("boss", Role::ClientAdmin, Some("acme")),
            &case
        ));
    }

    #[test]
    fn assignment_is_scoped_to_company_admins() {
        let case = case();
        assert!(can_assign(
            &Principal::new("boss", Role::ClientAdmin, Some("acme")),
            &case
        ));
        assert!(!can_assign(
            &Principal::new("boss", Role::ClientAdmin, Some("globex")),
            &case
        ));
        assert!(!can_assign(&Principal::new("spi-1", Role::SpiAdmin, None), &case));
    }

    #[test]
    fn clients_see_only_their_own_cases() {
        let case = case();
        assert!(can_view(
            &Principal::new("client-1", Role::Client, Some("acme")),
            &case
        ));
        assert!(!can_view(
            &Principal::new("client-2", Role::Client, Some("acme")),
            &case
        ));
    }

    #[test]
    fn assigned_team_members_gain_access() {
        let mut case = case();
        let teammate = Principal::new("client-2", Role::Client, Some("acme"));
        assert!(!can_comment(&teammate, &case));
        case.assigned_user_ids.insert(UserId("client-2".to_string()));
        assert!(can_comment(&teammate, &case));
        assert!(can_submit(&teammate, &case));
    }
}
