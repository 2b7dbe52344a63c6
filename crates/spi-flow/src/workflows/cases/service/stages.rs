use tracing::info;

use super::{authorize, ensure_open, CaseDetail, CaseService};
use crate::workflows::cases::audit::NewAuditEvent;
use crate::workflows::cases::authorization::{can_advance, can_assign, can_comment, can_view};
use crate::workflows::cases::documents::{DocumentRecord, DocumentStatus};
use crate::workflows::cases::domain::{
    CaseId, CaseRecord, CaseStatusView, CompanyId, NewCase, PaymentKind, PaymentStatus, Principal,
    Role, Stage, UserId,
};
use crate::workflows::cases::error::CaseError;
use crate::workflows::cases::repository::{
    CaseCommit, CaseNotification, CaseRepository, NotificationPublisher,
};
use crate::workflows::cases::time_policy::ClosingQuote;

impl<R, N> CaseService<R, N>
where
    R: CaseRepository + 'static,
    N: NotificationPublisher + 'static,
{
    /// Intake: creates the case in `solicitud` with one pending document per template.
    pub fn open_case(&self, actor: &Principal, request: NewCase) -> Result<CaseDetail, CaseError> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(CaseError::Validation("case title is required".to_string()));
        }
        if request.amount_base == 0 {
            return Err(CaseError::Validation(
                "base amount must be greater than zero".to_string(),
            ));
        }
        let company_id = intake_company(actor, &request)?;

        let now = self.now();
        let case_id = self.next_case_id();
        let case = CaseRecord {
            id: case_id.clone(),
            client_id: request.client_id.clone(),
            company_id,
            title: title.to_string(),
            service_code: request.service_code,
            area: request.service_code.area(),
            stage: Stage::Solicitud,
            amount_base: request.amount_base,
            created_at: now,
            deadline: self.time.deadline_for(now),
            payment_status: PaymentStatus::default(),
            closing_quote: None,
            assigned_user_ids: Default::default(),
            version: 0,
        };
        let documents = self
            .catalog
            .templates_for(request.service_code)
            .iter()
            .map(|template| {
                DocumentRecord::from_template(
                    self.next_document_id(),
                    case_id.clone(),
                    request.client_id.clone(),
                    template,
                    now,
                )
            })
            .collect();

        let stored = self.repository.insert_case(CaseCommit { case, documents })?;
        info!(
            case_id = %stored.case.id,
            service = stored.case.service_code.label(),
            documents = stored.documents.len(),
            "case opened"
        );
        self.record(NewAuditEvent::user(
            &stored.case.id,
            &actor.id,
            format!("Solicitud creada: {}", stored.case.title),
            now,
        ));

        Ok(CaseDetail {
            case: stored.case,
            documents: stored.documents,
        })
    }

    /// Moves the case one stage forward once the source stage's gate is satisfied.
    pub fn advance(&self, actor: &Principal, case_id: &CaseId) -> Result<CaseStatusView, CaseError> {
        self.advance_checked(actor, case_id, None)
    }

    /// Like [`advance`](Self::advance), but fails with `Conflict` when the case has already
    /// left `expected`.
    pub fn advance_from(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        expected: Stage,
    ) -> Result<CaseStatusView, CaseError> {
        self.advance_checked(actor, case_id, Some(expected))
    }

    fn advance_checked(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        expected: Option<Stage>,
    ) -> Result<CaseStatusView, CaseError> {
        let lock = self.locks.handle(case_id);
        let _guard = lock.acquire();

        let mut case = self.load_case(case_id)?;
        authorize(can_advance(actor, &case), "advance this case")?;
        if let Some(expected) = expected {
            if case.stage != expected {
                return Err(CaseError::Conflict(format!(
                    "case {case_id} is in {} not {}",
                    case.stage.key(),
                    expected.key()
                )));
            }
        }

        let from = case.stage;
        let documents = self.repository.documents_for_case(case_id)?;
        check_gate(&case, &documents)?;
        let Some(to) = from.next() else {
            return Err(CaseError::TerminalState(format!(
                "case {case_id} is finalized"
            )));
        };

        let now = self.now();
        case.stage = to;
        let archived = if to.is_terminal() {
            documents
                .into_iter()
                .map(|mut doc| {
                    doc.archive(now);
                    doc
                })
                .collect()
        } else {
            Vec::new()
        };

        let stored = self.repository.save_case(CaseCommit {
            case,
            documents: archived,
        })?;
        info!(
            case_id = %case_id,
            from = from.key(),
            to = to.key(),
            actor = %actor.id,
            "case advanced"
        );
        self.record(NewAuditEvent::user(
            case_id,
            &actor.id,
            format!("Etapa avanzada: {} → {}", from.label(), to.label()),
            now,
        ));
        if to.is_terminal() {
            self.record(NewAuditEvent::system(
                case_id,
                format!("{} documentos archivados", stored.documents.len()),
                now,
            ));
        }
        self.notify(
            CaseNotification::new("stage_advanced", case_id)
                .with("from", from.key())
                .with("to", to.key()),
        );

        Ok(stored.case.status_view())
    }

    /// Payment-processor callback. Idempotent; confirming the closing payment locks the
    /// closing quote at the confirmation instant.
    pub fn confirm_payment(
        &self,
        case_id: &CaseId,
        kind: PaymentKind,
    ) -> Result<CaseStatusView, CaseError> {
        let lock = self.locks.handle(case_id);
        let _guard = lock.acquire();

        let mut case = self.load_case(case_id)?;
        if case.payment_status.is_confirmed(kind) {
            return Ok(case.status_view());
        }
        ensure_open(&case)?;

        let now = self.now();
        let text = match kind {
            PaymentKind::Advance => "Pago inicial confirmado".to_string(),
            PaymentKind::Closing => {
                let quote = self.time.closing_quote(case.amount_base, now, case.deadline);
                let text = format!(
                    "Pago final confirmado: {} ({})",
                    quote.total,
                    quote.adjustment.label()
                );
                case.closing_quote = Some(quote);
                text
            }
        };
        case.payment_status.confirm(kind, now);

        let stored = self.repository.save_case(CaseCommit {
            case,
            documents: Vec::new(),
        })?;
        info!(case_id = %case_id, payment = kind.label(), "payment confirmed");
        self.record(NewAuditEvent::system(case_id, text, now));
        if let (PaymentKind::Closing, Some(quote)) = (kind, stored.case.closing_quote.as_ref()) {
            self.notify(
                CaseNotification::new("closing_quote_locked", case_id)
                    .with("total", quote.total)
                    .with("adjustment", quote.adjustment.label()),
            );
        }

        Ok(stored.case.status_view())
    }

    /// Closing amount due. Returns the locked quote once the closing payment is confirmed,
    /// otherwise quotes against the current clock. Never writes.
    pub fn compute_closing_amount(
        &self,
        actor: &Principal,
        case_id: &CaseId,
    ) -> Result<ClosingQuote, CaseError> {
        let case = self.load_case(case_id)?;
        authorize(can_view(actor, &case), "view this case")?;
        Ok(self.quote_for(&case))
    }

    pub(crate) fn quote_for(&self, case: &CaseRecord) -> ClosingQuote {
        match &case.closing_quote {
            Some(locked) => locked.clone(),
            None => self
                .time
                .closing_quote(case.amount_base, self.now(), case.deadline),
        }
    }

    pub fn assign_user(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        user_id: UserId,
    ) -> Result<CaseRecord, CaseError> {
        self.update_assignment(actor, case_id, user_id, true)
    }

    pub fn unassign_user(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        user_id: UserId,
    ) -> Result<CaseRecord, CaseError> {
        self.update_assignment(actor, case_id, user_id, false)
    }

    fn update_assignment(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        user_id: UserId,
        assign: bool,
    ) -> Result<CaseRecord, CaseError> {
        let lock = self.locks.handle(case_id);
        let _guard = lock.acquire();

        let mut case = self.load_case(case_id)?;
        authorize(can_assign(actor, &case), "manage the case team")?;
        ensure_open(&case)?;

        let changed = if assign {
            case.assigned_user_ids.insert(user_id.clone())
        } else {
            case.assigned_user_ids.remove(&user_id)
        };
        if !changed {
            return Ok(case);
        }

        let now = self.now();
        let stored = self.repository.save_case(CaseCommit {
            case,
            documents: Vec::new(),
        })?;
        let text = if assign {
            format!("Usuario {user_id} asignado al caso")
        } else {
            format!("Usuario {user_id} removido del caso")
        };
        self.record(NewAuditEvent::user(case_id, &actor.id, text, now));
        Ok(stored.case)
    }

    pub fn add_comment(
        &self,
        actor: &Principal,
        case_id: &CaseId,
        text: &str,
    ) -> Result<(), CaseError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CaseError::Validation("comment text is required".to_string()));
        }
        let lock = self.locks.handle(case_id);
        let _guard = lock.acquire();

        let case = self.load_case(case_id)?;
        authorize(can_comment(actor, &case), "comment on this case")?;
        self.record(NewAuditEvent::user(case_id, &actor.id, text, self.now()));
        Ok(())
    }
}

fn intake_company(actor: &Principal, request: &NewCase) -> Result<CompanyId, CaseError> {
    match actor.role {
        Role::Client => {
            if request.client_id != actor.id {
                return Err(CaseError::Authorization(
                    "clients may only open cases for themselves".to_string(),
                ));
            }
            actor
                .company_id
                .clone()
                .ok_or_else(|| CaseError::Validation("client has no company".to_string()))
        }
        Role::ClientAdmin => {
            let company = actor.company_id.clone().ok_or_else(|| {
                CaseError::Validation("client admin has no company".to_string())
            })?;
            match &request.company_id {
                Some(requested) if requested != &company => Err(CaseError::Authorization(
                    "client admins may only open cases for their own company".to_string(),
                )),
                _ => Ok(company),
            }
        }
        Role::SpiAdmin => request
            .company_id
            .clone()
            .ok_or_else(|| CaseError::Validation("company id is required".to_string())),
    }
}

fn check_gate(case: &CaseRecord, documents: &[DocumentRecord]) -> Result<(), CaseError> {
    match case.stage {
        Stage::Solicitud => Ok(()),
        Stage::PagoAdelanto if !case.payment_status.advance => Err(CaseError::PreconditionNotMet(
            "advance payment has not been confirmed".to_string(),
        )),
        Stage::Gestion => {
            let outstanding: Vec<&str> = documents
                .iter()
                .filter(|doc| doc.status != DocumentStatus::Validated)
                .map(|doc| doc.name.as_str())
                .collect();
            if outstanding.is_empty() {
                Ok(())
            } else {
                Err(CaseError::PreconditionNotMet(format!(
                    "documents not validated: {}",
                    outstanding.join(", ")
                )))
            }
        }
        Stage::PagoCierre if !case.payment_status.closing => Err(CaseError::PreconditionNotMet(
            "closing payment has not been confirmed".to_string(),
        )),
        Stage::Finalizado => Err(CaseError::TerminalState(format!(
            "case {} is finalized",
            case.id
        ))),
        Stage::PagoAdelanto | Stage::PagoCierre => Ok(()),
    }
}
