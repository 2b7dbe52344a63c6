use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::{ServiceArea, ServiceCode};
use super::time_policy::ClosingQuote;

/// Identifier wrapper for service orders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CaseId(pub String);

/// Identifier wrapper for case documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

/// Identifier for authenticated users (clients, company admins, SPI staff).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

const SYSTEM_ACTOR: &str = "system";

impl UserId {
    /// Actor recorded for engine-initiated events (analysis, payment callbacks, archival).
    pub fn system() -> Self {
        Self(SYSTEM_ACTOR.to_string())
    }

    pub fn is_system(&self) -> bool {
        self.0 == SYSTEM_ACTOR
    }
}

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(CaseId, DocumentId, UserId, CompanyId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Client,
    ClientAdmin,
    SpiAdmin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ClientAdmin => "client-admin",
            Role::SpiAdmin => "spi-admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "client" => Some(Role::Client),
            "client-admin" | "client_admin" => Some(Role::ClientAdmin),
            "spi-admin" | "spi_admin" => Some(Role::SpiAdmin),
            _ => None,
        }
    }
}

/// Authenticated caller as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub company_id: Option<CompanyId>,
}

impl Principal {
    pub fn new(id: impl Into<String>, role: Role, company_id: Option<&str>) -> Self {
        Self {
            id: UserId(id.into()),
            role,
            company_id: company_id.map(|company| CompanyId(company.to_string())),
        }
    }
}

/// Fixed pipeline every service order moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Solicitud,
    PagoAdelanto,
    Gestion,
    PagoCierre,
    Finalizado,
}

impl Stage {
    pub const fn ordered() -> [Self; 5] {
        [
            Self::Solicitud,
            Self::PagoAdelanto,
            Self::Gestion,
            Self::PagoCierre,
            Self::Finalizado,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Solicitud => "Solicitud",
            Self::PagoAdelanto => "Pago Inicial",
            Self::Gestion => "En Gestión",
            Self::PagoCierre => "Pago Final",
            Self::Finalizado => "Finalizado",
        }
    }

    pub const fn key(self) -> &'static str {
        match self {
            Self::Solicitud => "solicitud",
            Self::PagoAdelanto => "pago_adelanto",
            Self::Gestion => "gestion",
            Self::PagoCierre => "pago_cierre",
            Self::Finalizado => "finalizado",
        }
    }

    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Solicitud => Some(Self::PagoAdelanto),
            Self::PagoAdelanto => Some(Self::Gestion),
            Self::Gestion => Some(Self::PagoCierre),
            Self::PagoCierre => Some(Self::Finalizado),
            Self::Finalizado => None,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finalizado)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Advance,
    Closing,
}

impl PaymentKind {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentKind::Advance => "advance",
            PaymentKind::Closing => "closing",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    pub advance: bool,
    pub closing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advance_confirmed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_confirmed_at: Option<DateTime<Utc>>,
}

impl PaymentStatus {
    pub fn is_confirmed(&self, kind: PaymentKind) -> bool {
        match kind {
            PaymentKind::Advance => self.advance,
            PaymentKind::Closing => self.closing,
        }
    }

    pub(crate) fn confirm(&mut self, kind: PaymentKind, at: DateTime<Utc>) {
        match kind {
            PaymentKind::Advance => {
                self.advance = true;
                self.advance_confirmed_at = Some(at);
            }
            PaymentKind::Closing => {
                self.closing = true;
                self.closing_confirmed_at = Some(at);
            }
        }
    }
}

/// Intake payload for a new service order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCase {
    pub client_id: UserId,
    #[serde(default)]
    pub company_id: Option<CompanyId>,
    pub title: String,
    pub service_code: ServiceCode,
    pub amount_base: u64,
}

/// Persisted service order. Mutated only through the case service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    pub id: CaseId,
    pub client_id: UserId,
    pub company_id: CompanyId,
    pub title: String,
    pub service_code: ServiceCode,
    pub area: ServiceArea,
    pub stage: Stage,
    pub amount_base: u64,
    pub created_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    /// Closing amount locked in when the closing payment was confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closing_quote: Option<ClosingQuote>,
    pub assigned_user_ids: BTreeSet<UserId>,
    pub version: u64,
}

impl CaseRecord {
    pub fn is_finalized(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn status_view(&self) -> CaseStatusView {
        CaseStatusView {
            case_id: self.id.clone(),
            stage: self.stage,
            stage_label: self.stage.label(),
            advance_paid: self.payment_status.advance,
            closing_paid: self.payment_status.closing,
            version: self.version,
        }
    }
}

/// Compact projection returned by stage and payment mutations.
#[derive(Debug, Clone, Serialize)]
pub struct CaseStatusView {
    pub case_id: CaseId,
    pub stage: Stage,
    pub stage_label: &'static str,
    pub advance_paid: bool,
    pub closing_paid: bool,
    pub version: u64,
}
