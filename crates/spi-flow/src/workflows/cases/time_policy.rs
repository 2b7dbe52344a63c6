//! Deadline arithmetic and closing-payment pricing.
//!
//! Every call site that needs to know whether a case earns the early-submission discount or
//! pays the late surcharge goes through [`TimePolicy`], so the thresholds live in one
//! [`PricingPolicy`] value instead of being repeated inline.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Source of "now" for the engine.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Used by tests and the CLI demo.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pricing dials for the closing payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Days between case creation and its deadline.
    pub deadline_window_days: i64,
    pub early_discount_percent: u64,
    /// Share of the window that must still remain for the discount to apply.
    pub early_window_fraction: f64,
    /// Absolute amount added once the deadline has passed.
    pub late_surcharge_flat: u64,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            deadline_window_days: 90,
            early_discount_percent: 10,
            early_window_fraction: 2.0 / 3.0,
            late_surcharge_flat: 50_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingAdjustment {
    EarlyDiscount,
    OnTime,
    LateSurcharge,
}

impl PricingAdjustment {
    pub const fn ordered() -> [Self; 3] {
        [Self::EarlyDiscount, Self::OnTime, Self::LateSurcharge]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::EarlyDiscount => "Descuento por pronto envío",
            Self::OnTime => "En plazo",
            Self::LateSurcharge => "Recargo por retraso",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadlineStatus {
    pub days_left: i64,
    pub discount_eligible: bool,
    pub surcharge_applies: bool,
}

impl DeadlineStatus {
    pub fn adjustment(&self) -> PricingAdjustment {
        if self.discount_eligible {
            PricingAdjustment::EarlyDiscount
        } else if self.surcharge_applies {
            PricingAdjustment::LateSurcharge
        } else {
            PricingAdjustment::OnTime
        }
    }
}

/// Urgency bucket shown next to a case on dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineBadge {
    Overdue,
    DueSoon,
    OnTime,
}

impl DeadlineBadge {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Overdue => "Vencido",
            Self::DueSoon => "Vence pronto",
            Self::OnTime => "A tiempo",
        }
    }
}

/// Closing amount breakdown. Locked onto the case when the closing payment is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingQuote {
    pub base: u64,
    pub discount: u64,
    pub surcharge: u64,
    pub total: u64,
    pub adjustment: PricingAdjustment,
    pub days_left: i64,
    pub computed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct TimePolicy {
    policy: PricingPolicy,
}

impl TimePolicy {
    pub fn new(policy: PricingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub fn deadline_window(&self) -> Duration {
        Duration::days(self.policy.deadline_window_days)
    }

    pub fn deadline_for(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
        created_at + self.deadline_window()
    }

    pub fn deadline_status(&self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> DeadlineStatus {
        let remaining = deadline - now;
        let days_left = days_left(remaining);

        let window_secs = self.deadline_window().num_seconds() as f64;
        let early_threshold_secs = window_secs * self.policy.early_window_fraction;
        let discount_eligible =
            days_left > 0 && (remaining.num_seconds() as f64) > early_threshold_secs;
        let surcharge_applies = !discount_eligible && days_left < 0;

        DeadlineStatus {
            days_left,
            discount_eligible,
            surcharge_applies,
        }
    }

    pub fn badge(&self, now: DateTime<Utc>, deadline: DateTime<Utc>) -> DeadlineBadge {
        match days_left(deadline - now) {
            days if days < 0 => DeadlineBadge::Overdue,
            days if days < 3 => DeadlineBadge::DueSoon,
            _ => DeadlineBadge::OnTime,
        }
    }

    /// `base - discount + surcharge`, where at most one adjustment is non-zero.
    pub fn closing_quote(
        &self,
        base: u64,
        now: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> ClosingQuote {
        let status = self.deadline_status(now, deadline);
        let (discount, surcharge) = match status.adjustment() {
            PricingAdjustment::EarlyDiscount => {
                (base.saturating_mul(self.policy.early_discount_percent) / 100, 0)
            }
            PricingAdjustment::LateSurcharge => (0, self.policy.late_surcharge_flat),
            PricingAdjustment::OnTime => (0, 0),
        };

        ClosingQuote {
            base,
            discount,
            surcharge,
            total: base.saturating_sub(discount).saturating_add(surcharge),
            adjustment: status.adjustment(),
            days_left: status.days_left,
            computed_at: now,
        }
    }
}

/// Whole days remaining, rounded up. Negative once the deadline has passed.
fn days_left(remaining: Duration) -> i64 {
    const DAY_SECS: i64 = 86_400;
    let secs = remaining.num_seconds();
    let days = secs.div_euclid(DAY_SECS);
    if secs.rem_euclid(DAY_SECS) == 0 {
        days
    } else {
        days + 1
    }
}
