use chrono::NaiveTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::Rate;
use crate::errors::{EngineError, Result};
use crate::types::ReceiptMethod;

pub const DEFAULT_INSTALLMENT_COUNT: u32 = 3;
pub const DEFAULT_DUE_DAY: u32 = 15;
pub const DEFAULT_SUBSCRIPTION_MONTHS: u32 = 12;
pub const DEFAULT_MAX_INSTALLMENTS: u32 = 600;
pub const DEFAULT_TOLERANCE_PERCENT: u32 = 10;
pub const DEFAULT_UPCOMING_WINDOW_DAYS: u32 = 7;

/// engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub schedule: ScheduleDefaults,
    pub payment: PaymentPolicy,
    pub reconciliation: ReconciliationSchedule,
    /// look-ahead used by upcoming-installment queries
    pub upcoming_window_days: u32,
}

/// defaults applied when contract terms leave a field out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleDefaults {
    pub installment_count: u32,
    pub due_day: u32,
    /// subscription length when no billing end date is given
    pub subscription_months: u32,
    /// upper bound on generated schedule length
    pub max_installments: u32,
}

/// payment acceptance rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPolicy {
    /// how far above the expected amount a payment may go
    pub overpayment_tolerance: Rate,
    /// receipt methods that settle later and are not posted to the cash ledger
    pub deferred_methods: Vec<ReceiptMethod>,
}

/// when the overdue sweep runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationSchedule {
    /// daily run time (UTC)
    pub run_at: NaiveTime,
    pub run_on_startup: bool,
}

impl Default for ScheduleDefaults {
    fn default() -> Self {
        Self {
            installment_count: DEFAULT_INSTALLMENT_COUNT,
            due_day: DEFAULT_DUE_DAY,
            subscription_months: DEFAULT_SUBSCRIPTION_MONTHS,
            max_installments: DEFAULT_MAX_INSTALLMENTS,
        }
    }
}

impl Default for PaymentPolicy {
    fn default() -> Self {
        Self {
            overpayment_tolerance: Rate::from_percentage(DEFAULT_TOLERANCE_PERCENT),
            deferred_methods: ReceiptMethod::ALL
                .iter()
                .copied()
                .filter(|m| !m.impacts_cash())
                .collect(),
        }
    }
}

impl Default for ReconciliationSchedule {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::MIN,
            run_on_startup: true,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schedule: ScheduleDefaults::default(),
            payment: PaymentPolicy::default(),
            reconciliation: ReconciliationSchedule::default(),
            upcoming_window_days: DEFAULT_UPCOMING_WINDOW_DAYS,
        }
    }
}

impl PaymentPolicy {
    /// whether a payment received this way should be posted to the cash ledger
    pub fn posts_to_ledger(&self, method: Option<ReceiptMethod>) -> bool {
        match method {
            Some(method) => !self.deferred_methods.contains(&method),
            None => true,
        }
    }
}

impl EngineConfig {
    /// load from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(count) = env_parse::<u32>("INSTALLMENT_DEFAULT_COUNT")? {
            config.schedule.installment_count = count;
        }
        if let Some(day) = env_parse::<u32>("INSTALLMENT_DEFAULT_DUE_DAY")? {
            config.schedule.due_day = day;
        }
        if let Some(months) = env_parse::<u32>("INSTALLMENT_SUBSCRIPTION_MONTHS")? {
            config.schedule.subscription_months = months;
        }
        if let Some(bps) = env_parse::<u32>("PAYMENT_TOLERANCE_BPS")? {
            config.payment.overpayment_tolerance = Rate::from_bps(bps);
        }
        if let Some(days) = env_parse::<u32>("UPCOMING_WINDOW_DAYS")? {
            config.upcoming_window_days = days;
        }
        if let Ok(run_at) = std::env::var("RECONCILE_AT") {
            config.reconciliation.run_at = NaiveTime::parse_from_str(run_at.trim(), "%H:%M")
                .map_err(|e| EngineError::InvalidConfiguration {
                    message: format!("RECONCILE_AT '{}': {}", run_at, e),
                })?;
        }
        if let Ok(flag) = std::env::var("RECONCILE_ON_STARTUP") {
            config.reconciliation.run_on_startup = flag != "false" && flag != "0";
        }

        config.validate()?;
        Ok(config)
    }

    /// reject configurations the generator or payment rules cannot honour
    pub fn validate(&self) -> Result<()> {
        let defaults = &self.schedule;

        if defaults.installment_count == 0 {
            return Err(EngineError::InvalidConfiguration {
                message: "default installment count must be positive".to_string(),
            });
        }
        if !(1..=31).contains(&defaults.due_day) {
            return Err(EngineError::InvalidConfiguration {
                message: format!("default due day {} outside 1..=31", defaults.due_day),
            });
        }
        if defaults.subscription_months == 0 {
            return Err(EngineError::InvalidConfiguration {
                message: "subscription length must be at least one month".to_string(),
            });
        }
        if defaults.max_installments < defaults.installment_count
            || defaults.max_installments < defaults.subscription_months
        {
            return Err(EngineError::InvalidConfiguration {
                message: format!(
                    "max installments {} is below the configured defaults",
                    defaults.max_installments
                ),
            });
        }
        if self.payment.overpayment_tolerance.as_decimal() < Decimal::ZERO {
            return Err(EngineError::InvalidConfiguration {
                message: "overpayment tolerance cannot be negative".to_string(),
            });
        }

        Ok(())
    }

    pub fn with_tolerance(mut self, tolerance: Rate) -> Self {
        self.payment.overpayment_tolerance = tolerance;
        self
    }

    pub fn with_defaults(mut self, installment_count: u32, due_day: u32) -> Self {
        self.schedule.installment_count = installment_count;
        self.schedule.due_day = due_day;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| EngineError::InvalidConfiguration {
                message: format!("{}='{}' is not a valid value", key, raw),
            }),
        Err(_) => Ok(None),
    }
}
