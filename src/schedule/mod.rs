use chrono::NaiveDate;
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::config::ScheduleDefaults;
use crate::decimal::Money;
use crate::errors::{EngineError, Result};
use crate::installment::Installment;
use crate::types::PaymentMode;

/// contract terms a schedule is derived from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractTerms {
    pub total_value: Money,
    pub payment_mode: PaymentMode,
    pub installment_count: Option<u32>,
    pub due_day: Option<u32>,
    pub billing_start_date: Option<NaiveDate>,
    /// subscriptions only
    pub billing_end_date: Option<NaiveDate>,
}

impl ContractTerms {
    pub fn new(payment_mode: PaymentMode, total_value: Money) -> Self {
        Self {
            total_value,
            payment_mode,
            installment_count: None,
            due_day: None,
            billing_start_date: None,
            billing_end_date: None,
        }
    }

    pub fn cash(total_value: Money) -> Self {
        Self::new(PaymentMode::Cash, total_value)
    }

    pub fn installments(total_value: Money, count: u32) -> Self {
        Self::new(PaymentMode::Installments, total_value).with_count(count)
    }

    pub fn subscription(total_value: Money) -> Self {
        Self::new(PaymentMode::Subscription, total_value)
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.installment_count = Some(count);
        self
    }

    pub fn with_due_day(mut self, day: u32) -> Self {
        self.due_day = Some(day);
        self
    }

    pub fn starting(mut self, date: NaiveDate) -> Self {
        self.billing_start_date = Some(date);
        self
    }

    pub fn ending(mut self, date: NaiveDate) -> Self {
        self.billing_end_date = Some(date);
        self
    }
}

/// derives installment schedules from contract terms
#[derive(Debug, Clone, Default)]
pub struct ScheduleGenerator {
    defaults: ScheduleDefaults,
}

impl ScheduleGenerator {
    pub fn new(defaults: ScheduleDefaults) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &ScheduleDefaults {
        &self.defaults
    }

    /// generate a schedule; "today" is read from the time provider when no start date is given
    pub fn generate(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<Vec<Installment>> {
        self.generate_as_of(contract_id, terms, time_provider.now().date_naive())
    }

    /// generate a schedule with an explicit "today"
    pub fn generate_as_of(
        &self,
        contract_id: &str,
        terms: &ContractTerms,
        today: NaiveDate,
    ) -> Result<Vec<Installment>> {
        if contract_id.trim().is_empty() {
            return Err(invalid_terms("contract id is empty"));
        }
        if !terms.total_value.is_positive() {
            return Err(invalid_terms(format!(
                "total value must be positive, got {}",
                terms.total_value
            )));
        }
        if !terms.total_value.is_whole_cents() {
            return Err(invalid_terms(format!(
                "total value {} has fractions of a cent",
                terms.total_value
            )));
        }

        let start = terms.billing_start_date.unwrap_or(today);

        match terms.payment_mode {
            PaymentMode::Cash => Ok(vec![Installment::scheduled(
                contract_id,
                1,
                start,
                terms.total_value,
            )]),
            PaymentMode::Installments => {
                let count = self.installment_count(terms)?;
                let due_day = self.due_day(terms)?;
                monthly_schedule(contract_id, terms.total_value, start, count, due_day)
            }
            PaymentMode::Subscription => {
                let due_day = self.due_day(terms)?;
                let count = self.subscription_length(start, terms.billing_end_date)?;
                monthly_schedule(contract_id, terms.total_value, start, count, due_day)
            }
        }
    }

    fn installment_count(&self, terms: &ContractTerms) -> Result<u32> {
        let count = terms
            .installment_count
            .unwrap_or(self.defaults.installment_count);

        if count == 0 {
            return Err(invalid_terms("installment count must be positive"));
        }
        if count > self.defaults.max_installments {
            return Err(invalid_terms(format!(
                "installment count {} exceeds the maximum of {}",
                count, self.defaults.max_installments
            )));
        }
        Ok(count)
    }

    fn due_day(&self, terms: &ContractTerms) -> Result<u32> {
        let day = terms.due_day.unwrap_or(self.defaults.due_day);
        if !(1..=31).contains(&day) {
            return Err(invalid_terms(format!("due day {} outside 1..=31", day)));
        }
        Ok(day)
    }

    /// months between start and end, both inclusive
    fn subscription_length(&self, start: NaiveDate, end: Option<NaiveDate>) -> Result<u32> {
        let Some(end) = end else {
            return Ok(self.defaults.subscription_months);
        };

        let months = calendar::month_index(end) - calendar::month_index(start) + 1;
        if months < 1 {
            return Err(invalid_terms(format!(
                "billing end {} is before billing start {}",
                end, start
            )));
        }
        if months > self.defaults.max_installments as i64 {
            return Err(invalid_terms(format!(
                "subscription spans {} months, maximum is {}",
                months, self.defaults.max_installments
            )));
        }
        Ok(months as u32)
    }
}

/// free-function form using the default configuration
#[allow(clippy::too_many_arguments)]
pub fn generate_schedule(
    contract_id: &str,
    payment_mode: PaymentMode,
    total_value: Money,
    installment_count: Option<u32>,
    due_day: Option<u32>,
    billing_start_date: Option<NaiveDate>,
    billing_end_date: Option<NaiveDate>,
    time_provider: &SafeTimeProvider,
) -> Result<Vec<Installment>> {
    let terms = ContractTerms {
        total_value,
        payment_mode,
        installment_count,
        due_day,
        billing_start_date,
        billing_end_date,
    };
    ScheduleGenerator::default().generate(contract_id, &terms, time_provider)
}

fn monthly_schedule(
    contract_id: &str,
    total_value: Money,
    start: NaiveDate,
    count: u32,
    due_day: u32,
) -> Result<Vec<Installment>> {
    let amounts = total_value.split_evenly(count);
    if amounts.iter().any(|amount| !amount.is_positive()) {
        return Err(invalid_terms(format!(
            "{} cannot be split into {} positive installments",
            total_value, count
        )));
    }

    amounts
        .into_iter()
        .enumerate()
        .map(|(i, amount)| {
            let due_date = calendar::advance_months_with_day(start, i as u32, due_day)?;
            Ok(Installment::scheduled(contract_id, i as u32 + 1, due_date, amount))
        })
        .collect()
}

fn invalid_terms(message: impl Into<String>) -> EngineError {
    EngineError::InvalidTerms {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InstallmentStatus;
    use chrono::{Datelike, TimeZone, Utc};
    use hourglass_rs::TimeSource;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn total(schedule: &[Installment]) -> Money {
        schedule.iter().map(|i| i.expected_amount).sum()
    }

    #[test]
    fn test_cash_single_installment() {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap(),
        ));
        let terms = ContractTerms::cash(Money::from_str_exact("1500.75").unwrap());

        let schedule = ScheduleGenerator::default()
            .generate("CTR-2024-0007", &terms, &time)
            .unwrap();

        assert_eq!(schedule.len(), 1);
        let only = &schedule[0];
        assert_eq!(only.installment_id, "CTR-2024-0007-001");
        assert_eq!(only.sequence_number, 1);
        assert_eq!(only.due_date, date(2024, 6, 10));
        assert_eq!(only.competencia, "06/2024");
        assert_eq!(only.expected_amount, terms.total_value);
        assert_eq!(only.status, InstallmentStatus::Scheduled);
        assert_eq!(only.days_overdue, 0);
    }

    #[test]
    fn test_installments_remainder_goes_last() {
        let terms = ContractTerms::installments(Money::from_major(100), 3)
            .with_due_day(10)
            .starting(date(2024, 1, 5));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0001", &terms, date(2024, 1, 1))
            .unwrap();

        let amounts: Vec<_> = schedule.iter().map(|i| i.expected_amount.as_decimal()).collect();
        assert_eq!(amounts, vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
        let dues: Vec<_> = schedule.iter().map(|i| i.due_date).collect();
        assert_eq!(dues, vec![date(2024, 1, 10), date(2024, 2, 10), date(2024, 3, 10)]);
        assert_eq!(total(&schedule), Money::from_major(100));
    }

    #[test]
    fn test_installment_defaults() {
        let terms = ContractTerms::new(PaymentMode::Installments, Money::from_major(900))
            .starting(date(2024, 4, 20));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0002", &terms, date(2024, 4, 20))
            .unwrap();

        assert_eq!(schedule.len(), 3);
        assert!(schedule.iter().all(|i| i.due_date.day() == 15));
        assert!(schedule.iter().all(|i| i.expected_amount == Money::from_major(300)));
    }

    #[test]
    fn test_subscription_default_twelve_months() {
        let terms = ContractTerms::subscription(Money::from_major(1200)).starting(date(2024, 1, 1));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0003", &terms, date(2024, 1, 1))
            .unwrap();

        assert_eq!(schedule.len(), 12);
        assert!(schedule.iter().all(|i| i.expected_amount == Money::from_major(100)));
        assert_eq!(schedule[0].due_date, date(2024, 1, 15));
        assert_eq!(schedule[11].due_date, date(2024, 12, 15));
        assert_eq!(schedule[11].competencia, "12/2024");
    }

    #[test]
    fn test_subscription_explicit_end_counts_months_inclusive() {
        let terms = ContractTerms::subscription(Money::from_major(1000))
            .with_due_day(5)
            .starting(date(2024, 11, 20))
            .ending(date(2025, 3, 1));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0004", &terms, date(2024, 11, 20))
            .unwrap();

        assert_eq!(schedule.len(), 5);
        let tags: Vec<_> = schedule.iter().map(|i| i.competencia.as_str()).collect();
        assert_eq!(tags, vec!["11/2024", "12/2024", "01/2025", "02/2025", "03/2025"]);
        assert_eq!(total(&schedule), Money::from_major(1000));
        assert_eq!(schedule[4].due_date, date(2025, 3, 5));
    }

    #[test]
    fn test_subscription_remainder_goes_last() {
        let terms = ContractTerms::subscription(Money::from_major(1000)).starting(date(2024, 1, 1));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0008", &terms, date(2024, 1, 1))
            .unwrap();

        assert_eq!(schedule.len(), 12);
        assert!(schedule[..11]
            .iter()
            .all(|i| i.expected_amount.as_decimal() == dec!(83.33)));
        assert_eq!(schedule[11].expected_amount.as_decimal(), dec!(83.37));
        assert_eq!(total(&schedule), Money::from_major(1000));
    }

    #[test]
    fn test_subscription_end_before_start_is_rejected() {
        let terms = ContractTerms::subscription(Money::from_major(100))
            .starting(date(2024, 5, 1))
            .ending(date(2024, 4, 30));

        let err = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0005", &terms, date(2024, 5, 1))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTerms { .. }));
    }

    #[test]
    fn test_due_day_31_clamps() {
        let terms = ContractTerms::installments(Money::from_major(400), 4)
            .with_due_day(31)
            .starting(date(2024, 1, 1));

        let schedule = ScheduleGenerator::default()
            .generate_as_of("CTR-2024-0006", &terms, date(2024, 1, 1))
            .unwrap();

        let dues: Vec<_> = schedule.iter().map(|i| i.due_date).collect();
        assert_eq!(
            dues,
            vec![date(2024, 1, 31), date(2024, 2, 29), date(2024, 3, 31), date(2024, 4, 30)]
        );
    }

    #[test]
    fn test_invalid_terms() {
        let generator = ScheduleGenerator::default();
        let today = date(2024, 1, 1);

        let zero_count = ContractTerms::installments(Money::from_major(100), 0);
        assert!(matches!(
            generator.generate_as_of("C", &zero_count, today),
            Err(EngineError::InvalidTerms { .. })
        ));

        let bad_day = ContractTerms::installments(Money::from_major(100), 2).with_due_day(32);
        assert!(matches!(
            generator.generate_as_of("C", &bad_day, today),
            Err(EngineError::InvalidTerms { .. })
        ));

        let zero_total = ContractTerms::cash(Money::ZERO);
        assert!(matches!(
            generator.generate_as_of("C", &zero_total, today),
            Err(EngineError::InvalidTerms { .. })
        ));

        // sub-cent totals would not survive storage at cent precision
        let fraction = ContractTerms::installments(Money::from_str_exact("100.005").unwrap(), 3);
        assert!(matches!(
            generator.generate_as_of("C", &fraction, today),
            Err(EngineError::InvalidTerms { .. })
        ));
        let fraction = ContractTerms::cash(Money::from_str_exact("0.001").unwrap());
        assert!(matches!(
            generator.generate_as_of("C", &fraction, today),
            Err(EngineError::InvalidTerms { .. })
        ));

        // three cents cannot cover four installments
        let too_small = ContractTerms::installments(Money::from_cents(3), 4);
        assert!(matches!(
            generator.generate_as_of("C", &too_small, today),
            Err(EngineError::InvalidTerms { .. })
        ));
    }

    #[test]
    fn test_sum_and_contiguity_hold_across_counts() {
        let generator = ScheduleGenerator::default();
        let value = Money::from_str_exact("1234.57").unwrap();

        for count in [1u32, 2, 3, 7, 11, 24, 60] {
            let terms = ContractTerms::installments(value, count)
                .with_due_day(28)
                .starting(date(2023, 12, 1));
            let schedule = generator
                .generate_as_of("CTR-2023-0100", &terms, date(2023, 12, 1))
                .unwrap();

            assert_eq!(schedule.len(), count as usize);
            assert_eq!(total(&schedule), value);
            for (i, inst) in schedule.iter().enumerate() {
                assert_eq!(inst.sequence_number, i as u32 + 1);
                assert!(inst.expected_amount.is_positive());
            }
            assert!(schedule.windows(2).all(|w| w[0].due_date < w[1].due_date));
        }
    }

    #[test]
    fn test_free_function_uses_clock_for_start() {
        let time = SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap(),
        ));

        let schedule = generate_schedule(
            "CTR-2025-0001",
            PaymentMode::Installments,
            Money::from_major(300),
            Some(2),
            Some(31),
            None,
            None,
            &time,
        )
        .unwrap();

        assert_eq!(schedule[0].due_date, date(2025, 1, 31));
        assert_eq!(schedule[1].due_date, date(2025, 2, 28));
    }

    fn mode() -> impl Strategy<Value = PaymentMode> {
        prop_oneof![
            Just(PaymentMode::Cash),
            Just(PaymentMode::Installments),
            Just(PaymentMode::Subscription),
        ]
    }

    proptest! {
        #[test]
        fn prop_schedule_sums_to_total(
            mode in mode(),
            cents in 1i64..100_000_000i64,
            count in 1u32..=60u32,
            due_day in 1u32..=31u32,
            start_offset in 0i64..3650i64,
        ) {
            let value = Money::from_cents(cents);
            let start = date(2020, 1, 1) + chrono::Duration::days(start_offset);
            let terms = ContractTerms::new(mode, value)
                .with_count(count)
                .with_due_day(due_day)
                .starting(start)
                .ending(start + chrono::Duration::days(31 * (count as i64 - 1)));

            match ScheduleGenerator::default().generate_as_of("CTR-P", &terms, start) {
                Ok(schedule) => {
                    prop_assert_eq!(total(&schedule), value);
                    prop_assert!(schedule.iter().all(|i| i.expected_amount.is_positive()));
                    prop_assert!(schedule.iter().all(|i| i.expected_amount.is_whole_cents()));
                    for (i, inst) in schedule.iter().enumerate() {
                        prop_assert_eq!(inst.sequence_number, i as u32 + 1);
                    }
                    prop_assert!(schedule.windows(2).all(|w| w[0].due_date < w[1].due_date));
                }
                // only totals with fewer cents than installments fail; a
                // subscription spans at most count + 1 months here
                Err(e) => {
                    let is_invalid_terms = matches!(e, EngineError::InvalidTerms { .. });
                    prop_assert!(is_invalid_terms);
                    prop_assert!(cents <= count as i64 + 1);
                }
            }
        }
    }
}
