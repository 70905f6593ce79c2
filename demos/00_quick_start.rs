/// quick start - derive a schedule from contract terms
use installment_engine::chrono::NaiveDate;
use installment_engine::{ContractTerms, Money, SafeTimeProvider, ScheduleGenerator, TimeSource};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let start = NaiveDate::from_ymd_opt(2024, 1, 31).ok_or("bad date")?;

    // R$ 1.000,00 in 3 installments, due on the 31st (clamped in short months)
    let terms = ContractTerms::installments(Money::from_major(1_000), 3)
        .with_due_day(31)
        .starting(start);

    let schedule = ScheduleGenerator::default().generate("CTR-2024-0001", &terms, &time)?;

    for installment in &schedule {
        println!(
            "{}  {}  {}  {}",
            installment.installment_id,
            installment.competencia,
            installment.due_date,
            installment.expected_amount.format_brl()
        );
    }

    Ok(())
}
