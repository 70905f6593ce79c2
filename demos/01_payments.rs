/// payments - record, reject and cancel installments through the service
use std::sync::Arc;

use installment_engine::chrono::{NaiveDate, TimeZone, Utc};
use installment_engine::{
    ContractTerms, EngineError, Event, InstallmentService, MemoryStore, Money,
    PaymentInstruction, ReceiptMethod, SafeTimeProvider, TimeSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
    ));
    let service = InstallmentService::with_default_config(Arc::new(MemoryStore::new()));

    let terms = ContractTerms::subscription(Money::from_major(600))
        .with_due_day(10)
        .starting(NaiveDate::from_ymd_opt(2024, 3, 1).ok_or("bad date")?)
        .ending(NaiveDate::from_ymd_opt(2024, 8, 1).ok_or("bad date")?);
    service.create_schedule("CTR-2024-0042", &terms, &time).await?;

    let paid_on = NaiveDate::from_ymd_opt(2024, 3, 9).ok_or("bad date")?;

    // pix hits cash right away
    service
        .record_payment(
            "CTR-2024-0042-001",
            PaymentInstruction::new(paid_on, Money::from_major(100)).via(ReceiptMethod::Pix),
            &time,
        )
        .await?;

    // paying twice is refused
    match service
        .record_payment(
            "CTR-2024-0042-001",
            PaymentInstruction::new(paid_on, Money::from_major(100)),
            &time,
        )
        .await
    {
        Err(EngineError::AlreadyPaid { id }) => println!("refused: {} already paid", id),
        other => println!("unexpected: {:?}", other),
    }

    // card receipts settle later, no ledger posting
    service
        .record_payment(
            "CTR-2024-0042-002",
            PaymentInstruction::new(paid_on, Money::from_major(100)).via(ReceiptMethod::Card),
            &time,
        )
        .await?;

    service
        .cancel_installment("CTR-2024-0042-006", Some("contract shortened"), &time)
        .await?;

    for event in service.take_events().await {
        if let Event::LedgerPostingRequested { installment_id, amount, reference, .. } = &event {
            println!("post {} for {} (ref {})", amount, installment_id, reference);
        }
    }

    for installment in service.installments_for_contract("CTR-2024-0042").await? {
        println!("{}", installment.to_json()?);
    }

    Ok(())
}
