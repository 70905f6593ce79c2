/// daily reconciliation - advance overdue status as the clock moves
use std::sync::Arc;

use installment_engine::chrono::{Duration, NaiveDate, TimeZone, Utc};
use installment_engine::{
    ContractTerms, InstallmentService, MemoryStore, Money, OverdueReconciler, SafeTimeProvider,
    TimeSource,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let control = time.test_control().unwrap();

    let store = Arc::new(MemoryStore::new());
    let service = InstallmentService::with_default_config(store.clone());
    let reconciler = OverdueReconciler::new(store);

    let terms = ContractTerms::installments(Money::from_major(1_200), 4)
        .with_due_day(5)
        .starting(NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("bad date")?);
    service.create_schedule("CTR-2024-0007", &terms, &time).await?;

    // one run per simulated day
    for _ in 0..70 {
        control.advance(Duration::days(1));
        let today = time.now().date_naive();
        let report = reconciler.reconcile_overdue(today).await?;
        if !report.transitioned.is_empty() {
            println!("{}: now overdue {:?}", today, report.transitioned);
        }
    }

    for installment in service.overdue_installments().await? {
        println!(
            "{} due {} is {} days overdue",
            installment.installment_id, installment.due_date, installment.days_overdue
        );
    }
    println!("total days overdue: {}", service.total_days_overdue().await?);

    Ok(())
}
