/// quick start - one manual and one automatic application through the lifecycle
use std::sync::Arc;

use loan_lifecycle_rs::adapters::{InMemoryIdentityGateway, InMemoryStore, RecordingChannel};
use loan_lifecycle_rs::{
    telemetry, Decimal, EngineConfig, LoanApplication, LoanApplicationEngine, LoanProductType,
    Money, Ports, ProductCatalog, StatusCatalog, Status, User, ValidationDecision,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let store = Arc::new(InMemoryStore::with_approved_status(config.statuses.approved.clone()));
    let identity = Arc::new(InMemoryIdentityGateway::with_users([User {
        email: "laura@example.com".to_string(),
        first_name: "Laura".to_string(),
        base_salary: Money::from_major(4_500),
    }]));
    let channel = Arc::new(RecordingChannel::new(config.channels.clone()));

    // reference data
    let statuses = StatusCatalog::new(store.clone());
    let approved = statuses
        .create(Status::new(config.statuses.approved.clone(), "Aprobado"))
        .await?;
    let products = ProductCatalog::new(store.clone());
    let personal = products
        .create(LoanProductType::new(
            "Libre inversión",
            Money::from_major(1_000),
            Money::from_major(50_000),
            Decimal::from(12),
            false,
        ))
        .await?;
    let micro = products
        .create(LoanProductType::new(
            "Microcrédito",
            Money::from_major(500),
            Money::from_major(20_000),
            Decimal::from(18),
            true,
        ))
        .await?;

    let ports = Ports {
        applications: store.clone(),
        products: store.clone(),
        statuses: store.clone(),
        identity,
        channel: channel.clone(),
    };
    let engine = LoanApplicationEngine::new(config.clone(), ports)?;

    // manual: a reviewer approves it directly
    let first = engine
        .create(LoanApplication::new(Money::from_major(10_000), 12, "laura@example.com", personal.id))
        .await?;
    let details = engine.update_status_and_get_details(first.id, approved.id).await?;
    println!("{} -> {}", details.application.id, details.status.name);

    // automatic: the validation request carries the approved loan's installment
    let second = engine
        .create(LoanApplication::new(Money::from_major(3_000), 24, "laura@example.com", micro.id))
        .await?;
    engine.drain_background().await;
    for request in channel.validation_requests() {
        println!("{}", serde_json::to_string_pretty(&request)?);
    }

    // the validator answers asynchronously
    let decision = ValidationDecision::new(second.id, config.statuses.approved.clone());
    engine.apply_validation_decision(&decision).await?;

    for summary in engine.find_by_status_name("aprobado", 0, 10).await? {
        println!(
            "{} {} {} ({})",
            summary.application_id,
            summary.amount,
            summary.applicant_name.unwrap_or_default(),
            summary.product_name
        );
    }

    Ok(())
}
