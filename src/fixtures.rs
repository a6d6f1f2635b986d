//! Shared test wiring: in-memory collaborators with seeded reference data.

use std::sync::Arc;

use rust_decimal_macros::dec;

use crate::adapters::memory::{InMemoryIdentityGateway, InMemoryStore, RecordingChannel};
use crate::config::EngineConfig;
use crate::decimal::Money;
use crate::engine::LoanApplicationEngine;
use crate::events::EventLog;
use crate::ports::{Ports, ProductTypeRepository, StatusRepository};
use crate::routing::ValidationRouter;
use crate::types::{LoanProductType, Status, User};

pub(crate) struct Harness {
    pub store: Arc<InMemoryStore>,
    pub identity: Arc<InMemoryIdentityGateway>,
    pub channel: Arc<RecordingChannel>,
    pub config: EngineConfig,
    pub events: EventLog,
    pub pending: Status,
    pub approved: Status,
    pub rejected: Status,
    /// 1,000..=50,000 at 12% a year, reviewer decides
    pub manual_product: LoanProductType,
    /// 500..=20,000 at 18% a year, external validator decides
    pub automatic_product: LoanProductType,
    pub applicant: User,
}

impl Harness {
    /// every status seeded, including pending review
    pub async fn seeded() -> Self {
        let harness = Self::without_pending().await;
        let pending = StatusRepository::save(
            harness.store.as_ref(),
            Status::new("PENDIENTE_REVISION", "Pendiente de revisión por un analista"),
        )
        .await
        .unwrap();
        Self { pending, ..harness }
    }

    /// pending review left for the engine to create; `pending` holds a placeholder
    pub async fn without_pending() -> Self {
        let config = EngineConfig::default();
        let store = Arc::new(InMemoryStore::with_approved_status(config.statuses.approved.clone()));

        let approved = StatusRepository::save(store.as_ref(), Status::new("APROBADO", "Aprobado"))
            .await
            .unwrap();
        let rejected = StatusRepository::save(store.as_ref(), Status::new("RECHAZADO", "Rechazado"))
            .await
            .unwrap();

        let manual_product = ProductTypeRepository::save(
            store.as_ref(),
            LoanProductType::new(
                "Libre inversión",
                Money::from_major(1_000),
                Money::from_major(50_000),
                dec!(12),
                false,
            ),
        )
        .await
        .unwrap();
        let automatic_product = ProductTypeRepository::save(
            store.as_ref(),
            LoanProductType::new(
                "Microcrédito",
                Money::from_major(500),
                Money::from_major(20_000),
                dec!(18),
                true,
            ),
        )
        .await
        .unwrap();

        let applicant = User {
            email: "laura@example.com".to_string(),
            first_name: "Laura".to_string(),
            base_salary: Money::from_major(4_500),
        };
        let identity = Arc::new(InMemoryIdentityGateway::with_users([applicant.clone()]));
        let channel = Arc::new(RecordingChannel::new(config.channels.clone()));

        Self {
            store,
            identity,
            channel,
            config,
            events: EventLog::new(),
            pending: Status::new("PENDIENTE_REVISION", "unsaved"),
            approved,
            rejected,
            manual_product,
            automatic_product,
            applicant,
        }
    }

    pub fn ports(&self) -> Ports {
        Ports {
            applications: self.store.clone(),
            products: self.store.clone(),
            statuses: self.store.clone(),
            identity: self.identity.clone(),
            channel: self.channel.clone(),
        }
    }

    pub fn router(&self) -> ValidationRouter {
        ValidationRouter::new(self.ports(), self.config.statuses.approved.clone(), self.events.clone())
    }

    pub fn engine(&self) -> LoanApplicationEngine {
        LoanApplicationEngine::new(self.config.clone(), self.ports()).unwrap()
    }
}

/// fresh collaborators with nothing seeded
pub(crate) fn empty_ports() -> Ports {
    let store = Arc::new(InMemoryStore::new());
    Ports {
        applications: store.clone(),
        products: store.clone(),
        statuses: store,
        identity: Arc::new(InMemoryIdentityGateway::new()),
        channel: Arc::new(RecordingChannel::default()),
    }
}
