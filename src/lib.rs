pub mod adapters;
pub mod config;
pub mod decimal;
pub mod decisions;
pub mod engine;
pub mod errors;
pub mod events;
pub mod payments;
pub mod ports;
pub mod products;
pub mod routing;
pub mod statuses;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;

// re-export key types
pub use config::{ChannelTopics, ConfigError, EngineConfig, StatusNames, TelemetryConfig};
pub use decimal::{Money, Rate};
pub use decisions::ValidationDecision;
pub use engine::LoanApplicationEngine;
pub use errors::{ExternalFailure, LoanError, Result};
pub use events::{Event, EventLog};
pub use payments::{monthly_payment, AmortizationSchedule, DebtAggregator, DebtSummary};
pub use ports::{
    ApplicationRepository, IdentityGateway, NotificationChannel, Ports, ProductTypeRepository,
    StatusNotification, StatusRepository,
};
pub use products::{validate_amount, ProductCatalog};
pub use routing::{RoutingOutcome, ValidationRequest, ValidationRouter};
pub use statuses::{StatusCatalog, StatusResolver};
pub use types::{
    ApplicationDetails, ApplicationId, LoanApplication, LoanProductType, LoanSummary,
    ProductTypeId, Status, StatusId, User,
};

// re-export external dependencies that users will need
pub use chrono;
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
