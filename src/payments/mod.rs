pub mod amortization;
pub mod debt;

pub use amortization::{monthly_payment, AmortizationSchedule, ScheduledPayment};
pub use debt::{DebtAggregator, DebtSummary};
