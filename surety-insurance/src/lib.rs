//! Policy sales, crediting on delay, and withdrawal of credits.

pub mod engine;
pub mod policy;
pub mod settlement;

pub use engine::{CreditSummary, InsuranceEngine};
pub use policy::{InsurancePolicy, PolicyStatus};
pub use settlement::{Settlement, SettlementCoordinator};
