//! Collaborators the core consumes but does not implement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{address::Address, error::Result, flight::Flight, units::Amount, StatusCode};

/// A state-mutating call, named by the operation it invokes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Call {
    RegisterAirline { airline: Address },
    SubmitFunds,
    BuyInsurance { flight: Flight },
    CreditInsurees { flight: Flight },
    PayToInsuree,
    RegisterOracle,
    FetchFlightStatus { flight: Flight },
    SubmitOracleResponse { index: u8, flight: Flight, status: StatusCode },
    SetOperational { operational: bool },
    /// Outgoing value movement from the surety to `to`.
    Transfer { to: Address },
}

impl Call {
    pub fn name(&self) -> &'static str {
        match self {
            Call::RegisterAirline { .. } => "registerAirline",
            Call::SubmitFunds => "submitFunds",
            Call::BuyInsurance { .. } => "buyInsurance",
            Call::CreditInsurees { .. } => "creditInsurees",
            Call::PayToInsuree => "payToInsuree",
            Call::RegisterOracle => "registerOracle",
            Call::FetchFlightStatus { .. } => "fetchFlightStatus",
            Call::SubmitOracleResponse { .. } => "submitOracleResponse",
            Call::SetOperational { .. } => "setOperatingStatus",
            Call::Transfer { .. } => "transfer",
        }
    }
}

/// A call executed as `actor` with `value` attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub actor: Address,
    pub value: Amount,
    pub call: Call,
}

impl Transaction {
    pub fn new(actor: Address, call: Call) -> Self {
        Self { actor, value: 0, call }
    }

    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub id: String,
    pub call: String,
    pub output: serde_json::Value,
}

/// Executes transactions on behalf of actors. Retry policy, if any, lives
/// behind this trait; the core never retries.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    async fn submit(&self, tx: Transaction) -> Result<Receipt>;
}

/// Supplies the identities available to a process.
pub trait AccountProvider: Send + Sync {
    fn accounts(&self) -> Vec<Address>;
}

/// A status request that reached consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightResolution {
    pub flight: Flight,
    pub index: u8,
    pub status: StatusCode,
}

/// Invoked once per resolved status request, after the resolution is
/// recorded. Failures are reported back but never undo the resolution.
pub trait ResolutionListener: Send + Sync {
    fn on_resolved(&self, resolution: &FlightResolution) -> Result<()>;
}
