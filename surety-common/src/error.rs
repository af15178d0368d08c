use thiserror::Error;

use crate::address::Address;

pub type Result<T> = std::result::Result<T, SuretyError>;

/// Every failure a surety operation can report to its caller.
///
/// A failed call leaves the ledger exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuretyError {
    /// The requesting airline exists but has not reached `Active`.
    #[error("Requester {0} is not an active airline")]
    NotActive(Address),

    #[error("Airline {0} is not registered")]
    UnknownAirline(Address),

    #[error("Airline {0} is not active and cannot sell insurance")]
    AirlineNotActive(Address),

    #[error("Insuree {insuree} already holds an open policy for flight {flight}")]
    DuplicatePolicy { insuree: Address, flight: String },

    #[error("Insuree {0} has no credit to withdraw")]
    NoCredit(Address),

    #[error("{0} is already registered")]
    AlreadyRegistered(Address),

    #[error("Index {index} does not match an open request held by {reporter}")]
    IndexMismatch { reporter: Address, index: u8 },

    #[error("Status request for flight {flight} (index {index}) is already resolved")]
    RequestClosed { flight: String, index: u8 },

    #[error("Airline {0} cannot vote for itself")]
    SelfVote(Address),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Registration fee too low: required {required}, got {provided}")]
    InsufficientFee { required: u128, provided: u128 },

    #[error("Insufficient funds in account {account}: balance {balance}, needed {needed}")]
    InsufficientFunds { account: String, balance: u128, needed: u128 },

    #[error("Surety is not operational")]
    NotOperational,

    #[error("Caller {0} is not authorized for this operation")]
    Unauthorized(Address),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Invalid config: {0}")]
    Config(String),

    /// The ledger could not serve the call (poisoned lock, undecodable value).
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}
