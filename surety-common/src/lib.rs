//! Types shared by every surety crate: identities, flights, amounts,
//! the error taxonomy, events and the ports the core consumes.

pub mod address;
pub mod config;
pub mod error;
pub mod events;
pub mod flight;
pub mod ports;
pub mod units;

pub use address::Address;
pub use error::{Result, SuretyError};
pub use flight::{Flight, FlightKey, StatusCode};
pub use units::Amount;
