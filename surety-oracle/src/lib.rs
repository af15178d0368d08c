//! Oracle registration and quorum resolution of flight statuses.
//!
//! A status request fans out to the oracles holding its dispatch index;
//! the first status code reported by `response_threshold` distinct oracles
//! wins and the request closes.

pub mod engine;
pub mod registry;
pub mod request;

pub use engine::{OracleEngine, ResponseOutcome, StatusTicket};
pub use registry::{OracleRecord, OracleRegistry};
pub use request::{FlightStatusRecord, RequestState, StatusRequest};
