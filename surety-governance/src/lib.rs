//! Airline admission by multi-party consensus, and activation by funding.

pub mod airline;
pub mod registry;
pub mod tally;

pub use airline::{AirlineRecord, AirlineStatus};
pub use registry::{AirlineRegistry, FundingOutcome};
pub use tally::{Admission, VoteTally};
