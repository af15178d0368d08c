//! Authoritative key/value state for airlines, policies, credits and oracles.
//!
//! Every call is atomic and immediately visible to later calls. Compound
//! state transitions go through [`Ledger::transact`], which locks only the
//! keys it names, so unrelated entities never contend.

pub mod accounting;
pub mod key;
pub mod memory;
pub mod store;

pub use accounting::{Account, AccountState, LedgerEntry, Leg, LegKind};
pub use key::LedgerKey;
pub use memory::MemoryLedger;
pub use store::{Batch, Ledger, LedgerExt};
