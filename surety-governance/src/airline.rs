use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use surety_common::{Address, Amount};
use surety_ledger::LedgerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AirlineStatus {
    /// Awaiting enough votes.
    Proposed,
    Registered,
    /// Funded past the activation threshold; may vote and sell insurance.
    Active,
}

impl AirlineStatus {
    pub fn is_registered(&self) -> bool {
        matches!(self, AirlineStatus::Registered | AirlineStatus::Active)
    }
}

/// Ledger record of an airline. Created on first proposal, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirlineRecord {
    pub address: Address,
    pub status: AirlineStatus,
    pub funded: Amount,
    pub votes: BTreeSet<Address>,
}

impl AirlineRecord {
    pub fn proposed(address: Address) -> Self {
        Self {
            address,
            status: AirlineStatus::Proposed,
            funded: 0,
            votes: BTreeSet::new(),
        }
    }

    pub fn key(address: &Address) -> LedgerKey {
        LedgerKey::path(&["airline", address.as_str()])
    }
}

/// Counter of airlines in `Registered` or `Active`; the voting denominator.
pub fn registered_count_key() -> LedgerKey {
    LedgerKey::path(&["governance", "registered-count"])
}
