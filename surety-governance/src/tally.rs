use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use surety_common::Address;

/// Result of a propose-or-register call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Admission {
    Registered { votes: usize },
    Pending { votes: usize, required: usize },
}

impl Admission {
    pub fn is_registered(&self) -> bool {
        matches!(self, Admission::Registered { .. })
    }
}

/// Quorum rule for admitting airlines once the bootstrap phase is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoteTally {
    pub bootstrap_airlines: usize,
}

impl VoteTally {
    pub fn new(bootstrap_airlines: usize) -> Self {
        Self { bootstrap_airlines }
    }

    pub fn needs_consensus(&self, registered: usize) -> bool {
        registered >= self.bootstrap_airlines
    }

    /// ceil(registered / 2).
    pub fn required_votes(&self, registered: usize) -> usize {
        registered.div_ceil(2)
    }

    /// Adds `voter` (a no-op if already present) and evaluates quorum
    /// against the electorate size at this moment.
    pub fn cast(&self, votes: &mut BTreeSet<Address>, voter: Address, registered: usize) -> Admission {
        votes.insert(voter);
        let required = self.required_votes(registered);
        if votes.len() >= required {
            Admission::Registered { votes: votes.len() }
        } else {
            Admission::Pending { votes: votes.len(), required }
        }
    }
}
