use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use surety_common::{Address, Amount, Flight, FlightKey};
use surety_ledger::LedgerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyStatus {
    Active,
    Credited,
    Paid,
}

impl PolicyStatus {
    /// Active and credited policies block a second purchase of the same tuple.
    pub fn is_open(&self) -> bool {
        matches!(self, PolicyStatus::Active | PolicyStatus::Credited)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub flight: Flight,
    pub flight_key: FlightKey,
    pub insuree: Address,
    pub premium: Amount,
    pub status: PolicyStatus,
    /// Amount credited on resolution; zero until then.
    pub payout: Amount,
}

impl InsurancePolicy {
    pub fn key(flight_key: &FlightKey, insuree: &Address) -> LedgerKey {
        LedgerKey::path(&["policy", flight_key.as_str(), insuree.as_str()])
    }
}

/// Insurees holding a policy on a flight.
pub type FlightInsurees = BTreeSet<Address>;

pub fn flight_insurees_key(flight_key: &FlightKey) -> LedgerKey {
    LedgerKey::path(&["flight-insurees", flight_key.as_str()])
}

/// Flights on which an insuree holds credited, not yet withdrawn policies.
pub type CreditedFlights = BTreeSet<FlightKey>;

pub fn credited_flights_key(insuree: &Address) -> LedgerKey {
    LedgerKey::path(&["credited-flights", insuree.as_str()])
}
