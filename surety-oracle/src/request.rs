use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use surety_common::{Address, Flight, FlightKey, StatusCode};
use surety_ledger::LedgerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Open,
    Resolved(StatusCode),
}

/// One outstanding question about a flight, identified by its dispatch
/// index. Reporters are tallied per status code; a reporter that changes
/// its answer is counted under every code it reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub flight: Flight,
    pub index: u8,
    pub requester: Address,
    pub responses: BTreeMap<StatusCode, BTreeSet<Address>>,
    pub state: RequestState,
}

impl StatusRequest {
    pub fn open(flight: Flight, index: u8, requester: Address) -> Self {
        Self {
            flight,
            index,
            requester,
            responses: BTreeMap::new(),
            state: RequestState::Open,
        }
    }

    pub fn key(flight_key: &FlightKey, index: u8) -> LedgerKey {
        LedgerKey::path(&["request", flight_key.as_str(), &index.to_string()])
    }

    pub fn is_open(&self) -> bool {
        self.state == RequestState::Open
    }

    /// Adds `reporter` to the tally for `status` and returns that tally.
    pub fn record(&mut self, reporter: &Address, status: StatusCode) -> usize {
        let voters = self.responses.entry(status).or_default();
        voters.insert(reporter.clone());
        voters.len()
    }

    pub fn tally(&self, status: StatusCode) -> usize {
        self.responses.get(&status).map_or(0, BTreeSet::len)
    }
}

/// Final status recorded for a flight, whichever request resolved it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightStatusRecord {
    pub index: u8,
    pub status: StatusCode,
}

impl FlightStatusRecord {
    pub fn key(flight_key: &FlightKey) -> LedgerKey {
        LedgerKey::path(&["flight-status", flight_key.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeat_reporter_counts_once() {
        let flight = Flight::new(Address::from("0xa1"), "FL1", 1);
        let mut request = StatusRequest::open(flight, 4, Address::from("0xp1"));
        let oracle = Address::from("0x01");

        assert_eq!(request.record(&oracle, StatusCode::LATE_AIRLINE), 1);
        assert_eq!(request.record(&oracle, StatusCode::LATE_AIRLINE), 1);
        assert_eq!(request.record(&oracle, StatusCode::ON_TIME), 1);
        assert_eq!(request.tally(StatusCode::LATE_AIRLINE), 1);
        assert_eq!(request.tally(StatusCode::LATE_WEATHER), 0);
    }
}
