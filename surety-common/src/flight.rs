use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::address::Address;

/// A scheduled flight: the three components every policy and status
/// request is correlated by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Flight {
    pub airline: Address,
    pub code: String,
    pub timestamp: u64,
}

impl Flight {
    pub fn new(airline: Address, code: impl Into<String>, timestamp: u64) -> Self {
        Self {
            airline,
            code: code.into(),
            timestamp,
        }
    }

    pub fn key(&self) -> FlightKey {
        FlightKey::derive(&self.airline, &self.code, self.timestamp)
    }
}

impl fmt::Display for Flight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.code, self.timestamp, self.airline)
    }
}

/// Hex digest of (airline, flight code, timestamp).
///
/// Components are length-prefixed before hashing so that no two distinct
/// triples can collide by shifting bytes between fields.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlightKey(String);

impl FlightKey {
    pub fn derive(airline: &Address, code: &str, timestamp: u64) -> Self {
        let mut hasher = Sha256::new();
        for part in [airline.as_bytes(), code.as_bytes()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part);
        }
        hasher.update(timestamp.to_be_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Flight status code as reported by oracles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u8);

impl StatusCode {
    pub const UNKNOWN: StatusCode = StatusCode(0);
    pub const ON_TIME: StatusCode = StatusCode(10);
    pub const LATE_AIRLINE: StatusCode = StatusCode(20);
    pub const LATE_WEATHER: StatusCode = StatusCode(30);
    pub const LATE_TECHNICAL: StatusCode = StatusCode(40);
    pub const LATE_OTHER: StatusCode = StatusCode(50);

    /// Codes that mean the delay is the airline's fault and insurees get paid.
    pub const AIRLINE_FAULT: RangeInclusive<u8> = 20..=29;

    pub const KNOWN: [StatusCode; 6] = [
        Self::UNKNOWN,
        Self::ON_TIME,
        Self::LATE_AIRLINE,
        Self::LATE_WEATHER,
        Self::LATE_TECHNICAL,
        Self::LATE_OTHER,
    ];

    pub fn is_airline_fault(&self) -> bool {
        Self::AIRLINE_FAULT.contains(&self.0)
    }

    pub fn label(&self) -> &'static str {
        match self.0 {
            0 => "unknown",
            10 => "on-time",
            20 => "late-airline",
            30 => "late-weather",
            40 => "late-technical",
            50 => "late-other",
            _ => "unrecognized",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.label())
    }
}
