//! Typed notifications published by the core.
//!
//! Oracle processes subscribe to `OracleRequest` and answer through the
//! transaction submitter; everything else is informational.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{address::Address, flight::Flight, units::Amount, StatusCode};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SuretyEvent {
    AirlineRegistered { airline: Address, votes: usize },
    AirlineActivated { airline: Address, funded: Amount },
    InsurancePurchased { insuree: Address, flight: Flight, premium: Amount },
    /// Oracles holding `index` are asked to report on `flight`.
    OracleRequest { index: u8, flight: Flight },
    OracleReport { reporter: Address, flight: Flight, status: StatusCode },
    FlightStatusInfo { index: u8, flight: Flight, status: StatusCode },
    InsureeCredited { insuree: Address, flight: Flight, amount: Amount },
    InsureePaid { insuree: Address, amount: Amount },
}

/// Broadcast channel the engines publish to. Cloning yields another handle
/// onto the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SuretyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishing with no live subscriber is not an error.
    pub fn publish(&self, event: SuretyEvent) {
        if self.tx.send(event).is_err() {
            debug!("event dropped: no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuretyEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let flight = Flight::new(Address::from("0xa1"), "FL1", 7);
        bus.publish(SuretyEvent::OracleRequest { index: 3, flight: flight.clone() });

        let expected = SuretyEvent::OracleRequest { index: 3, flight };
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(SuretyEvent::InsureePaid { insuree: Address::from("0x1"), amount: 1 });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
