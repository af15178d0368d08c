use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surety_common::{
    config::GovernancePolicy,
    events::{EventBus, SuretyEvent},
    units::format_units,
    Address, Amount, Result, SuretyError,
};
use surety_ledger::{Account, Ledger, LedgerEntry, LedgerExt};
use tracing::{info, warn};

use crate::{
    airline::{registered_count_key, AirlineRecord, AirlineStatus},
    tally::{Admission, VoteTally},
};

fn electorate(count: u128) -> Result<usize> {
    usize::try_from(count)
        .map_err(|_| SuretyError::Unavailable(format!("registered airline count {count} out of range")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingOutcome {
    pub funded: Amount,
    pub status: AirlineStatus,
    /// True only on the call that crossed the activation threshold.
    pub activated: bool,
}

/// Admission control and funding for airlines.
pub struct AirlineRegistry {
    ledger: Arc<dyn Ledger>,
    policy: GovernancePolicy,
    tally: VoteTally,
    events: EventBus,
}

impl AirlineRegistry {
    pub fn new(ledger: Arc<dyn Ledger>, policy: GovernancePolicy, events: EventBus) -> Self {
        let tally = VoteTally::new(policy.bootstrap_airlines);
        Self {
            ledger,
            policy,
            tally,
            events,
        }
    }

    /// Admits a genesis airline directly as `Active`. Re-seeding is a no-op.
    pub fn seed(&self, airline: &Address) -> Result<()> {
        let key = AirlineRecord::key(airline);
        let count_key = registered_count_key();

        let seeded = self.ledger.transaction(&[key.clone(), count_key.clone()], |batch| {
            if batch.get(&key)?.is_some() {
                return Ok(false);
            }
            let mut record = AirlineRecord::proposed(airline.clone());
            record.status = AirlineStatus::Active;
            batch.put_as(&key, &record)?;
            batch.increment(&count_key, 1)?;
            Ok(true)
        })?;

        if seeded {
            info!(target: "surety", airline = %airline, "seed airline admitted as active");
        }
        Ok(())
    }

    /// Registers `airline` outright while the electorate is below the
    /// bootstrap size; otherwise records `requester`'s vote and re-evaluates
    /// the quorum. Any registered airline may propose and vote, funded or
    /// not; proposed and unknown requesters get `NotActive`.
    pub fn propose_or_register(&self, airline: &Address, requester: &Address) -> Result<Admission> {
        let airline_key = AirlineRecord::key(airline);
        let requester_key = AirlineRecord::key(requester);
        let count_key = registered_count_key();
        let keys = [airline_key.clone(), requester_key.clone(), count_key.clone()];

        let (admission, newly_registered) = self.ledger.transaction(&keys, |batch| {
            let requester_admitted = batch
                .get_as::<AirlineRecord>(&requester_key)?
                .map(|r| r.status.is_registered())
                .unwrap_or(false);
            if !requester_admitted {
                return Err(SuretyError::NotActive(requester.clone()));
            }
            if airline == requester {
                return Err(SuretyError::SelfVote(requester.clone()));
            }

            let mut record = batch
                .get_as::<AirlineRecord>(&airline_key)?
                .unwrap_or_else(|| AirlineRecord::proposed(airline.clone()));

            // Late votes for an admitted airline converge on the same answer.
            if record.status.is_registered() {
                return Ok((Admission::Registered { votes: record.votes.len() }, false));
            }

            let registered = electorate(batch.counter(&count_key)?)?;
            let admission = if self.tally.needs_consensus(registered) {
                self.tally.cast(&mut record.votes, requester.clone(), registered)
            } else {
                Admission::Registered { votes: record.votes.len() }
            };

            if admission.is_registered() {
                record.status = AirlineStatus::Registered;
                batch.increment(&count_key, 1)?;
            }
            batch.put_as(&airline_key, &record)?;
            Ok((admission, admission.is_registered()))
        })?;

        match admission {
            Admission::Registered { votes } if newly_registered => {
                info!(target: "surety", airline = %airline, by = %requester, votes, "airline registered");
                self.events.publish(SuretyEvent::AirlineRegistered {
                    airline: airline.clone(),
                    votes,
                });
            }
            Admission::Pending { votes, required } => {
                info!(airline = %airline, by = %requester, votes, required, "vote recorded, quorum not reached");
            }
            _ => {}
        }
        Ok(admission)
    }

    /// Adds `amount` to the airline's fund. Crossing the activation
    /// threshold moves it to `Active`; later calls still accumulate.
    pub fn submit_funds(&self, airline: &Address, amount: Amount) -> Result<FundingOutcome> {
        if amount == 0 {
            return Err(SuretyError::InvalidAmount("funding amount must be positive".into()));
        }

        let key = AirlineRecord::key(airline);
        let entry = LedgerEntry::transfer(
            Account::External(airline.clone()),
            Account::Pool,
            amount,
            format!("airline fund {}", airline),
        );
        let mut keys = entry.keys();
        keys.push(key.clone());

        let outcome = self.ledger.transaction(&keys, |batch| {
            let mut record = match batch.get_as::<AirlineRecord>(&key)? {
                Some(r) if r.status.is_registered() => r,
                _ => return Err(SuretyError::UnknownAirline(airline.clone())),
            };

            record.funded = record
                .funded
                .checked_add(amount)
                .ok_or_else(|| SuretyError::InvalidAmount("funded amount overflow".into()))?;

            let activated = record.status == AirlineStatus::Registered
                && record.funded >= self.policy.activation_threshold;
            if activated {
                record.status = AirlineStatus::Active;
            }

            batch.post(&entry)?;
            batch.put_as(&key, &record)?;
            Ok(FundingOutcome {
                funded: record.funded,
                status: record.status,
                activated,
            })
        });

        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                warn!(airline = %airline, error = %e, "funding rejected");
                return Err(e);
            }
        };

        if outcome.activated {
            info!(target: "surety", airline = %airline, funded = %format_units(outcome.funded), "airline activated");
            self.events.publish(SuretyEvent::AirlineActivated {
                airline: airline.clone(),
                funded: outcome.funded,
            });
        }
        Ok(outcome)
    }

    pub fn airline(&self, airline: &Address) -> Result<Option<AirlineRecord>> {
        self.ledger.get_as(&AirlineRecord::key(airline))
    }

    pub fn is_registered(&self, airline: &Address) -> Result<bool> {
        Ok(self
            .airline(airline)?
            .map(|r| r.status.is_registered())
            .unwrap_or(false))
    }

    pub fn is_active(&self, airline: &Address) -> Result<bool> {
        Ok(self
            .airline(airline)?
            .map(|r| r.status == AirlineStatus::Active)
            .unwrap_or(false))
    }

    pub fn registered_count(&self) -> Result<usize> {
        electorate(self.ledger.counter(&registered_count_key())?)
    }

    /// Every airline record, proposed ones included, ordered by address.
    pub fn airlines(&self) -> Result<Vec<AirlineRecord>> {
        self.ledger
            .scan_prefix("airline:")?
            .into_iter()
            .map(|(key, _)| {
                self.ledger
                    .get_as::<AirlineRecord>(&key)?
                    .ok_or_else(|| SuretyError::Unavailable(format!("{key} vanished")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use surety_common::units::units;
    use surety_ledger::MemoryLedger;

    fn addr(n: u8) -> Address {
        Address::from(format!("0xa{n}"))
    }

    fn registry() -> AirlineRegistry {
        let registry = AirlineRegistry::new(
            Arc::new(MemoryLedger::new()),
            GovernancePolicy::default(),
            EventBus::default(),
        );
        registry.seed(&addr(1)).unwrap();
        registry
    }

    /// Seeds A1 and registers A2..=A4 through the bootstrap path.
    fn bootstrapped() -> AirlineRegistry {
        let registry = registry();
        for n in 2..=4 {
            let admission = registry.propose_or_register(&addr(n), &addr(1)).unwrap();
            assert!(admission.is_registered());
        }
        registry
    }

    #[test]
    fn test_bootstrap_registers_without_votes() {
        let registry = bootstrapped();
        assert_eq!(registry.registered_count().unwrap(), 4);
        for n in 2..=4 {
            let record = registry.airline(&addr(n)).unwrap().unwrap();
            assert_eq!(record.status, AirlineStatus::Registered);
            assert!(record.votes.is_empty());
        }
    }

    #[test]
    fn test_fifth_airline_needs_half_of_electorate() {
        let registry = bootstrapped();

        let first = registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        assert_eq!(first, Admission::Pending { votes: 1, required: 2 });
        assert!(!registry.is_registered(&addr(5)).unwrap());

        // A2 never funded, yet its vote counts.
        let second = registry.propose_or_register(&addr(5), &addr(2)).unwrap();
        assert_eq!(second, Admission::Registered { votes: 2 });
        assert!(registry.is_registered(&addr(5)).unwrap());
        assert_eq!(registry.registered_count().unwrap(), 5);
    }

    #[test]
    fn test_denominator_follows_current_electorate() {
        let registry = bootstrapped();
        registry.submit_funds(&addr(2), units(10)).unwrap();
        registry.submit_funds(&addr(3), units(10)).unwrap();

        registry.propose_or_register(&addr(6), &addr(1)).unwrap();
        registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        registry.propose_or_register(&addr(5), &addr(2)).unwrap();
        assert_eq!(registry.registered_count().unwrap(), 5);

        // Two votes were enough at N=4; at N=5 airline 6 needs three.
        let second = registry.propose_or_register(&addr(6), &addr(2)).unwrap();
        assert_eq!(second, Admission::Pending { votes: 2, required: 3 });
        let third = registry.propose_or_register(&addr(6), &addr(3)).unwrap();
        assert!(third.is_registered());
    }

    #[test]
    fn test_repeated_vote_is_idempotent() {
        let registry = bootstrapped();
        registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        let again = registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        assert_eq!(again, Admission::Pending { votes: 1, required: 2 });
    }

    #[test]
    fn test_requester_must_be_registered() {
        let registry = registry();
        // Registered but unfunded airlines may propose during bootstrap.
        registry.propose_or_register(&addr(2), &addr(1)).unwrap();
        assert!(registry.propose_or_register(&addr(3), &addr(2)).unwrap().is_registered());
        registry.propose_or_register(&addr(4), &addr(3)).unwrap();

        let err = registry.propose_or_register(&addr(5), &addr(9)).unwrap_err();
        assert_eq!(err, SuretyError::NotActive(addr(9)));
        assert!(registry.airline(&addr(5)).unwrap().is_none());

        // Proposed but not yet admitted.
        registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        let err = registry.propose_or_register(&addr(6), &addr(5)).unwrap_err();
        assert_eq!(err, SuretyError::NotActive(addr(5)));
    }

    #[test]
    fn test_airline_cannot_vote_for_itself() {
        let registry = registry();
        let err = registry.propose_or_register(&addr(1), &addr(1)).unwrap_err();
        assert_eq!(err, SuretyError::SelfVote(addr(1)));
    }

    #[test]
    fn test_late_vote_after_registration_is_noop() {
        let registry = bootstrapped();
        let admission = registry.propose_or_register(&addr(2), &addr(1)).unwrap();
        assert!(admission.is_registered());
        assert_eq!(registry.registered_count().unwrap(), 4);
    }

    #[test]
    fn test_funding_activates_exactly_once() {
        let registry = bootstrapped();

        let partial = registry.submit_funds(&addr(4), units(1)).unwrap();
        assert_eq!(partial.status, AirlineStatus::Registered);
        assert!(!partial.activated);

        let full = registry.submit_funds(&addr(4), units(9)).unwrap();
        assert_eq!(full.status, AirlineStatus::Active);
        assert!(full.activated);

        let extra = registry.submit_funds(&addr(4), units(2)).unwrap();
        assert_eq!(extra.status, AirlineStatus::Active);
        assert!(!extra.activated);
        assert_eq!(extra.funded, units(12));
    }

    #[test]
    fn test_funding_below_threshold_never_activates() {
        let registry = bootstrapped();
        for _ in 0..9 {
            registry.submit_funds(&addr(3), units(1)).unwrap();
        }
        assert!(!registry.is_active(&addr(3)).unwrap());
    }

    #[test]
    fn test_funding_rejects_unknown_and_proposed_airlines() {
        let registry = bootstrapped();
        registry.propose_or_register(&addr(5), &addr(1)).unwrap();

        assert_eq!(
            registry.submit_funds(&addr(5), units(10)).unwrap_err(),
            SuretyError::UnknownAirline(addr(5))
        );
        assert_eq!(
            registry.submit_funds(&addr(8), units(10)).unwrap_err(),
            SuretyError::UnknownAirline(addr(8))
        );
        assert!(matches!(
            registry.submit_funds(&addr(2), 0),
            Err(SuretyError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_concurrent_votes_register_once() {
        let registry = Arc::new(bootstrapped());
        for n in 2..=4 {
            registry.submit_funds(&addr(n), units(10)).unwrap();
        }

        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.propose_or_register(&addr(7), &addr(n)).unwrap())
            })
            .collect();
        let results: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(results.iter().filter(|a| a.is_registered()).count() >= 3);
        assert_eq!(registry.registered_count().unwrap(), 5);
        assert_eq!(
            registry.airline(&addr(7)).unwrap().unwrap().status,
            AirlineStatus::Registered
        );
    }

    #[test]
    fn test_concurrent_funding_activates_once() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let registry = AirlineRegistry::new(Arc::new(MemoryLedger::new()), GovernancePolicy::default(), events);
        registry.seed(&addr(1)).unwrap();
        registry.propose_or_register(&addr(2), &addr(1)).unwrap();
        let registry = Arc::new(registry);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.submit_funds(&addr(2), units(1)).unwrap())
            })
            .collect();
        let outcomes: Vec<FundingOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(outcomes.iter().filter(|o| o.activated).count(), 1);
        let record = registry.airline(&addr(2)).unwrap().unwrap();
        assert_eq!(record.funded, units(10));
        assert_eq!(record.status, AirlineStatus::Active);

        let mut activations = 0;
        while let Ok(event) = rx.try_recv() {
            if let SuretyEvent::AirlineActivated { airline, funded } = event {
                assert_eq!((airline, funded), (addr(2), units(10)));
                activations += 1;
            }
        }
        assert_eq!(activations, 1);
    }

    #[test]
    fn test_electorate_out_of_range() {
        assert_eq!(electorate(4).unwrap(), 4);
        if usize::BITS < u128::BITS {
            assert!(matches!(electorate(u128::MAX), Err(SuretyError::Unavailable(_))));
        }
    }

    #[test]
    fn test_airlines_listing() {
        let registry = bootstrapped();
        registry.propose_or_register(&addr(5), &addr(1)).unwrap();
        let all = registry.airlines().unwrap();
        assert_eq!(all.len(), 5);
        assert_eq!(all.iter().filter(|r| r.status.is_registered()).count(), 4);
    }
}
