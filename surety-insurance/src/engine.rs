use std::sync::Arc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use surety_common::{
    config::InsurancePolicyTerms,
    events::{EventBus, SuretyEvent},
    ports::{Call, Transaction, TransactionSubmitter},
    units::format_units,
    Address, Amount, Flight, FlightKey, Result, SuretyError,
};
use surety_governance::{AirlineRecord, AirlineStatus};
use surety_ledger::{Account, AccountState, Batch, Ledger, LedgerEntry, LedgerExt, LedgerKey};
use tracing::{debug, info, warn};

use crate::policy::{
    credited_flights_key, flight_insurees_key, CreditedFlights, FlightInsurees, InsurancePolicy,
    PolicyStatus,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditSummary {
    pub flight_key: Option<FlightKey>,
    pub credited: Vec<(Address, Amount)>,
    pub total: Amount,
}

/// Credit taken out of the ledger, awaiting the external transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Withdrawal {
    insuree: Address,
    amount: Amount,
    flights: CreditedFlights,
}

pub struct InsuranceEngine {
    ledger: Arc<dyn Ledger>,
    terms: InsurancePolicyTerms,
    events: EventBus,
    submitter: Arc<dyn TransactionSubmitter>,
    /// Actor that outgoing payouts are submitted as.
    treasury: Address,
}

impl InsuranceEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        terms: InsurancePolicyTerms,
        events: EventBus,
        submitter: Arc<dyn TransactionSubmitter>,
        treasury: Address,
    ) -> Self {
        Self {
            ledger,
            terms,
            events,
            submitter,
            treasury,
        }
    }

    /// Runs `f` over the keys derived from the set stored at `index_key`.
    /// If the set changed between the read and the lock, start over.
    fn with_index<I, R, K, F>(&self, index_key: &LedgerKey, keys_for: K, mut f: F) -> Result<R>
    where
        I: DeserializeOwned + Default + PartialEq,
        K: Fn(&I) -> Vec<LedgerKey>,
        F: FnMut(&mut Batch, &I) -> Result<R>,
    {
        loop {
            let seen: I = self.ledger.get_as(index_key)?.unwrap_or_default();
            let mut keys = keys_for(&seen);
            keys.push(index_key.clone());

            let outcome = self.ledger.transaction(&keys, |batch| {
                let current: I = batch.get_as(index_key)?.unwrap_or_default();
                if current != seen {
                    return Ok(None);
                }
                f(batch, &seen).map(Some)
            })?;

            match outcome {
                Some(r) => return Ok(r),
                None => debug!(index = %index_key, "index moved under us, retrying"),
            }
        }
    }

    /// Sells a policy on `flight` to `insuree`, escrowing the premium.
    pub fn buy_insurance(&self, insuree: &Address, flight: &Flight, premium: Amount) -> Result<FlightKey> {
        if premium == 0 || premium > self.terms.max_premium {
            return Err(SuretyError::InvalidAmount(format!(
                "premium must be within 1..={} base units, got {}",
                self.terms.max_premium, premium
            )));
        }

        let flight_key = flight.key();
        let airline_key = AirlineRecord::key(&flight.airline);
        let policy_key = InsurancePolicy::key(&flight_key, insuree);
        let index_key = flight_insurees_key(&flight_key);
        let entry = LedgerEntry::transfer(
            Account::External(insuree.clone()),
            Account::Pool,
            premium,
            format!("premium {} {}", flight, insuree),
        );

        let mut keys = entry.keys();
        keys.extend([airline_key.clone(), policy_key.clone(), index_key.clone()]);

        let result = self.ledger.transaction(&keys, |batch| {
            let active = batch
                .get_as::<AirlineRecord>(&airline_key)?
                .map(|r| r.status == AirlineStatus::Active)
                .unwrap_or(false);
            if !active {
                return Err(SuretyError::AirlineNotActive(flight.airline.clone()));
            }

            if let Some(existing) = batch.get_as::<InsurancePolicy>(&policy_key)? {
                if existing.status.is_open() {
                    return Err(SuretyError::DuplicatePolicy {
                        insuree: insuree.clone(),
                        flight: flight.to_string(),
                    });
                }
            }

            let policy = InsurancePolicy {
                flight: flight.clone(),
                flight_key: flight_key.clone(),
                insuree: insuree.clone(),
                premium,
                status: PolicyStatus::Active,
                payout: 0,
            };

            let mut insurees: FlightInsurees = batch.get_as(&index_key)?.unwrap_or_default();
            insurees.insert(insuree.clone());

            batch.post(&entry)?;
            batch.put_as(&policy_key, &policy)?;
            batch.put_as(&index_key, &insurees)?;
            Ok(())
        });

        if let Err(e) = result {
            warn!(insuree = %insuree, flight = %flight, error = %e, "policy purchase rejected");
            return Err(e);
        }

        info!(target: "surety", insuree = %insuree, flight = %flight, premium = %format_units(premium), "policy purchased");
        self.events.publish(SuretyEvent::InsurancePurchased {
            insuree: insuree.clone(),
            flight: flight.clone(),
            premium,
        });
        Ok(flight_key)
    }

    /// Credits every still-active policy on `flight` with the payout.
    /// Already credited policies are skipped, so repeated calls add nothing.
    /// Payouts are owed by the pool whatever it holds; a pool that cannot
    /// cover them runs a shortfall.
    pub fn credit_insurees(&self, flight: &Flight) -> Result<CreditSummary> {
        let flight_key = flight.key();
        let index_key = flight_insurees_key(&flight_key);

        let keys_for = |insurees: &FlightInsurees| {
            let mut keys = vec![Account::Pool.key()];
            for insuree in insurees {
                keys.push(InsurancePolicy::key(&flight_key, insuree));
                keys.push(Account::Credit(insuree.clone()).key());
                keys.push(credited_flights_key(insuree));
            }
            keys
        };

        let summary = self.with_index(&index_key, keys_for, |batch, insurees: &FlightInsurees| {
            let mut summary = CreditSummary {
                flight_key: Some(flight_key.clone()),
                ..Default::default()
            };

            for insuree in insurees {
                let policy_key = InsurancePolicy::key(&flight_key, insuree);
                let Some(mut policy) = batch.get_as::<InsurancePolicy>(&policy_key)? else {
                    continue;
                };
                if policy.status != PolicyStatus::Active {
                    continue;
                }

                let payout = self.terms.payout_for(policy.premium);
                let entry = LedgerEntry::transfer(
                    Account::Pool,
                    Account::Credit(insuree.clone()),
                    payout,
                    format!("payout {} {}", flight, insuree),
                );
                batch.post_owed(&entry)?;

                policy.status = PolicyStatus::Credited;
                policy.payout = payout;
                batch.put_as(&policy_key, &policy)?;

                let credited_key = credited_flights_key(insuree);
                let mut flights: CreditedFlights = batch.get_as(&credited_key)?.unwrap_or_default();
                flights.insert(flight_key.clone());
                batch.put_as(&credited_key, &flights)?;

                summary.total = summary.total.saturating_add(payout);
                summary.credited.push((insuree.clone(), payout));
            }
            Ok(summary)
        })?;

        for (insuree, amount) in &summary.credited {
            info!(target: "surety", insuree = %insuree, flight = %flight, amount = %format_units(*amount), "insuree credited");
            self.events.publish(SuretyEvent::InsureeCredited {
                insuree: insuree.clone(),
                flight: flight.clone(),
                amount: *amount,
            });
        }
        if summary.credited.is_empty() {
            debug!(flight = %flight, "no active policies to credit");
        }
        Ok(summary)
    }

    /// Zeroes the insuree's credit and marks the credited policies paid,
    /// in one atomic step.
    fn withdraw(&self, insuree: &Address) -> Result<Withdrawal> {
        let credit = Account::Credit(insuree.clone());
        let index_key = credited_flights_key(insuree);

        let keys_for = |flights: &CreditedFlights| {
            let mut keys = vec![credit.key()];
            keys.extend(flights.iter().map(|fk| InsurancePolicy::key(fk, insuree)));
            keys
        };

        self.with_index(&index_key, keys_for, |batch, flights: &CreditedFlights| {
            let balance = batch.account(&credit)?.balance;
            if balance == 0 {
                return Err(SuretyError::NoCredit(insuree.clone()));
            }

            let entry = LedgerEntry::transfer(
                credit.clone(),
                Account::External(insuree.clone()),
                balance,
                format!("withdrawal {}", insuree),
            );
            batch.post(&entry)?;

            for fk in flights {
                let key = InsurancePolicy::key(fk, insuree);
                if let Some(mut policy) = batch.get_as::<InsurancePolicy>(&key)? {
                    if policy.status == PolicyStatus::Credited {
                        policy.status = PolicyStatus::Paid;
                        batch.put_as(&key, &policy)?;
                    }
                }
            }
            batch.put_as(&index_key, &CreditedFlights::new())?;

            Ok(Withdrawal {
                insuree: insuree.clone(),
                amount: balance,
                flights: flights.clone(),
            })
        })
    }

    /// Puts a withdrawal back after the external transfer failed.
    fn restore(&self, withdrawal: &Withdrawal) -> Result<()> {
        let insuree = &withdrawal.insuree;
        let credit = Account::Credit(insuree.clone());
        let index_key = credited_flights_key(insuree);

        let mut keys = vec![credit.key(), index_key.clone()];
        keys.extend(withdrawal.flights.iter().map(|fk| InsurancePolicy::key(fk, insuree)));

        self.ledger.transaction(&keys, |batch| {
            let entry = LedgerEntry::transfer(
                Account::External(insuree.clone()),
                credit.clone(),
                withdrawal.amount,
                format!("reversed withdrawal {}", insuree),
            );
            batch.post(&entry)?;

            for fk in &withdrawal.flights {
                let key = InsurancePolicy::key(fk, insuree);
                if let Some(mut policy) = batch.get_as::<InsurancePolicy>(&key)? {
                    if policy.status == PolicyStatus::Paid {
                        policy.status = PolicyStatus::Credited;
                        batch.put_as(&key, &policy)?;
                    }
                }
            }

            let mut flights: CreditedFlights = batch.get_as(&index_key)?.unwrap_or_default();
            flights.extend(withdrawal.flights.iter().cloned());
            batch.put_as(&index_key, &flights)
        })
    }

    /// Transfers the insuree's whole credit balance out and resets it to
    /// zero. Two concurrent calls never both see a non-zero balance.
    pub async fn pay_to_insuree(&self, insuree: &Address) -> Result<Amount> {
        let withdrawal = match self.withdraw(insuree) {
            Ok(w) => w,
            Err(e) => {
                warn!(insuree = %insuree, error = %e, "withdrawal rejected");
                return Err(e);
            }
        };

        let tx = Transaction::new(self.treasury.clone(), Call::Transfer { to: insuree.clone() })
            .with_value(withdrawal.amount);

        match self.submitter.submit(tx).await {
            Ok(receipt) => {
                info!(target: "surety", insuree = %insuree, amount = %format_units(withdrawal.amount), receipt = %receipt.id, "insuree paid");
                self.events.publish(SuretyEvent::InsureePaid {
                    insuree: insuree.clone(),
                    amount: withdrawal.amount,
                });
                Ok(withdrawal.amount)
            }
            Err(e) => {
                warn!(insuree = %insuree, error = %e, "payout transfer failed, restoring credit");
                self.restore(&withdrawal)?;
                Err(match e {
                    SuretyError::Transfer(reason) => SuretyError::Transfer(reason),
                    other => SuretyError::Transfer(other.to_string()),
                })
            }
        }
    }

    pub fn policy(&self, flight: &Flight, insuree: &Address) -> Result<Option<InsurancePolicy>> {
        self.ledger.get_as(&InsurancePolicy::key(&flight.key(), insuree))
    }

    pub fn policies_for(&self, flight: &Flight) -> Result<Vec<InsurancePolicy>> {
        let flight_key = flight.key();
        let insurees: FlightInsurees = self
            .ledger
            .get_as(&flight_insurees_key(&flight_key))?
            .unwrap_or_default();

        let mut policies = Vec::with_capacity(insurees.len());
        for insuree in &insurees {
            if let Some(p) = self.ledger.get_as(&InsurancePolicy::key(&flight_key, insuree))? {
                policies.push(p);
            }
        }
        Ok(policies)
    }

    pub fn credit_balance(&self, insuree: &Address) -> Result<Amount> {
        Ok(self
            .ledger
            .get_as::<AccountState>(&Account::Credit(insuree.clone()).key())?
            .map(|s| s.balance)
            .unwrap_or(0))
    }

    pub fn pool_balance(&self) -> Result<Amount> {
        Ok(self
            .ledger
            .get_as::<AccountState>(&Account::Pool.key())?
            .map(|s| s.balance)
            .unwrap_or(0))
    }

    /// Payouts credited beyond what the pool held.
    pub fn pool_shortfall(&self) -> Result<Amount> {
        Ok(self
            .ledger
            .get_as::<AccountState>(&Account::Pool.key())?
            .map(|s| s.shortfall)
            .unwrap_or(0))
    }
}
