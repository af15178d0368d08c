//! Transaction submitters for a single-process deployment.
//!
//! `LocalSubmitter` executes every `Call` against the in-process surety.
//! `Treasury` is the outgoing side: it settles payouts the surety sends.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde_json::json;
use surety_common::{
    ports::{Call, Receipt, Transaction, TransactionSubmitter},
    units::format_units,
    Address, Amount, Result, SuretyError,
};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::surety::FlightSurety;

fn receipt(call: &Call, output: serde_json::Value) -> Receipt {
    Receipt {
        id: Uuid::new_v4().to_string(),
        call: call.name().to_string(),
        output,
    }
}

/// Records value leaving the surety. Can be switched to reject transfers.
#[derive(Default)]
pub struct Treasury {
    paid: Mutex<BTreeMap<Address, Amount>>,
    rejecting: Mutex<Option<String>>,
}

impl Treasury {
    /// Every transfer fails with `reason` until `accept` is called.
    pub async fn reject(&self, reason: impl Into<String>) {
        *self.rejecting.lock().await = Some(reason.into());
    }

    pub async fn accept(&self) {
        *self.rejecting.lock().await = None;
    }

    /// Total transferred out to `to` so far.
    pub async fn paid_to(&self, to: &Address) -> Amount {
        self.paid.lock().await.get(to).copied().unwrap_or(0)
    }

    pub async fn total_paid(&self) -> Amount {
        self.paid.lock().await.values().sum()
    }
}

#[async_trait]
impl TransactionSubmitter for Treasury {
    async fn submit(&self, tx: Transaction) -> Result<Receipt> {
        let Call::Transfer { to } = &tx.call else {
            return Err(SuretyError::Transfer(format!("treasury cannot execute {}", tx.call.name())));
        };
        if let Some(reason) = self.rejecting.lock().await.as_ref() {
            return Err(SuretyError::Transfer(reason.clone()));
        }

        let mut paid = self.paid.lock().await;
        let total = paid.entry(to.clone()).or_insert(0);
        *total += tx.value;
        debug!(from = %tx.actor, to = %to, amount = %format_units(tx.value), "transfer settled");

        Ok(receipt(&tx.call, json!({ "to": to, "amount": tx.value.to_string() })))
    }
}

/// Dispatches transactions onto a `FlightSurety` as their actor.
pub struct LocalSubmitter {
    surety: Arc<FlightSurety>,
    payouts: Arc<dyn TransactionSubmitter>,
}

impl LocalSubmitter {
    pub fn new(surety: Arc<FlightSurety>, payouts: Arc<dyn TransactionSubmitter>) -> Self {
        Self { surety, payouts }
    }

    pub fn surety(&self) -> &Arc<FlightSurety> {
        &self.surety
    }
}

#[async_trait]
impl TransactionSubmitter for LocalSubmitter {
    async fn submit(&self, tx: Transaction) -> Result<Receipt> {
        let Transaction { actor, value, call } = tx;
        debug!(actor = %actor, call = call.name(), value = %format_units(value), "dispatching");

        let output = match &call {
            Call::RegisterAirline { airline } => {
                json!(self.surety.register_airline(&actor, airline)?)
            }
            Call::SubmitFunds => {
                let outcome = self.surety.submit_funds(&actor, value)?;
                json!({
                    "funded": outcome.funded.to_string(),
                    "status": outcome.status,
                    "activated": outcome.activated,
                })
            }
            Call::BuyInsurance { flight } => {
                json!({ "flight_key": self.surety.buy_insurance(&actor, flight, value)? })
            }
            Call::CreditInsurees { flight } => {
                let summary = self.surety.credit_insurees(&actor, flight)?;
                json!({ "credited": summary.credited.len(), "total": summary.total.to_string() })
            }
            Call::PayToInsuree => {
                json!({ "amount": self.surety.pay_to_insuree(&actor).await?.to_string() })
            }
            Call::RegisterOracle => {
                json!({ "indexes": self.surety.register_oracle(&actor, value)? })
            }
            Call::FetchFlightStatus { flight } => {
                json!(self.surety.fetch_flight_status(&actor, flight)?)
            }
            Call::SubmitOracleResponse { index, flight, status } => {
                json!(self.surety.submit_oracle_response(&actor, *index, flight, *status)?)
            }
            Call::SetOperational { operational } => {
                self.surety.set_operational(&actor, *operational)?;
                json!({ "operational": operational })
            }
            Call::Transfer { .. } => {
                if &actor != self.surety.owner() {
                    return Err(SuretyError::Unauthorized(actor));
                }
                let tx = Transaction {
                    actor,
                    value,
                    call: call.clone(),
                };
                return self.payouts.submit(tx).await;
            }
        };

        info!(call = call.name(), "transaction executed");
        Ok(receipt(&call, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_common::{config::SuretyConfig, units::units, Flight};

    fn wiring() -> (LocalSubmitter, Arc<Treasury>, SuretyConfig) {
        let config = SuretyConfig::default();
        let treasury = Arc::new(Treasury::default());
        let surety = Arc::new(FlightSurety::from_config(&config, treasury.clone()).unwrap());
        (LocalSubmitter::new(surety, treasury.clone()), treasury, config)
    }

    #[tokio::test]
    async fn test_calls_run_as_their_actor() {
        let (submitter, _treasury, config) = wiring();
        let seed = config.seed_airlines[0].clone();

        let receipt = submitter
            .submit(Transaction::new(seed.clone(), Call::RegisterAirline { airline: Address::from("0xa2") }))
            .await
            .unwrap();
        assert_eq!(receipt.call, "registerAirline");
        assert!(submitter.surety().is_registered_airline(&Address::from("0xa2")).unwrap());

        // The attached value is the amount funded.
        submitter
            .submit(Transaction::new(seed.clone(), Call::SubmitFunds).with_value(units(10)))
            .await
            .unwrap();
        let flight = Flight::new(seed, "FL9", 9);
        let receipt = submitter
            .submit(
                Transaction::new(Address::from("0xp1"), Call::BuyInsurance { flight: flight.clone() })
                    .with_value(units(1)),
            )
            .await
            .unwrap();
        assert_eq!(receipt.output["flight_key"], json!(flight.key()));
    }

    #[tokio::test]
    async fn test_errors_pass_through_unchanged() {
        let (submitter, _treasury, _config) = wiring();
        let stranger = Address::from("0xstranger");
        let err = submitter
            .submit(Transaction::new(stranger.clone(), Call::RegisterAirline { airline: Address::from("0xa9") }))
            .await
            .unwrap_err();
        assert_eq!(err, SuretyError::NotActive(stranger));
    }

    #[tokio::test]
    async fn test_transfers_only_from_owner() {
        let (submitter, treasury, config) = wiring();
        let to = Address::from("0xp1");

        let err = submitter
            .submit(Transaction::new(to.clone(), Call::Transfer { to: to.clone() }).with_value(5))
            .await
            .unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized(_)));

        submitter
            .submit(Transaction::new(config.owner, Call::Transfer { to: to.clone() }).with_value(5))
            .await
            .unwrap();
        assert_eq!(treasury.paid_to(&to).await, 5);
    }

    #[tokio::test]
    async fn test_rejecting_treasury() {
        let treasury = Treasury::default();
        treasury.reject("offline").await;
        let tx = Transaction::new(Address::from("0xo"), Call::Transfer { to: Address::from("0xp") }).with_value(1);
        assert_eq!(
            treasury.submit(tx.clone()).await.unwrap_err(),
            SuretyError::Transfer("offline".into())
        );

        treasury.accept().await;
        treasury.submit(tx).await.unwrap();
        assert_eq!(treasury.total_paid().await, 1);
    }
}
