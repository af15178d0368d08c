use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use surety_common::{
    events::SuretyEvent,
    ports::{AccountProvider, Call, Transaction, TransactionSubmitter},
    Address, Amount, Flight, Result, StatusCode, SuretyError,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

/// How a simulated oracle decides what to report.
pub enum Responder {
    Fixed(StatusCode),
    Random(Mutex<StdRng>),
}

impl Responder {
    pub fn random(seed: u64) -> Self {
        Responder::Random(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    pub fn answer(&self) -> StatusCode {
        match self {
            Responder::Fixed(status) => *status,
            Responder::Random(rng) => match rng.lock() {
                Ok(mut rng) => StatusCode::KNOWN
                    .choose(&mut *rng)
                    .copied()
                    .unwrap_or(StatusCode::UNKNOWN),
                Err(_) => StatusCode::UNKNOWN,
            },
        }
    }
}

/// A set of registered oracle identities that answer `OracleRequest`
/// events through a transaction submitter.
pub struct OraclePool {
    submitter: Arc<dyn TransactionSubmitter>,
    oracles: Vec<(Address, Vec<u8>)>,
    responder: Responder,
}

impl OraclePool {
    /// Registers every account as an oracle, paying `fee` each.
    pub async fn register(
        submitter: Arc<dyn TransactionSubmitter>,
        accounts: &dyn AccountProvider,
        fee: Amount,
        responder: Responder,
    ) -> Result<Self> {
        let mut oracles = Vec::new();
        for account in accounts.accounts() {
            let tx = Transaction::new(account.clone(), Call::RegisterOracle).with_value(fee);
            let receipt = submitter.submit(tx).await?;
            let indexes: Vec<u8> = serde_json::from_value(receipt.output["indexes"].clone())
                .map_err(|e| SuretyError::Unavailable(format!("malformed registration receipt: {e}")))?;
            debug!(oracle = %account, ?indexes, "oracle ready");
            oracles.push((account, indexes));
        }
        info!(count = oracles.len(), "oracle pool registered");

        Ok(Self {
            submitter,
            oracles,
            responder,
        })
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    /// Oracles assigned `index`.
    pub fn holders(&self, index: u8) -> impl Iterator<Item = &Address> {
        self.oracles
            .iter()
            .filter(move |(_, indexes)| indexes.contains(&index))
            .map(|(address, _)| address)
    }

    /// Has every oracle holding `index` report on `flight`. Returns the
    /// number of accepted responses.
    pub async fn answer(&self, index: u8, flight: &Flight) -> usize {
        let mut accepted = 0;
        for oracle in self.holders(index) {
            let status = self.responder.answer();
            let call = Call::SubmitOracleResponse {
                index,
                flight: flight.clone(),
                status,
            };
            match self.submitter.submit(Transaction::new(oracle.clone(), call)).await {
                Ok(_) => {
                    accepted += 1;
                    debug!(oracle = %oracle, flight = %flight.code, index, %status, "response submitted");
                }
                Err(SuretyError::RequestClosed { .. }) => {
                    debug!(oracle = %oracle, flight = %flight.code, index, "request already closed");
                }
                Err(e) => warn!(oracle = %oracle, flight = %flight.code, index, error = %e, "response rejected"),
            }
        }
        accepted
    }

    /// Answers requests from `events` until the channel closes.
    pub fn spawn(self: Arc<Self>, mut events: broadcast::Receiver<SuretyEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SuretyEvent::OracleRequest { index, flight }) => {
                        let accepted = self.answer(index, &flight).await;
                        info!(flight = %flight.code, index, accepted, "oracle request answered");
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "oracle pool lagging behind events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("event channel closed, oracle pool stopping");
                        break;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_responder_repeats() {
        let a = Responder::random(5);
        let b = Responder::random(5);
        let left: Vec<_> = (0..16).map(|_| a.answer()).collect();
        let right: Vec<_> = (0..16).map(|_| b.answer()).collect();
        assert_eq!(left, right);
        assert!(left.iter().all(|s| StatusCode::KNOWN.contains(s)));
    }

    #[test]
    fn test_fixed_responder() {
        assert_eq!(Responder::Fixed(StatusCode::LATE_AIRLINE).answer(), StatusCode::LATE_AIRLINE);
    }
}
