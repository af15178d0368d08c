use std::sync::Arc;

use serde::{Deserialize, Serialize};
use surety_common::{
    events::{EventBus, SuretyEvent},
    ports::{FlightResolution, ResolutionListener},
    Address, Flight, Result, StatusCode, SuretyError,
};
use surety_ledger::{Ledger, LedgerExt};
use tracing::{debug, info, warn};

use crate::{
    registry::{OracleRecord, OracleRegistry},
    request::{FlightStatusRecord, RequestState, StatusRequest},
};

/// Returned by `request_status`: where the request lives and whether it is
/// still collecting responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusTicket {
    pub index: u8,
    pub state: RequestState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseOutcome {
    Recorded { status: StatusCode, tally: usize, required: usize },
    Resolved(FlightResolution),
}

/// Opens status requests and folds oracle responses into a quorum.
pub struct OracleEngine {
    ledger: Arc<dyn Ledger>,
    registry: Arc<OracleRegistry>,
    events: EventBus,
    listener: Arc<dyn ResolutionListener>,
}

impl OracleEngine {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        registry: Arc<OracleRegistry>,
        events: EventBus,
        listener: Arc<dyn ResolutionListener>,
    ) -> Self {
        Self {
            ledger,
            registry,
            events,
            listener,
        }
    }

    pub fn registry(&self) -> &Arc<OracleRegistry> {
        &self.registry
    }

    /// Asks the oracle network for the status of `flight`.
    ///
    /// An index is drawn at random. If a request already sits at that index
    /// it is re-broadcast while open, or reported as resolved otherwise.
    pub fn request_status(&self, requester: &Address, flight: &Flight) -> Result<StatusTicket> {
        let index = self.registry.dispatch_index()?;
        let key = StatusRequest::key(&flight.key(), index);

        let state = self.ledger.transaction(&[key.clone()], |batch| {
            match batch.get_as::<StatusRequest>(&key)? {
                Some(existing) => Ok(existing.state),
                None => {
                    let request = StatusRequest::open(flight.clone(), index, requester.clone());
                    batch.put_as(&key, &request)?;
                    Ok(RequestState::Open)
                }
            }
        })?;

        match state {
            RequestState::Open => {
                info!(target: "surety", flight = %flight.code, index, requester = %requester, "status requested");
                self.events.publish(SuretyEvent::OracleRequest {
                    index,
                    flight: flight.clone(),
                });
            }
            RequestState::Resolved(status) => {
                debug!(flight = %flight.code, index, %status, "request already resolved");
            }
        }

        Ok(StatusTicket { index, state })
    }

    /// Records one oracle's answer. The response that brings a status code
    /// to the threshold closes the request and notifies the listener.
    pub fn submit_response(
        &self,
        reporter: &Address,
        index: u8,
        flight: &Flight,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        let flight_key = flight.key();
        let oracle_key = OracleRecord::key(reporter);
        let request_key = StatusRequest::key(&flight_key, index);
        let status_key = FlightStatusRecord::key(&flight_key);
        let required = self.registry.policy().response_threshold;

        let outcome = self.ledger.transaction(
            &[oracle_key.clone(), request_key.clone(), status_key.clone()],
            |batch| {
                let holds = batch
                    .get_as::<OracleRecord>(&oracle_key)?
                    .is_some_and(|oracle| oracle.holds(index));
                if !holds {
                    return Err(SuretyError::IndexMismatch {
                        reporter: reporter.clone(),
                        index,
                    });
                }

                let mut request = batch
                    .get_as::<StatusRequest>(&request_key)?
                    .ok_or_else(|| SuretyError::IndexMismatch {
                        reporter: reporter.clone(),
                        index,
                    })?;
                if !request.is_open() {
                    return Err(SuretyError::RequestClosed {
                        flight: flight.code.clone(),
                        index,
                    });
                }

                let tally = request.record(reporter, status);
                let outcome = if tally >= required {
                    request.state = RequestState::Resolved(status);
                    batch.put_as(&status_key, &FlightStatusRecord { index, status })?;
                    ResponseOutcome::Resolved(FlightResolution {
                        flight: flight.clone(),
                        index,
                        status,
                    })
                } else {
                    ResponseOutcome::Recorded { status, tally, required }
                };
                batch.put_as(&request_key, &request)?;
                Ok(outcome)
            },
        )?;

        self.events.publish(SuretyEvent::OracleReport {
            reporter: reporter.clone(),
            flight: flight.clone(),
            status,
        });

        match &outcome {
            ResponseOutcome::Recorded { tally, .. } => {
                debug!(oracle = %reporter, flight = %flight.code, index, %status, tally, required, "response recorded");
            }
            ResponseOutcome::Resolved(resolution) => {
                info!(target: "surety", flight = %flight.code, index, %status, "flight status resolved");
                if let Err(e) = self.listener.on_resolved(resolution) {
                    warn!(flight = %flight.code, index, error = %e, "resolution listener failed");
                }
                self.events.publish(SuretyEvent::FlightStatusInfo {
                    index,
                    flight: flight.clone(),
                    status,
                });
            }
        }

        Ok(outcome)
    }

    pub fn status_request(&self, flight: &Flight, index: u8) -> Result<Option<StatusRequest>> {
        self.ledger.get_as(&StatusRequest::key(&flight.key(), index))
    }

    /// The resolved status of `flight`, if any request has closed.
    pub fn flight_status(&self, flight: &Flight) -> Result<Option<FlightStatusRecord>> {
        self.ledger.get_as(&FlightStatusRecord::key(&flight.key()))
    }
}
