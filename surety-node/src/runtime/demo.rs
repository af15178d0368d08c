use std::{sync::Arc, time::Duration};

use surety_common::{
    config::SuretyConfig,
    events::SuretyEvent,
    ports::{AccountProvider, Call, Transaction, TransactionSubmitter},
    units::{format_units, units},
    Address, Amount, Flight, Result, StatusCode, SuretyError,
};
use tokio::{sync::broadcast, time};
use tracing::{info, warn};

use crate::{
    accounts::DevAccounts,
    runtime::oracle_pool::{OraclePool, Responder},
    submitter::{LocalSubmitter, Treasury},
    surety::FlightSurety,
};

const STATUS_ATTEMPTS: usize = 5;
const RESOLUTION_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoReport {
    pub flight: Flight,
    pub status: Option<StatusCode>,
    pub paid: Vec<(Address, Amount)>,
    pub pool_balance: Amount,
}

/// Drives one flight through the whole lifecycle: airline admission and
/// funding, policy sales, oracle resolution and payouts.
pub async fn run_demo(config: &SuretyConfig, responder: Responder) -> Result<DemoReport> {
    let treasury = Arc::new(Treasury::default());
    let surety = Arc::new(FlightSurety::from_config(config, treasury.clone())?);
    let submitter: Arc<dyn TransactionSubmitter> =
        Arc::new(LocalSubmitter::new(surety.clone(), treasury.clone()));

    let founder = config
        .seed_airlines
        .first()
        .cloned()
        .ok_or_else(|| SuretyError::Config("no seed airline".into()))?;
    let airlines = DevAccounts::new("demo-airline", 4);
    let passengers = DevAccounts::new("demo-passenger", 3);
    let oracles = DevAccounts::new("demo-oracle", config.simulated_oracles);

    let submit = |actor: &Address, call: Call, value: Amount| {
        let submitter = submitter.clone();
        let tx = Transaction::new(actor.clone(), call).with_value(value);
        async move { submitter.submit(tx).await }
    };

    // Admission: the bootstrap airlines join directly, the next one by vote.
    submit(&founder, Call::SubmitFunds, config.governance.activation_threshold).await?;
    for airline in airlines.accounts().iter().take(3) {
        submit(&founder, Call::RegisterAirline { airline: airline.clone() }, 0).await?;
    }
    if let (Some(voter), Some(candidate)) = (airlines.get(0), airlines.get(3)) {
        submit(voter, Call::SubmitFunds, config.governance.activation_threshold).await?;
        for elector in [&founder, voter] {
            let receipt = submit(elector, Call::RegisterAirline { airline: candidate.clone() }, 0).await?;
            info!(elector = %elector, candidate = %candidate, admission = %receipt.output, "vote cast");
        }
    }

    let flight = Flight::new(founder.clone(), "ND1309", chrono::Utc::now().timestamp().max(0) as u64);
    let premium = config.insurance.max_premium.min(units(1));
    for passenger in passengers.accounts() {
        submit(&passenger, Call::BuyInsurance { flight: flight.clone() }, premium).await?;
    }

    let pool = Arc::new(
        OraclePool::register(submitter.clone(), &oracles, config.oracle.registration_fee, responder).await?,
    );
    let worker = pool.clone().spawn(surety.subscribe());

    let status = resolve(&surety, &submitter, &founder, &flight).await?;
    worker.abort();

    let mut paid = Vec::new();
    for passenger in passengers.accounts() {
        match submit(&passenger, Call::PayToInsuree, 0).await {
            Ok(_) => paid.push((passenger.clone(), treasury.paid_to(&passenger).await)),
            Err(SuretyError::NoCredit(_)) => {}
            Err(e) => warn!(passenger = %passenger, error = %e, "payout failed"),
        }
    }

    let pool_balance = surety.pool_balance()?;
    info!(
        flight = %flight.code,
        status = ?status.map(|s| s.to_string()),
        paid = paid.len(),
        pool = %format_units(pool_balance),
        "demo finished"
    );

    Ok(DemoReport {
        flight,
        status,
        paid,
        pool_balance,
    })
}

/// Requests the flight status until a request resolves or the attempts
/// run out. A fresh request lands on a new random index each time.
async fn resolve(
    surety: &FlightSurety,
    submitter: &Arc<dyn TransactionSubmitter>,
    requester: &Address,
    flight: &Flight,
) -> Result<Option<StatusCode>> {
    let mut events = surety.subscribe();

    for attempt in 1..=STATUS_ATTEMPTS {
        let call = Call::FetchFlightStatus { flight: flight.clone() };
        let receipt = submitter.submit(Transaction::new(requester.clone(), call)).await?;
        info!(attempt, ticket = %receipt.output, "flight status requested");

        if let Ok(Some(status)) = time::timeout(RESOLUTION_WAIT, wait_for_status(&mut events, flight)).await {
            return Ok(Some(status));
        }
        if let Some(record) = surety.flight_status(flight)? {
            return Ok(Some(record.status));
        }
        warn!(attempt, flight = %flight.code, "no quorum yet");
    }
    Ok(None)
}

async fn wait_for_status(events: &mut broadcast::Receiver<SuretyEvent>, flight: &Flight) -> Option<StatusCode> {
    loop {
        match events.recv().await {
            Ok(SuretyEvent::FlightStatusInfo { flight: resolved, status, .. }) if &resolved == flight => {
                return Some(status)
            }
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}
