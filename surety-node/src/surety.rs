use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use surety_common::{
    config::SuretyConfig,
    events::{EventBus, SuretyEvent},
    ports::{ResolutionListener, TransactionSubmitter},
    Address, Amount, Flight, FlightKey, Result, StatusCode, SuretyError,
};
use surety_governance::{Admission, AirlineRecord, AirlineRegistry, FundingOutcome};
use surety_insurance::{CreditSummary, InsuranceEngine, InsurancePolicy, SettlementCoordinator};
use surety_ledger::{Ledger, MemoryLedger};
use surety_oracle::{
    FlightStatusRecord, OracleEngine, OracleRegistry, ResponseOutcome, StatusRequest, StatusTicket,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// The assembled surety: one ledger, one event bus, and the engines that
/// share them. Mutating calls are refused while the owner has paused it.
pub struct FlightSurety {
    owner: Address,
    operational: AtomicBool,
    ledger: Arc<dyn Ledger>,
    events: EventBus,
    airlines: Arc<AirlineRegistry>,
    insurance: Arc<InsuranceEngine>,
    oracles: Arc<OracleEngine>,
}

impl FlightSurety {
    /// Builds a surety over a fresh in-memory ledger and admits the seed
    /// airlines. Outgoing payouts go through `payouts`.
    pub fn from_config(config: &SuretyConfig, payouts: Arc<dyn TransactionSubmitter>) -> Result<Self> {
        Self::with_ledger(config, Arc::new(MemoryLedger::new()), payouts)
    }

    pub fn with_ledger(
        config: &SuretyConfig,
        ledger: Arc<dyn Ledger>,
        payouts: Arc<dyn TransactionSubmitter>,
    ) -> Result<Self> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);

        let airlines = Arc::new(AirlineRegistry::new(
            ledger.clone(),
            config.governance.clone(),
            events.clone(),
        ));
        let insurance = Arc::new(InsuranceEngine::new(
            ledger.clone(),
            config.insurance.clone(),
            events.clone(),
            payouts,
            config.owner.clone(),
        ));
        let settlement: Arc<dyn ResolutionListener> =
            Arc::new(SettlementCoordinator::new(insurance.clone()));
        let registry = Arc::new(OracleRegistry::seeded(
            ledger.clone(),
            config.oracle.clone(),
            config.rng_seed,
        ));
        let oracles = Arc::new(OracleEngine::new(ledger.clone(), registry, events.clone(), settlement));

        for airline in &config.seed_airlines {
            airlines.seed(airline)?;
        }
        info!(owner = %config.owner, seeds = config.seed_airlines.len(), "surety assembled");

        Ok(Self {
            owner: config.owner.clone(),
            operational: AtomicBool::new(true),
            ledger,
            events,
            airlines,
            insurance,
            oracles,
        })
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SuretyEvent> {
        self.events.subscribe()
    }

    pub fn is_operational(&self) -> bool {
        self.operational.load(Ordering::SeqCst)
    }

    pub fn set_operational(&self, caller: &Address, operational: bool) -> Result<()> {
        if caller != &self.owner {
            warn!(caller = %caller, "operational switch refused");
            return Err(SuretyError::Unauthorized(caller.clone()));
        }
        let previous = self.operational.swap(operational, Ordering::SeqCst);
        if previous != operational {
            info!(target: "surety", operational, "operational status changed");
        }
        Ok(())
    }

    fn ensure_operational(&self) -> Result<()> {
        if self.is_operational() {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }

    // --- airlines ---

    pub fn register_airline(&self, requester: &Address, airline: &Address) -> Result<Admission> {
        self.ensure_operational()?;
        self.airlines.propose_or_register(airline, requester)
    }

    pub fn submit_funds(&self, airline: &Address, amount: Amount) -> Result<FundingOutcome> {
        self.ensure_operational()?;
        self.airlines.submit_funds(airline, amount)
    }

    pub fn airline(&self, airline: &Address) -> Result<Option<AirlineRecord>> {
        self.airlines.airline(airline)
    }

    pub fn is_registered_airline(&self, airline: &Address) -> Result<bool> {
        self.airlines.is_registered(airline)
    }

    pub fn is_active_airline(&self, airline: &Address) -> Result<bool> {
        self.airlines.is_active(airline)
    }

    pub fn registered_airline_count(&self) -> Result<usize> {
        self.airlines.registered_count()
    }

    // --- insurance ---

    pub fn buy_insurance(&self, insuree: &Address, flight: &Flight, premium: Amount) -> Result<FlightKey> {
        self.ensure_operational()?;
        self.insurance.buy_insurance(insuree, flight, premium)
    }

    /// Manual crediting is an owner action; resolutions credit on their own.
    pub fn credit_insurees(&self, caller: &Address, flight: &Flight) -> Result<CreditSummary> {
        self.ensure_operational()?;
        if caller != &self.owner {
            return Err(SuretyError::Unauthorized(caller.clone()));
        }
        self.insurance.credit_insurees(flight)
    }

    pub async fn pay_to_insuree(&self, insuree: &Address) -> Result<Amount> {
        self.ensure_operational()?;
        self.insurance.pay_to_insuree(insuree).await
    }

    pub fn policy(&self, flight: &Flight, insuree: &Address) -> Result<Option<InsurancePolicy>> {
        self.insurance.policy(flight, insuree)
    }

    pub fn credit_balance(&self, insuree: &Address) -> Result<Amount> {
        self.insurance.credit_balance(insuree)
    }

    pub fn pool_balance(&self) -> Result<Amount> {
        self.insurance.pool_balance()
    }

    pub fn pool_shortfall(&self) -> Result<Amount> {
        self.insurance.pool_shortfall()
    }

    // --- oracles ---

    pub fn register_oracle(&self, reporter: &Address, fee: Amount) -> Result<Vec<u8>> {
        self.ensure_operational()?;
        self.oracles.registry().register(reporter, fee)
    }

    pub fn oracle_indexes(&self, reporter: &Address) -> Result<Option<Vec<u8>>> {
        self.oracles.registry().indexes(reporter)
    }

    pub fn fetch_flight_status(&self, requester: &Address, flight: &Flight) -> Result<StatusTicket> {
        self.ensure_operational()?;
        self.oracles.request_status(requester, flight)
    }

    pub fn submit_oracle_response(
        &self,
        reporter: &Address,
        index: u8,
        flight: &Flight,
        status: StatusCode,
    ) -> Result<ResponseOutcome> {
        self.ensure_operational()?;
        self.oracles.submit_response(reporter, index, flight, status)
    }

    pub fn status_request(&self, flight: &Flight, index: u8) -> Result<Option<StatusRequest>> {
        self.oracles.status_request(flight, index)
    }

    pub fn flight_status(&self, flight: &Flight) -> Result<Option<FlightStatusRecord>> {
        self.oracles.flight_status(flight)
    }
}
