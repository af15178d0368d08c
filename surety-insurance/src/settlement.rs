use std::sync::Arc;

use surety_common::{
    ports::{FlightResolution, ResolutionListener},
    Result,
};
use tracing::{info, warn};

use crate::engine::{CreditSummary, InsuranceEngine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Credited(CreditSummary),
    /// The resolved status does not put the airline at fault.
    NoAction,
}

/// Decides which resolved statuses trigger a payout and forwards those to
/// the insurance engine.
pub struct SettlementCoordinator {
    insurance: Arc<InsuranceEngine>,
}

impl SettlementCoordinator {
    pub fn new(insurance: Arc<InsuranceEngine>) -> Self {
        Self { insurance }
    }

    pub fn settle(&self, resolution: &FlightResolution) -> Result<Settlement> {
        if !resolution.status.is_airline_fault() {
            info!(flight = %resolution.flight, status = %resolution.status, "resolved without payout");
            return Ok(Settlement::NoAction);
        }

        let summary = self.insurance.credit_insurees(&resolution.flight)?;
        info!(
            target: "surety",
            flight = %resolution.flight,
            status = %resolution.status,
            credited = summary.credited.len(),
            "settlement applied"
        );
        Ok(Settlement::Credited(summary))
    }
}

impl ResolutionListener for SettlementCoordinator {
    fn on_resolved(&self, resolution: &FlightResolution) -> Result<()> {
        match self.settle(resolution) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(flight = %resolution.flight, error = %e, "settlement failed");
                Err(e)
            }
        }
    }
}
