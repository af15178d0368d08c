use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    address::Address,
    error::{Result, SuretyError},
    units::{units, Amount},
};

/// Airline admission and activation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernancePolicy {
    /// Below this many registered airlines, admission needs no votes.
    pub bootstrap_airlines: usize,
    pub activation_threshold: Amount,
}

impl Default for GovernancePolicy {
    fn default() -> Self {
        Self {
            bootstrap_airlines: 4,
            activation_threshold: units(10),
        }
    }
}

/// Payout is `premium * payout_numerator / payout_denominator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsurancePolicyTerms {
    pub max_premium: Amount,
    pub payout_numerator: u128,
    pub payout_denominator: u128,
}

impl Default for InsurancePolicyTerms {
    fn default() -> Self {
        Self {
            max_premium: units(1),
            payout_numerator: 3,
            payout_denominator: 2,
        }
    }
}

impl InsurancePolicyTerms {
    pub fn payout_for(&self, premium: Amount) -> Amount {
        premium.saturating_mul(self.payout_numerator) / self.payout_denominator
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OraclePolicy {
    pub registration_fee: Amount,
    pub indexes_per_oracle: usize,
    /// Indexes are drawn from `0..index_space`.
    pub index_space: u8,
    pub response_threshold: usize,
}

impl Default for OraclePolicy {
    fn default() -> Self {
        Self {
            registration_fee: units(1),
            indexes_per_oracle: 3,
            index_space: 10,
            response_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuretyConfig {
    pub owner: Address,
    /// Airlines admitted as `Active` at genesis; the first electorate.
    pub seed_airlines: Vec<Address>,
    pub governance: GovernancePolicy,
    pub insurance: InsurancePolicyTerms,
    pub oracle: OraclePolicy,
    pub rng_seed: u64,
    pub event_capacity: usize,
    pub simulated_oracles: usize,
}

impl Default for SuretyConfig {
    fn default() -> Self {
        Self {
            owner: Address::derive(b"owner"),
            seed_airlines: vec![Address::derive(b"airline-0")],
            governance: GovernancePolicy::default(),
            insurance: InsurancePolicyTerms::default(),
            oracle: OraclePolicy::default(),
            rng_seed: 42,
            event_capacity: 1024,
            simulated_oracles: 20,
        }
    }
}

impl SuretyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.seed_airlines.is_empty() {
            return Err(SuretyError::Config("at least one seed airline is required".into()));
        }
        if self.governance.activation_threshold == 0 {
            return Err(SuretyError::Config("activation_threshold must be positive".into()));
        }
        if self.insurance.payout_denominator == 0 {
            return Err(SuretyError::Config("payout_denominator must be positive".into()));
        }
        if self.oracle.response_threshold == 0 {
            return Err(SuretyError::Config("response_threshold must be positive".into()));
        }
        if self.oracle.indexes_per_oracle == 0
            || self.oracle.indexes_per_oracle > self.oracle.index_space as usize
        {
            return Err(SuretyError::Config(format!(
                "indexes_per_oracle ({}) must be within 1..={}",
                self.oracle.indexes_per_oracle, self.oracle.index_space
            )));
        }
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SuretyError::Config(e.to_string()))?;
        fs::write(path, json).map_err(|e| SuretyError::Config(e.to_string()))
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| SuretyError::Config(e.to_string()))?;
        let parsed = serde_json::from_str::<SuretyConfig>(&data)
            .map_err(|e| SuretyError::Config(e.to_string()))?;
        parsed.validate()?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_domain_constants() {
        let cfg = SuretyConfig::default();
        assert_eq!(cfg.governance.bootstrap_airlines, 4);
        assert_eq!(cfg.governance.activation_threshold, units(10));
        assert_eq!(cfg.oracle.response_threshold, 3);
        assert_eq!(cfg.insurance.payout_for(units(1)), units(3) / 2);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_file_round_trip_and_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surety.json");

        let mut cfg = SuretyConfig::default();
        cfg.rng_seed = 7;
        cfg.save_to_file(&path).unwrap();
        assert_eq!(SuretyConfig::load_from_file(&path).unwrap(), cfg);

        std::fs::write(&path, r#"{ "rng_seed": 9, "oracle": { "response_threshold": 5 } }"#).unwrap();
        let partial = SuretyConfig::load_from_file(&path).unwrap();
        assert_eq!(partial.rng_seed, 9);
        assert_eq!(partial.oracle.response_threshold, 5);
        assert_eq!(partial.oracle.index_space, 10);
    }

    #[test]
    fn test_rejects_impossible_index_layout() {
        let mut cfg = SuretyConfig::default();
        cfg.oracle.indexes_per_oracle = 11;
        assert!(matches!(cfg.validate(), Err(SuretyError::Config(_))));
    }
}
