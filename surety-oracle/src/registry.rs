use std::sync::{Arc, Mutex};

use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use surety_common::{config::OraclePolicy, units::format_units, Address, Amount, Result, SuretyError};
use surety_ledger::{Account, Ledger, LedgerEntry, LedgerExt, LedgerKey};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRecord {
    pub address: Address,
    /// Fixed at registration; never reassigned.
    pub indexes: Vec<u8>,
}

impl OracleRecord {
    pub fn key(address: &Address) -> LedgerKey {
        LedgerKey::path(&["oracle", address.as_str()])
    }

    pub fn holds(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }
}

/// Registered oracles and the randomness their indexes are drawn from.
pub struct OracleRegistry {
    ledger: Arc<dyn Ledger>,
    policy: OraclePolicy,
    rng: Mutex<StdRng>,
}

impl OracleRegistry {
    pub fn new(ledger: Arc<dyn Ledger>, policy: OraclePolicy, rng: StdRng) -> Self {
        Self {
            ledger,
            policy,
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(ledger: Arc<dyn Ledger>, policy: OraclePolicy, seed: u64) -> Self {
        Self::new(ledger, policy, StdRng::seed_from_u64(seed))
    }

    pub fn policy(&self) -> &OraclePolicy {
        &self.policy
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> Result<T> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SuretyError::Unavailable("oracle rng lock poisoned".into()))?;
        Ok(f(&mut rng))
    }

    /// Distinct indexes, sorted ascending.
    fn draw_indexes(&self) -> Result<Vec<u8>> {
        let space = self.policy.index_space as usize;
        let amount = self.policy.indexes_per_oracle.min(space);
        let mut indexes: Vec<u8> = self.with_rng(|rng| {
            sample(rng, space, amount).into_iter().map(|i| i as u8).collect()
        })?;
        indexes.sort_unstable();
        Ok(indexes)
    }

    /// Index a new status request is dispatched on.
    pub fn dispatch_index(&self) -> Result<u8> {
        let space = self.policy.index_space.max(1);
        self.with_rng(|rng| rng.gen_range(0..space))
    }

    /// Registers `reporter` for a fee and returns its assigned indexes.
    pub fn register(&self, reporter: &Address, fee: Amount) -> Result<Vec<u8>> {
        if fee < self.policy.registration_fee {
            return Err(SuretyError::InsufficientFee {
                required: self.policy.registration_fee,
                provided: fee,
            });
        }

        let key = OracleRecord::key(reporter);
        let entry = LedgerEntry::transfer(
            Account::External(reporter.clone()),
            Account::Pool,
            fee,
            format!("oracle registration {}", reporter),
        );
        let mut keys = entry.keys();
        keys.push(key.clone());

        let result = self.ledger.transaction(&keys, |batch| {
            if batch.get(&key)?.is_some() {
                return Err(SuretyError::AlreadyRegistered(reporter.clone()));
            }
            let record = OracleRecord {
                address: reporter.clone(),
                indexes: self.draw_indexes()?,
            };
            batch.post(&entry)?;
            batch.put_as(&key, &record)?;
            Ok(record.indexes)
        });

        match result {
            Ok(indexes) => {
                info!(target: "surety", oracle = %reporter, ?indexes, fee = %format_units(fee), "oracle registered");
                Ok(indexes)
            }
            Err(e) => {
                warn!(oracle = %reporter, error = %e, "oracle registration rejected");
                Err(e)
            }
        }
    }

    pub fn indexes(&self, reporter: &Address) -> Result<Option<Vec<u8>>> {
        Ok(self
            .ledger
            .get_as::<OracleRecord>(&OracleRecord::key(reporter))?
            .map(|r| r.indexes))
    }

    pub fn oracle_count(&self) -> Result<usize> {
        Ok(self.ledger.scan_prefix("oracle:")?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_common::units::units;
    use surety_ledger::MemoryLedger;

    fn registry(seed: u64) -> OracleRegistry {
        OracleRegistry::seeded(Arc::new(MemoryLedger::new()), OraclePolicy::default(), seed)
    }

    #[test]
    fn test_register_assigns_distinct_indexes() {
        let registry = registry(1);
        let oracle = Address::from("0x0a");

        let indexes = registry.register(&oracle, units(1)).unwrap();
        assert_eq!(indexes.len(), 3);
        assert!(indexes.windows(2).all(|w| w[0] < w[1]));
        assert!(indexes.iter().all(|i| *i < 10));
        assert_eq!(registry.indexes(&oracle).unwrap(), Some(indexes));
    }

    #[test]
    fn test_second_registration_keeps_original_indexes() {
        let registry = registry(1);
        let oracle = Address::from("0x0a");
        let indexes = registry.register(&oracle, units(1)).unwrap();

        let err = registry.register(&oracle, units(1)).unwrap_err();
        assert_eq!(err, SuretyError::AlreadyRegistered(oracle.clone()));
        assert_eq!(registry.indexes(&oracle).unwrap(), Some(indexes));
    }

    #[test]
    fn test_fee_below_minimum() {
        let registry = registry(1);
        let err = registry.register(&Address::from("0x0b"), units(1) - 1).unwrap_err();
        assert!(matches!(err, SuretyError::InsufficientFee { .. }));
        assert_eq!(registry.oracle_count().unwrap(), 0);
    }

    #[test]
    fn test_same_seed_same_assignment() {
        let a = registry(99);
        let b = registry(99);
        for n in 0..5 {
            let oracle = Address::from(format!("0xo{n}"));
            assert_eq!(
                a.register(&oracle, units(1)).unwrap(),
                b.register(&oracle, units(1)).unwrap()
            );
        }
    }
}
