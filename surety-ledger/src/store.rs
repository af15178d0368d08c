use std::collections::BTreeMap;

use serde::{de::DeserializeOwned, Serialize};
use surety_common::{Result, SuretyError};

use crate::key::LedgerKey;

/// The state store contract.
///
/// Single-key calls are linearizable per key. `transact` locks the named
/// keys, hands the closure a [`Batch`] over their current values, and
/// commits the staged writes only if the closure returns `Ok`.
pub trait Ledger: Send + Sync {
    fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &LedgerKey, value: Vec<u8>) -> Result<()>;

    /// Adds `delta` to the counter at `key` (absent counts as zero) and
    /// returns the new value.
    fn increment(&self, key: &LedgerKey, delta: u128) -> Result<u128>;

    fn transact(
        &self,
        keys: &[LedgerKey],
        f: &mut dyn FnMut(&mut Batch) -> Result<()>,
    ) -> Result<()>;

    /// Point-in-time listing of keys under `prefix`. Not atomic across keys.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(LedgerKey, Vec<u8>)>>;
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| SuretyError::Unavailable(format!("encode: {e}")))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes).map_err(|e| SuretyError::Unavailable(format!("decode: {e}")))
}

/// View over a locked key set with staged writes.
#[derive(Debug, Default)]
pub struct Batch {
    reads: BTreeMap<LedgerKey, Option<Vec<u8>>>,
    writes: BTreeMap<LedgerKey, Vec<u8>>,
}

impl Batch {
    pub fn new(reads: BTreeMap<LedgerKey, Option<Vec<u8>>>) -> Self {
        Self {
            reads,
            writes: BTreeMap::new(),
        }
    }

    fn ensure_locked(&self, key: &LedgerKey) -> Result<()> {
        if self.reads.contains_key(key) {
            Ok(())
        } else {
            Err(SuretyError::Unavailable(format!("key {key} is outside the transaction")))
        }
    }

    pub fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>> {
        self.ensure_locked(key)?;
        if let Some(staged) = self.writes.get(key) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.reads.get(key).cloned().flatten())
    }

    pub fn put(&mut self, key: &LedgerKey, value: Vec<u8>) -> Result<()> {
        self.ensure_locked(key)?;
        self.writes.insert(key.clone(), value);
        Ok(())
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &LedgerKey) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_as<T: Serialize>(&mut self, key: &LedgerKey, value: &T) -> Result<()> {
        let bytes = encode(value)?;
        self.put(key, bytes)
    }

    pub fn counter(&self, key: &LedgerKey) -> Result<u128> {
        Ok(self.get_as::<u128>(key)?.unwrap_or(0))
    }

    pub fn increment(&mut self, key: &LedgerKey, delta: u128) -> Result<u128> {
        let next = self
            .counter(key)?
            .checked_add(delta)
            .ok_or_else(|| SuretyError::InvalidAmount(format!("counter {key} overflow")))?;
        self.put_as(key, &next)?;
        Ok(next)
    }

    pub fn is_dirty(&self) -> bool {
        !self.writes.is_empty()
    }

    pub fn into_writes(self) -> BTreeMap<LedgerKey, Vec<u8>> {
        self.writes
    }
}

/// Typed helpers over any [`Ledger`].
pub trait LedgerExt: Ledger {
    fn get_as<T: DeserializeOwned>(&self, key: &LedgerKey) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_as<T: Serialize>(&self, key: &LedgerKey, value: &T) -> Result<()> {
        self.put(key, encode(value)?)
    }

    fn counter(&self, key: &LedgerKey) -> Result<u128> {
        Ok(self.get_as::<u128>(key)?.unwrap_or(0))
    }

    /// Runs `f` atomically over `keys` and returns its result.
    fn transaction<R, F>(&self, keys: &[LedgerKey], mut f: F) -> Result<R>
    where
        F: FnMut(&mut Batch) -> Result<R>,
    {
        let mut out = None;
        self.transact(keys, &mut |batch| {
            out = Some(f(batch)?);
            Ok(())
        })?;
        out.ok_or_else(|| SuretyError::Unavailable("transaction produced no result".into()))
    }
}

impl<L: Ledger + ?Sized> LedgerExt for L {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_rejects_unlocked_keys() {
        let locked = LedgerKey::path(&["a"]);
        let other = LedgerKey::path(&["b"]);
        let mut reads = BTreeMap::new();
        reads.insert(locked.clone(), None);
        let mut batch = Batch::new(reads);

        assert!(batch.put_as(&locked, &1u32).is_ok());
        assert!(matches!(batch.get(&other), Err(SuretyError::Unavailable(_))));
        assert!(matches!(batch.put(&other, vec![]), Err(SuretyError::Unavailable(_))));
    }

    #[test]
    fn test_batch_reads_its_own_writes() {
        let key = LedgerKey::path(&["counter"]);
        let mut reads = BTreeMap::new();
        reads.insert(key.clone(), Some(encode(&5u128).unwrap()));
        let mut batch = Batch::new(reads);

        assert_eq!(batch.increment(&key, 2).unwrap(), 7);
        assert_eq!(batch.counter(&key).unwrap(), 7);
        assert!(batch.is_dirty());
    }
}
