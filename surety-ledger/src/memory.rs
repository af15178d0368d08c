use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use surety_common::{Result, SuretyError};
use tracing::trace;

use crate::{
    key::LedgerKey,
    store::{decode, encode, Batch, Ledger},
};

type Slot = Arc<Mutex<Option<Vec<u8>>>>;

/// In-memory ledger with one lock per key.
///
/// Multi-key transactions lock their keys in sorted order, which rules out
/// lock-order deadlocks between concurrent transactions.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    slots: RwLock<HashMap<LedgerKey, Slot>>,
}

fn poisoned<T>(_: T) -> SuretyError {
    SuretyError::Unavailable("ledger lock poisoned".into())
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key` if one was ever written or locked. Reads never create one.
    fn existing(&self, key: &LedgerKey) -> Result<Option<Slot>> {
        Ok(self.slots.read().map_err(poisoned)?.get(key).map(Arc::clone))
    }

    fn slot(&self, key: &LedgerKey) -> Result<Slot> {
        if let Some(slot) = self.existing(key)? {
            return Ok(slot);
        }
        let mut slots = self.slots.write().map_err(poisoned)?;
        Ok(Arc::clone(slots.entry(key.clone()).or_default()))
    }

    pub fn len(&self) -> Result<usize> {
        let slots: Vec<Slot> = self.slots.read().map_err(poisoned)?.values().cloned().collect();
        let mut count = 0;
        for slot in slots {
            if slot.lock().map_err(poisoned)?.is_some() {
                count += 1;
            }
        }
        Ok(count)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &LedgerKey) -> Result<Option<Vec<u8>>> {
        match self.existing(key)? {
            Some(slot) => Ok(slot.lock().map_err(poisoned)?.clone()),
            None => Ok(None),
        }
    }

    fn put(&self, key: &LedgerKey, value: Vec<u8>) -> Result<()> {
        let slot = self.slot(key)?;
        *slot.lock().map_err(poisoned)? = Some(value);
        Ok(())
    }

    fn increment(&self, key: &LedgerKey, delta: u128) -> Result<u128> {
        let slot = self.slot(key)?;
        let mut guard = slot.lock().map_err(poisoned)?;
        let current = match guard.as_deref() {
            Some(bytes) => decode::<u128>(bytes)?,
            None => 0,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| SuretyError::InvalidAmount(format!("counter {key} overflow")))?;
        *guard = Some(encode(&next)?);
        Ok(next)
    }

    fn transact(
        &self,
        keys: &[LedgerKey],
        f: &mut dyn FnMut(&mut Batch) -> Result<()>,
    ) -> Result<()> {
        let mut ordered: Vec<LedgerKey> = keys.to_vec();
        ordered.sort();
        ordered.dedup();

        let slots = ordered
            .iter()
            .map(|k| self.slot(k))
            .collect::<Result<Vec<Slot>>>()?;

        let mut guards: Vec<MutexGuard<'_, Option<Vec<u8>>>> = Vec::with_capacity(slots.len());
        for slot in &slots {
            guards.push(slot.lock().map_err(poisoned)?);
        }

        let reads: BTreeMap<LedgerKey, Option<Vec<u8>>> = ordered
            .iter()
            .cloned()
            .zip(guards.iter().map(|g| (**g).clone()))
            .collect();

        let mut batch = Batch::new(reads);
        f(&mut batch)?;

        let writes = batch.into_writes();
        trace!(keys = ordered.len(), writes = writes.len(), "ledger commit");
        for (key, value) in writes {
            if let Ok(pos) = ordered.binary_search(&key) {
                *guards[pos] = Some(value);
            }
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(LedgerKey, Vec<u8>)>> {
        let snapshot: Vec<(LedgerKey, Slot)> = self
            .slots
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|(k, _)| k.has_prefix(prefix))
            .map(|(k, s)| (k.clone(), Arc::clone(s)))
            .collect();

        let mut out = Vec::new();
        for (key, slot) in snapshot {
            if let Some(value) = slot.lock().map_err(poisoned)?.clone() {
                out.push((key, value));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LedgerExt;
    use std::thread;

    #[test]
    fn test_get_put_increment() {
        let ledger = MemoryLedger::new();
        let key = LedgerKey::path(&["count"]);

        assert_eq!(ledger.get(&key).unwrap(), None);
        assert_eq!(ledger.increment(&key, 3).unwrap(), 3);
        assert_eq!(ledger.increment(&key, 4).unwrap(), 7);
        assert_eq!(ledger.counter(&key).unwrap(), 7);

        let name = LedgerKey::path(&["name"]);
        ledger.put_as(&name, &"surety".to_string()).unwrap();
        assert_eq!(ledger.get_as::<String>(&name).unwrap(), Some("surety".to_string()));
    }

    #[test]
    fn test_failed_transaction_commits_nothing() {
        let ledger = MemoryLedger::new();
        let a = LedgerKey::path(&["a"]);
        let b = LedgerKey::path(&["b"]);

        let res: Result<()> = ledger.transaction(&[a.clone(), b.clone()], |batch| {
            batch.put_as(&a, &1u128)?;
            batch.put_as(&b, &2u128)?;
            Err(SuretyError::NoCredit("0x1".into()))
        });

        assert!(res.is_err());
        assert_eq!(ledger.get(&a).unwrap(), None);
        assert_eq!(ledger.get(&b).unwrap(), None);
    }

    #[test]
    fn test_concurrent_transactions_do_not_lose_updates() {
        let ledger = Arc::new(MemoryLedger::new());
        let a = LedgerKey::path(&["a"]);
        let b = LedgerKey::path(&["b"]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                // Alternate key order to exercise the sorted locking.
                let keys = if i % 2 == 0 {
                    vec![a.clone(), b.clone()]
                } else {
                    vec![b.clone(), a.clone()]
                };
                let (a, b) = (a.clone(), b.clone());
                thread::spawn(move || {
                    for _ in 0..100 {
                        ledger
                            .transaction(&keys, |batch| {
                                batch.increment(&a, 1)?;
                                batch.increment(&b, 2)
                            })
                            .unwrap();
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(ledger.counter(&a).unwrap(), 800);
        assert_eq!(ledger.counter(&b).unwrap(), 1600);
    }

    #[test]
    fn test_scan_prefix() {
        let ledger = MemoryLedger::new();
        ledger.put_as(&LedgerKey::path(&["airline", "0x2"]), &2u8).unwrap();
        ledger.put_as(&LedgerKey::path(&["airline", "0x1"]), &1u8).unwrap();
        ledger.put_as(&LedgerKey::path(&["oracle", "0x1"]), &9u8).unwrap();

        let airlines = ledger.scan_prefix("airline:").unwrap();
        assert_eq!(airlines.len(), 2);
        assert_eq!(airlines[0].0.as_str(), "airline:0x1");
        assert_eq!(ledger.len().unwrap(), 3);
    }

    #[test]
    fn test_reads_do_not_allocate_slots() {
        let ledger = MemoryLedger::new();
        let slots = |l: &MemoryLedger| l.slots.read().unwrap().len();

        for n in 0..50 {
            assert_eq!(ledger.get(&LedgerKey::path(&["airline", n.to_string().as_str()])).unwrap(), None);
        }
        assert!(ledger.scan_prefix("airline:").unwrap().is_empty());
        assert_eq!(ledger.counter(&LedgerKey::path(&["count"])).unwrap(), 0);
        assert_eq!(slots(&ledger), 0);

        ledger.put_as(&LedgerKey::path(&["airline", "7"]), &7u8).unwrap();
        assert_eq!(ledger.get_as::<u8>(&LedgerKey::path(&["airline", "7"])).unwrap(), Some(7));
        assert_eq!(slots(&ledger), 1);
    }
}
