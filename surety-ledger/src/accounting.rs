//! Double-entry postings for every value movement: premiums and airline
//! funds flow into the pool, payouts flow from the pool into insuree
//! credit accounts, withdrawals flow out.

use std::fmt;

use serde::{Deserialize, Serialize};
use surety_common::{Address, Amount, Result, SuretyError};
use tracing::debug;
use uuid::Uuid;

use crate::{key::LedgerKey, store::Batch};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Account {
    /// Escrow pool holding premiums, airline funds and oracle fees.
    Pool,
    /// Owed-but-unwithdrawn payout of one insuree.
    Credit(Address),
    /// Outside world. Not tracked; it is the source and sink of value.
    External(Address),
}

impl Account {
    pub fn is_tracked(&self) -> bool {
        !matches!(self, Account::External(_))
    }

    pub fn key(&self) -> LedgerKey {
        match self {
            Account::Pool => LedgerKey::path(&["account", "pool"]),
            Account::Credit(a) => LedgerKey::path(&["account", "credit", a.as_str()]),
            Account::External(a) => LedgerKey::path(&["account", "external", a.as_str()]),
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Pool => write!(f, "pool"),
            Account::Credit(a) => write!(f, "credit:{}", a),
            Account::External(a) => write!(f, "external:{}", a),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Amount,
    /// Amount debited past zero by owed postings, repaid by later credits
    /// before `balance` grows again.
    pub shortfall: Amount,
    pub last_entry_id: Option<String>,
}

impl AccountState {
    fn debit(&mut self, amount: Amount, overdraft: bool) -> Option<()> {
        if self.balance >= amount {
            self.balance -= amount;
            return Some(());
        }
        if !overdraft {
            return None;
        }
        self.shortfall = self.shortfall.checked_add(amount - self.balance)?;
        self.balance = 0;
        Some(())
    }

    fn credit(&mut self, amount: Amount) -> Option<()> {
        let repaid = amount.min(self.shortfall);
        self.shortfall -= repaid;
        self.balance = self.balance.checked_add(amount - repaid)?;
        Some(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegKind {
    Debit,
    Credit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub account: Account,
    pub kind: LegKind,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: String,
    pub legs: Vec<Leg>,
    pub memo: Option<String>,
    pub timestamp: i64,
}

impl LedgerEntry {
    pub fn new(legs: Vec<Leg>, memo: Option<String>) -> Self {
        Self {
            entry_id: Uuid::new_v4().to_string(),
            legs,
            memo,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Two-leg entry moving `amount` from `from` to `to`.
    pub fn transfer(from: Account, to: Account, amount: Amount, memo: impl Into<String>) -> Self {
        Self::new(
            vec![
                Leg { account: from, kind: LegKind::Debit, amount },
                Leg { account: to, kind: LegKind::Credit, amount },
            ],
            Some(memo.into()),
        )
    }

    pub fn is_balanced(&self) -> bool {
        let (mut debits, mut credits) = (0u128, 0u128);
        for leg in &self.legs {
            match leg.kind {
                LegKind::Debit => debits = debits.saturating_add(leg.amount),
                LegKind::Credit => credits = credits.saturating_add(leg.amount),
            }
        }
        debits == credits
    }

    /// Keys that must be locked for this entry to be posted.
    pub fn keys(&self) -> Vec<LedgerKey> {
        self.legs
            .iter()
            .filter(|l| l.account.is_tracked())
            .map(|l| l.account.key())
            .collect()
    }
}

impl Batch {
    pub fn account(&self, account: &Account) -> Result<AccountState> {
        Ok(self.get_as::<AccountState>(&account.key())?.unwrap_or_default())
    }

    /// Applies a balanced entry to the tracked accounts it touches. A debit
    /// larger than the account's balance fails with `InsufficientFunds`.
    pub fn post(&mut self, entry: &LedgerEntry) -> Result<()> {
        self.apply(entry, false)
    }

    /// Applies an entry the debited accounts owe whatever they hold. A debit
    /// past zero is carried as `shortfall` instead of failing.
    pub fn post_owed(&mut self, entry: &LedgerEntry) -> Result<()> {
        self.apply(entry, true)
    }

    fn apply(&mut self, entry: &LedgerEntry, overdraft: bool) -> Result<()> {
        if !entry.is_balanced() {
            return Err(SuretyError::InvalidAmount(format!(
                "unbalanced entry {}",
                entry.entry_id
            )));
        }

        for leg in entry.legs.iter().filter(|l| l.account.is_tracked()) {
            let key = leg.account.key();
            let mut state = self.account(&leg.account)?;
            match leg.kind {
                LegKind::Debit => {
                    if state.debit(leg.amount, overdraft).is_none() {
                        return Err(SuretyError::InsufficientFunds {
                            account: leg.account.to_string(),
                            balance: state.balance,
                            needed: leg.amount,
                        });
                    }
                }
                LegKind::Credit => state
                    .credit(leg.amount)
                    .ok_or_else(|| SuretyError::InvalidAmount("balance overflow".into()))?,
            }
            state.last_entry_id = Some(entry.entry_id.clone());
            self.put_as(&key, &state)?;
        }

        debug!(entry = %entry.entry_id, memo = ?entry.memo, overdraft, "posted ledger entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        memory::MemoryLedger,
        store::{Ledger, LedgerExt},
    };

    #[test]
    fn test_transfer_moves_value_between_tracked_accounts() {
        let ledger = MemoryLedger::new();
        let alice = Address::from("0xa11ce");

        let deposit = LedgerEntry::transfer(Account::External(alice.clone()), Account::Pool, 100, "deposit");
        ledger
            .transaction(&deposit.keys(), |b| b.post(&deposit))
            .unwrap();

        let credit = LedgerEntry::transfer(Account::Pool, Account::Credit(alice.clone()), 60, "credit");
        ledger.transaction(&credit.keys(), |b| b.post(&credit)).unwrap();

        let pool: AccountState = ledger.get_as(&Account::Pool.key()).unwrap().unwrap();
        let owed: AccountState = ledger.get_as(&Account::Credit(alice).key()).unwrap().unwrap();
        assert_eq!(pool.balance, 40);
        assert_eq!(owed.balance, 60);
        assert_eq!(owed.last_entry_id, Some(credit.entry_id));
    }

    #[test]
    fn test_overdraft_is_rejected_and_nothing_applies() {
        let ledger = MemoryLedger::new();
        let bob = Address::from("0xb0b");

        let entry = LedgerEntry::transfer(Account::Pool, Account::Credit(bob.clone()), 5, "payout");
        let res = ledger.transaction(&entry.keys(), |b| b.post(&entry));

        assert!(matches!(res, Err(SuretyError::InsufficientFunds { .. })));
        assert_eq!(ledger.get(&Account::Credit(bob).key()).unwrap(), None);
    }

    #[test]
    fn test_owed_entry_runs_pool_short_until_repaid() {
        let ledger = MemoryLedger::new();
        let carol = Address::from("0xca201");

        let payout = LedgerEntry::transfer(Account::Pool, Account::Credit(carol.clone()), 15, "payout");
        ledger.transaction(&payout.keys(), |b| b.post_owed(&payout)).unwrap();

        let pool: AccountState = ledger.get_as(&Account::Pool.key()).unwrap().unwrap();
        assert_eq!((pool.balance, pool.shortfall), (0, 15));
        let owed: AccountState = ledger.get_as(&Account::Credit(carol.clone()).key()).unwrap().unwrap();
        assert_eq!(owed.balance, 15);

        // Incoming value pays the shortfall down first.
        let deposit = LedgerEntry::transfer(Account::External(carol), Account::Pool, 20, "fund");
        ledger.transaction(&deposit.keys(), |b| b.post(&deposit)).unwrap();
        let pool: AccountState = ledger.get_as(&Account::Pool.key()).unwrap().unwrap();
        assert_eq!((pool.balance, pool.shortfall), (5, 0));
    }

    #[test]
    fn test_unbalanced_entry() {
        let entry = LedgerEntry::new(
            vec![Leg { account: Account::Pool, kind: LegKind::Credit, amount: 1 }],
            None,
        );
        assert!(!entry.is_balanced());
    }
}
