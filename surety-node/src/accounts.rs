use surety_common::{ports::AccountProvider, Address};

/// Deterministic development identities: `count` addresses derived from
/// `seed` and a running number.
#[derive(Debug, Clone)]
pub struct DevAccounts {
    accounts: Vec<Address>,
}

impl DevAccounts {
    pub fn new(seed: &str, count: usize) -> Self {
        let accounts = (0..count)
            .map(|n| Address::derive(format!("{seed}-{n}").as_bytes()))
            .collect();
        Self { accounts }
    }

    pub fn get(&self, n: usize) -> Option<&Address> {
        self.accounts.get(n)
    }
}

impl AccountProvider for DevAccounts {
    fn accounts(&self) -> Vec<Address> {
        self.accounts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accounts_are_stable_and_distinct() {
        let a = DevAccounts::new("oracle", 5);
        let b = DevAccounts::new("oracle", 5);
        assert_eq!(a.accounts(), b.accounts());

        let mut unique = a.accounts();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert_ne!(a.get(0), DevAccounts::new("airline", 1).get(0));
    }
}
