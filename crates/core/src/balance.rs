//! Derived balance views.
//!
//! Balances are never stored. For an address and an asset the balance is the
//! sum of `+amount` over postings where the address is the destination minus
//! `amount` over postings where it is the source.

use std::collections::BTreeMap;

use crate::transaction::Posting;

/// Asset -> net amount.
pub type AssetsBalances = BTreeMap<String, i128>;

/// Address -> per-asset balances. Pages carry one entry per element.
pub type AccountsBalances = BTreeMap<String, AssetsBalances>;

/// Folds postings into per-address, per-asset balances.
///
/// Addresses rejected by the predicate are skipped entirely, which keeps the
/// accumulator small when only a few accounts are of interest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BalanceAccumulator {
    balances: BTreeMap<String, AssetsBalances>,
}

impl BalanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply<F>(&mut self, posting: &Posting, matches: F)
    where
        F: Fn(&str) -> bool,
    {
        let amount = i128::from(posting.amount);
        if matches(&posting.destination) {
            self.credit(&posting.destination, &posting.asset, amount);
        }
        if matches(&posting.source) {
            self.credit(&posting.source, &posting.asset, -amount);
        }
    }

    fn credit(&mut self, address: &str, asset: &str, delta: i128) {
        let assets = self.balances.entry(address.to_string()).or_default();
        *assets.entry(asset.to_string()).or_insert(0) += delta;
    }

    pub fn get(&self, address: &str, asset: &str) -> Option<i128> {
        self.balances.get(address)?.get(asset).copied()
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Addresses in descending order with their balances.
    pub fn into_descending(self) -> Vec<(String, AssetsBalances)> {
        self.balances.into_iter().rev().collect()
    }

    /// Sum every address into one asset -> amount mapping.
    pub fn aggregate(&self) -> AssetsBalances {
        let mut total = AssetsBalances::new();
        for assets in self.balances.values() {
            for (asset, amount) in assets {
                *total.entry(asset.clone()).or_insert(0) += amount;
            }
        }
        total
    }
}
