//! Credit accounting
//!
//! A credit is reserved before Layer 1 runs and committed only when the
//! command is executed; every other outcome gives it back.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

/// Per-requester credit balances
pub trait CreditLedger: Send + Sync {
    /// Atomically take one credit if the balance is positive
    fn try_debit(&self, requester: &str) -> bool;

    /// Return one credit taken by `try_debit`
    fn refund(&self, requester: &str);

    fn balance(&self, requester: &str) -> u64;
}

/// Ledger held in process memory
pub struct InMemoryLedger {
    default_balance: u64,
    accounts: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl InMemoryLedger {
    pub fn new(default_balance: u64) -> Self {
        Self {
            default_balance,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_balances(default_balance: u64, balances: &HashMap<String, u64>) -> Self {
        let accounts = balances
            .iter()
            .map(|(requester, balance)| (requester.clone(), Arc::new(AtomicU64::new(*balance))))
            .collect();
        Self {
            default_balance,
            accounts: RwLock::new(accounts),
        }
    }

    /// Set a balance, replacing any existing one
    pub fn set_balance(&self, requester: &str, balance: u64) {
        self.account(requester).store(balance, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        match self.accounts.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Account for `requester`, opened at the default balance on first debit
    fn account(&self, requester: &str) -> Arc<AtomicU64> {
        {
            let accounts = match self.accounts.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(account) = accounts.get(requester) {
                return Arc::clone(account);
            }
        }
        let mut accounts = match self.accounts.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            accounts
                .entry(requester.to_string())
                .or_insert_with(|| Arc::new(AtomicU64::new(self.default_balance))),
        )
    }
}

impl CreditLedger for InMemoryLedger {
    fn try_debit(&self, requester: &str) -> bool {
        self.account(requester)
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |balance| {
                balance.checked_sub(1)
            })
            .is_ok()
    }

    fn refund(&self, requester: &str) {
        self.account(requester).fetch_add(1, Ordering::SeqCst);
    }

    fn balance(&self, requester: &str) -> u64 {
        let accounts = match self.accounts.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        accounts
            .get(requester)
            .map_or(self.default_balance, |account| account.load(Ordering::SeqCst))
    }
}

/// One reserved credit
///
/// Dropping an unsettled reservation refunds it, so a cancelled or panicking
/// pipeline run never leaks a debit.
pub struct CreditReservation {
    ledger: Arc<dyn CreditLedger>,
    requester: String,
    settled: bool,
}

impl CreditReservation {
    /// Reserve one credit, or `None` when the balance is exhausted
    pub fn acquire(ledger: Arc<dyn CreditLedger>, requester: &str) -> Option<Self> {
        if !ledger.try_debit(requester) {
            return None;
        }
        Some(Self {
            ledger,
            requester: requester.to_string(),
            settled: false,
        })
    }

    /// Keep the credit
    pub fn commit(mut self) {
        self.settled = true;
        tracing::debug!(requester = %self.requester, "credit committed");
    }

    /// Give the credit back
    pub fn release(mut self) {
        self.refund();
    }

    fn refund(&mut self) {
        if !self.settled {
            self.settled = true;
            self.ledger.refund(&self.requester);
            tracing::debug!(requester = %self.requester, "credit refunded");
        }
    }
}

impl Drop for CreditReservation {
    fn drop(&mut self) {
        self.refund();
    }
}
