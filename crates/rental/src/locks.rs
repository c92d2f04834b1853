//! Bounded-wait exclusive locks over items, accounts, and unique names.
//!
//! A [`LockGuard`] takes all of its keys at once: it waits until none of them
//! is held, then holds them all. Nobody ever holds one key while waiting for
//! another inside the same acquisition, so callers that acquire in phases
//! (item first, then accounts) cannot deadlock each other as long as every
//! caller uses the same phase order.

use std::collections::HashSet;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use saber_core::{AccountId, ItemId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockKey {
    Item(ItemId),
    Account(AccountId),
    AccountName(String),
    CategoryName(String),
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockKey::Item(id) => write!(f, "item:{id}"),
            LockKey::Account(id) => write!(f, "account:{id}"),
            LockKey::AccountName(name) => write!(f, "account-name:{name}"),
            LockKey::CategoryName(name) => write!(f, "category-name:{name}"),
        }
    }
}

/// The wait for a set of keys ran past the table's timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTimeout {
    pub contended: Vec<LockKey>,
    pub waited: Duration,
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self.contended.iter().map(ToString::to_string).collect();
        write!(
            f,
            "gave up after {}ms waiting for {}",
            self.waited.as_millis(),
            keys.join(", ")
        )
    }
}

#[derive(Debug)]
pub struct LockTable {
    held: Mutex<HashSet<LockKey>>,
    released: Condvar,
    timeout: Duration,
}

impl LockTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Take every key in `keys`, waiting at most the table timeout.
    pub fn acquire(
        &self,
        keys: impl IntoIterator<Item = LockKey>,
    ) -> Result<LockGuard<'_>, LockTimeout> {
        let mut guard = LockGuard {
            table: self,
            keys: Vec::new(),
        };
        guard.extend(keys)?;
        Ok(guard)
    }

    fn take(&self, wanted: &[LockKey]) -> Result<(), LockTimeout> {
        if wanted.is_empty() {
            return Ok(());
        }

        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut held = self.held.lock();

        while wanted.iter().any(|k| held.contains(k)) {
            if self.released.wait_until(&mut held, deadline).timed_out()
                && wanted.iter().any(|k| held.contains(k))
            {
                let contended = wanted.iter().filter(|k| held.contains(*k)).cloned().collect();
                return Err(LockTimeout {
                    contended,
                    waited: started.elapsed(),
                });
            }
        }

        held.extend(wanted.iter().cloned());
        Ok(())
    }

    fn release(&self, keys: &[LockKey]) {
        if keys.is_empty() {
            return;
        }
        let mut held = self.held.lock();
        for key in keys {
            held.remove(key);
        }
        drop(held);
        self.released.notify_all();
    }
}

/// Keys held by one operation; released on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    table: &'a LockTable,
    keys: Vec<LockKey>,
}

impl LockGuard<'_> {
    /// Take further keys. Keys this guard already holds are skipped, so an
    /// account that is both actor and depositor is locked once.
    pub fn extend(&mut self, keys: impl IntoIterator<Item = LockKey>) -> Result<(), LockTimeout> {
        let mut wanted: Vec<LockKey> = keys
            .into_iter()
            .filter(|k| !self.keys.contains(k))
            .collect();
        wanted.sort();
        wanted.dedup();

        self.table.take(&wanted)?;
        self.keys.extend(wanted);
        Ok(())
    }

    pub fn keys(&self) -> &[LockKey] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.table.release(&self.keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn held_key_times_out_then_frees_on_drop() {
        let table = LockTable::new(Duration::from_millis(20));
        let item = LockKey::Item(ItemId::new());

        let first = table.acquire([item.clone()]).unwrap();
        let err = table.acquire([item.clone()]).unwrap_err();
        assert_eq!(err.contended, vec![item.clone()]);
        assert!(err.waited >= Duration::from_millis(20));

        drop(first);
        assert!(table.acquire([item]).is_ok());
    }

    #[test]
    fn extend_skips_keys_already_held() {
        let table = LockTable::new(Duration::from_millis(10));
        let account = LockKey::Account(AccountId::new());

        let mut guard = table.acquire([LockKey::Item(ItemId::new())]).unwrap();
        guard.extend([account.clone(), account.clone()]).unwrap();
        guard.extend([account]).unwrap();
        assert_eq!(guard.keys().len(), 2);
    }

    #[test]
    fn failed_acquisition_holds_nothing() {
        let table = LockTable::new(Duration::from_millis(10));
        let free = LockKey::Account(AccountId::new());
        let busy = LockKey::Account(AccountId::new());

        let _holder = table.acquire([busy.clone()]).unwrap();
        assert!(table.acquire([free.clone(), busy]).is_err());
        assert!(table.acquire([free]).is_ok());
    }

    #[test]
    fn waiter_proceeds_once_holder_releases() {
        let table = Arc::new(LockTable::new(Duration::from_secs(5)));
        let key = LockKey::Item(ItemId::new());
        let guard = table.acquire([key.clone()]).unwrap();

        let waiter = {
            let table = Arc::clone(&table);
            thread::spawn(move || table.acquire([key]).map(|_| ()))
        };
        thread::sleep(Duration::from_millis(20));
        drop(guard);

        assert!(waiter.join().unwrap().is_ok());
    }
}
