use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saber_core::{AccountId, AggregateRoot};

/// Balance semantics of an account.
///
/// The system account is the mint and the sink of the coin economy: transfers
/// from it never check a balance and coins sent to it are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AccountKind {
    Regular { balance: u64 },
    System,
}

/// Aggregate root: a coin account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    name: String,
    kind: AccountKind,
    opened_at: DateTime<Utc>,
    version: u64,
}

impl Account {
    /// A new regular account with a zero balance. Coins only ever arrive via
    /// ledger transfers, so the balance stays reconstructible from the log.
    pub fn regular(id: AccountId, name: impl Into<String>, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: AccountKind::Regular { balance: 0 },
            opened_at,
            version: 0,
        }
    }

    pub fn system(id: AccountId, opened_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: "system".to_string(),
            kind: AccountKind::System,
            opened_at,
            version: 0,
        }
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, AccountKind::System)
    }

    /// Current balance; `None` for the balance-exempt system account.
    pub fn balance(&self) -> Option<u64> {
        match self.kind {
            AccountKind::Regular { balance } => Some(balance),
            AccountKind::System => None,
        }
    }

    pub fn can_cover(&self, amount: u64) -> bool {
        match self.kind {
            AccountKind::Regular { balance } => balance >= amount,
            AccountKind::System => true,
        }
    }

    /// Record the version the store assigned on a successful save.
    pub fn mark_persisted(&mut self, version: u64) {
        self.version = version;
    }

    pub(crate) fn set_balance(&mut self, balance: u64) {
        if let AccountKind::Regular { balance: current } = &mut self.kind {
            *current = balance;
        }
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_account_covers_anything() {
        let system = Account::system(AccountId::new(), Utc::now());
        assert!(system.can_cover(u64::MAX));
        assert_eq!(system.balance(), None);
    }

    #[test]
    fn regular_account_starts_empty() {
        let account = Account::regular(AccountId::new(), "ana", Utc::now());
        assert_eq!(account.balance(), Some(0));
        assert!(!account.can_cover(1));
        assert!(account.can_cover(0));
    }
}
