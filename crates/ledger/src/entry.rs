use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use saber_core::{AccountId, EntryId};

/// Why coins moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferReason {
    OpeningGrant,
    DepositReward,
    RentalFee,
    Penalty,
}

/// One immutable transfer in the audit trail.
///
/// `sender == None` is a system mint, `receiver == None` a system sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub sender: Option<AccountId>,
    pub receiver: Option<AccountId>,
    /// Always positive.
    pub amount: u64,
    pub reason: TransferReason,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn involves(&self, account: AccountId) -> bool {
        self.sender == Some(account) || self.receiver == Some(account)
    }

    /// Signed effect of this entry on `account`'s balance.
    pub fn net_effect_on(&self, account: AccountId) -> i128 {
        let mut net = 0i128;
        if self.receiver == Some(account) {
            net += i128::from(self.amount);
        }
        if self.sender == Some(account) {
            net -= i128::from(self.amount);
        }
        net
    }
}
