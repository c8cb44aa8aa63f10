//! Cash ledger and trade log.
//!
//! Account balances are integer cents and only ever move through ledger
//! entries, so the entry log replays to the balance table. Trades are
//! recorded with the full before/after market quantities, which doubles as
//! the market's price history.

use fallible_iterator::FallibleIterator;
use heed::types::SerdeBincode;
use serde::{Deserialize, Serialize};
use sneed::{DatabaseUnique, Env, RoTxn, RwTxn, UnitKey};
use thiserror::Error as ThisError;

use crate::{
    math::lmsr::Side,
    state::{Error, markets::{MarketId, Outcome}},
    types::AccountId,
};

#[derive(Debug, ThisError, Clone)]
pub enum LedgerError {
    #[error(
        "insufficient balance for {account}: required {required_cents}, available {available_cents}"
    )]
    InsufficientBalance {
        account: AccountId,
        required_cents: u64,
        available_cents: u64,
    },
    #[error("balance overflow for {account}")]
    BalanceOverflow { account: AccountId },
}

/// One executed trade, with enough context to reconstruct the price path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub seq: u64,
    pub market_id: MarketId,
    pub account: AccountId,
    pub side: Side,
    pub shares: f64,
    /// Gross amount debited from the account, in cents.
    pub stake_cents: u64,
    /// Amount paid into the market maker, net of fee, in cents.
    pub cost_cents: u64,
    pub fee_cents: u64,
    /// YES price after the trade applied.
    pub price_yes: f64,
    pub q_yes_before: f64,
    pub q_no_before: f64,
    pub q_yes_after: f64,
    pub q_no_after: f64,
    pub timestamp: u64,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum LedgerEntryKind {
    /// External funds credited to an account.
    Deposit,
    /// Stake debited for a trade.
    Stake,
    /// Settlement of winning shares.
    Payout,
    /// Refund of invested stake on an INVALID outcome.
    Refund,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub account: AccountId,
    pub kind: LedgerEntryKind,
    pub amount_cents: u64,
    /// Human-readable reference, e.g. `PAYOUT-<market>-YES`.
    pub reference: String,
    pub market_id: Option<MarketId>,
    pub timestamp: u64,
}

/// Reference string stamped on every settlement entry of a resolution.
pub fn payout_reference(market_id: MarketId, outcome: Outcome) -> String {
    format!("PAYOUT-{market_id}-{outcome}")
}

#[derive(Clone)]
pub struct LedgerDatabase {
    /// Keyed market-first so a market's trades are contiguous and ordered.
    trades: DatabaseUnique<
        SerdeBincode<(MarketId, u64)>,
        SerdeBincode<TradeRecord>,
    >,
    entries: DatabaseUnique<SerdeBincode<u64>, SerdeBincode<LedgerEntry>>,
    balances: DatabaseUnique<SerdeBincode<AccountId>, SerdeBincode<u64>>,
    next_trade_seq: DatabaseUnique<UnitKey, SerdeBincode<u64>>,
    next_entry_seq: DatabaseUnique<UnitKey, SerdeBincode<u64>>,
}

impl LedgerDatabase {
    pub const NUM_DBS: u32 = 5;

    pub fn new(env: &Env, rwtxn: &mut RwTxn) -> Result<Self, Error> {
        let trades = DatabaseUnique::create(env, rwtxn, "trades")?;
        let entries = DatabaseUnique::create(env, rwtxn, "ledger_entries")?;
        let balances = DatabaseUnique::create(env, rwtxn, "balances")?;
        let next_trade_seq =
            DatabaseUnique::create(env, rwtxn, "next_trade_seq")?;
        let next_entry_seq =
            DatabaseUnique::create(env, rwtxn, "next_entry_seq")?;
        Ok(LedgerDatabase {
            trades,
            entries,
            balances,
            next_trade_seq,
            next_entry_seq,
        })
    }

    pub fn balance_of(
        &self,
        txn: &RoTxn,
        account: AccountId,
    ) -> Result<u64, Error> {
        Ok(self.balances.try_get(txn, &account)?.unwrap_or(0))
    }

    /// Credit an account and append the matching ledger entry.
    #[allow(clippy::too_many_arguments)]
    pub fn credit(
        &self,
        rwtxn: &mut RwTxn,
        account: AccountId,
        amount_cents: u64,
        kind: LedgerEntryKind,
        reference: String,
        market_id: Option<MarketId>,
        timestamp: u64,
    ) -> Result<LedgerEntry, Error> {
        let balance = self.balance_of(rwtxn, account)?;
        let new_balance = balance.checked_add(amount_cents).ok_or(
            LedgerError::BalanceOverflow { account },
        )?;
        self.balances.put(rwtxn, &account, &new_balance)?;
        self.append_entry(
            rwtxn,
            account,
            kind,
            amount_cents,
            reference,
            market_id,
            timestamp,
        )
    }

    /// Debit an account and append the matching ledger entry. Fails without
    /// writing if the balance does not cover the amount.
    #[allow(clippy::too_many_arguments)]
    pub fn debit(
        &self,
        rwtxn: &mut RwTxn,
        account: AccountId,
        amount_cents: u64,
        kind: LedgerEntryKind,
        reference: String,
        market_id: Option<MarketId>,
        timestamp: u64,
    ) -> Result<LedgerEntry, Error> {
        let balance = self.balance_of(rwtxn, account)?;
        if amount_cents > balance {
            return Err(LedgerError::InsufficientBalance {
                account,
                required_cents: amount_cents,
                available_cents: balance,
            }
            .into());
        }
        self.balances.put(rwtxn, &account, &(balance - amount_cents))?;
        self.append_entry(
            rwtxn,
            account,
            kind,
            amount_cents,
            reference,
            market_id,
            timestamp,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn append_entry(
        &self,
        rwtxn: &mut RwTxn,
        account: AccountId,
        kind: LedgerEntryKind,
        amount_cents: u64,
        reference: String,
        market_id: Option<MarketId>,
        timestamp: u64,
    ) -> Result<LedgerEntry, Error> {
        let seq = self.next_entry_seq.try_get(rwtxn, &())?.unwrap_or(0);
        self.next_entry_seq.put(rwtxn, &(), &(seq + 1))?;
        let entry = LedgerEntry {
            seq,
            account,
            kind,
            amount_cents,
            reference,
            market_id,
            timestamp,
        };
        self.entries.put(rwtxn, &seq, &entry)?;
        Ok(entry)
    }

    /// Record an executed trade; assigns and returns its sequence number.
    pub fn append_trade(
        &self,
        rwtxn: &mut RwTxn,
        mut record: TradeRecord,
    ) -> Result<TradeRecord, Error> {
        let seq = self.next_trade_seq.try_get(rwtxn, &())?.unwrap_or(0);
        self.next_trade_seq.put(rwtxn, &(), &(seq + 1))?;
        record.seq = seq;
        self.trades.put(rwtxn, &(record.market_id, seq), &record)?;
        Ok(record)
    }

    /// A market's trades in execution order.
    pub fn trades_for_market(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Vec<TradeRecord>, Error> {
        let trades = self
            .trades
            .iter(txn)?
            .filter_map(|((mid, _seq), record)| {
                Ok((mid == market_id).then_some(record))
            })
            .collect()?;
        Ok(trades)
    }

    /// (timestamp, YES price) pairs for a market, in trade order.
    pub fn price_history(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Vec<(u64, f64)>, Error> {
        let history = self
            .trades
            .iter(txn)?
            .filter_map(|((mid, _seq), record)| {
                Ok((mid == market_id)
                    .then_some((record.timestamp, record.price_yes)))
            })
            .collect()?;
        Ok(history)
    }

    /// An account's ledger entries, oldest first.
    pub fn entries_for_account(
        &self,
        txn: &RoTxn,
        account: AccountId,
    ) -> Result<Vec<LedgerEntry>, Error> {
        let entries = self
            .entries
            .iter(txn)?
            .filter_map(|(_seq, entry)| {
                Ok((entry.account == account).then_some(entry))
            })
            .collect()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payout_reference_format() {
        let market_id = MarketId::from_seq(7);
        let reference = payout_reference(market_id, Outcome::Yes);
        assert_eq!(reference, format!("PAYOUT-{market_id}-YES"));
        let reference = payout_reference(market_id, Outcome::Invalid);
        assert_eq!(reference, format!("PAYOUT-{market_id}-INVALID"));
    }

    #[test]
    fn test_entry_kind_display() {
        assert_eq!(LedgerEntryKind::Deposit.to_string(), "DEPOSIT");
        assert_eq!(LedgerEntryKind::Payout.to_string(), "PAYOUT");
        assert_eq!(
            "REFUND".parse::<LedgerEntryKind>().unwrap(),
            LedgerEntryKind::Refund
        );
    }
}
