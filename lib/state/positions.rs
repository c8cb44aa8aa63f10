//! Per-account, per-market aggregated positions.
//!
//! A position is created lazily on an account's first trade in a market and
//! only ever accumulates: there is no sell-back path in this design. At
//! resolution every position of the market is consumed exactly once and its
//! row deleted, so resolved shares can never be redeemed twice.

use fallible_iterator::FallibleIterator;
use heed::types::SerdeBincode;
use serde::{Deserialize, Serialize};
use sneed::{DatabaseUnique, Env, RoTxn, RwTxn};

use crate::{
    math::{
        currency::{self, CurrencyError, Rounding},
        lmsr::Side,
    },
    state::{Error, markets::{MarketId, Outcome}},
    types::AccountId,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub yes_shares: f64,
    pub no_shares: f64,
    /// Cumulative stake spent, net of fees, in cents.
    pub total_invested_cents: u64,
    pub trade_count: u64,
    pub last_trade_at: u64,
}

impl Position {
    pub fn shares_of(&self, side: Side) -> f64 {
        match side {
            Side::Yes => self.yes_shares,
            Side::No => self.no_shares,
        }
    }

    /// Fold one executed trade into the position. Strictly additive.
    pub fn record_trade(
        &mut self,
        side: Side,
        shares: f64,
        invested_cents: u64,
        timestamp: u64,
    ) {
        match side {
            Side::Yes => self.yes_shares += shares,
            Side::No => self.no_shares += shares,
        }
        self.total_invested_cents += invested_cents;
        self.trade_count += 1;
        self.last_trade_at = timestamp;
    }

    /// Settlement value of this position for a final outcome, in cents.
    ///
    /// Winning shares redeem at 1 KES each (losing shares are forfeited);
    /// an INVALID outcome refunds the invested amount instead. Share
    /// payouts round down per the currency conventions.
    pub fn payout_cents(&self, outcome: Outcome) -> Result<u64, CurrencyError> {
        match outcome.winning_side() {
            Some(side) => {
                currency::to_cents(self.shares_of(side), Rounding::Down)
            }
            None => Ok(self.total_invested_cents),
        }
    }
}

#[derive(Clone)]
pub struct PositionsDatabase {
    /// (market, account) -> position. Keyed market-first so one market's
    /// positions are contiguous.
    positions: DatabaseUnique<
        SerdeBincode<(MarketId, AccountId)>,
        SerdeBincode<Position>,
    >,
}

impl PositionsDatabase {
    pub const NUM_DBS: u32 = 1;

    pub fn new(env: &Env, rwtxn: &mut RwTxn) -> Result<Self, Error> {
        let positions = DatabaseUnique::create(env, rwtxn, "positions")?;
        Ok(PositionsDatabase { positions })
    }

    pub fn try_get(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<Option<Position>, Error> {
        Ok(self.positions.try_get(txn, &(market_id, account))?)
    }

    /// Get-or-create for the upsert path of the trade executor.
    pub fn get_or_default(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<Position, Error> {
        Ok(self.try_get(txn, market_id, account)?.unwrap_or_default())
    }

    pub fn put(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
        account: AccountId,
        position: &Position,
    ) -> Result<(), Error> {
        Ok(self.positions.put(rwtxn, &(market_id, account), position)?)
    }

    /// Every open position in a market.
    pub fn for_market(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Vec<(AccountId, Position)>, Error> {
        let positions = self
            .positions
            .iter(txn)?
            .filter_map(|((mid, account), position)| {
                Ok((mid == market_id).then_some((account, position)))
            })
            .collect()?;
        Ok(positions)
    }

    /// Remove a settled position. Returns whether a row existed.
    pub fn remove(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<bool, Error> {
        Ok(self.positions.delete(rwtxn, &(market_id, account))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_trade_accumulates() {
        let mut position = Position::default();
        position.record_trade(Side::Yes, 40.0, 2_500, 10);
        position.record_trade(Side::Yes, 60.0, 3_500, 20);
        position.record_trade(Side::No, 5.0, 400, 30);

        assert_eq!(position.yes_shares, 100.0);
        assert_eq!(position.no_shares, 5.0);
        assert_eq!(position.total_invested_cents, 6_400);
        assert_eq!(position.trade_count, 3);
        assert_eq!(position.last_trade_at, 30);
    }

    #[test]
    fn test_payout_by_outcome() {
        let position = Position {
            yes_shares: 100.25,
            no_shares: 50.0,
            total_invested_cents: 7_000,
            trade_count: 2,
            last_trade_at: 0,
        };
        // Winning shares redeem 1 KES each, floored to cents.
        assert_eq!(position.payout_cents(Outcome::Yes).unwrap(), 10_025);
        assert_eq!(position.payout_cents(Outcome::No).unwrap(), 5_000);
        // INVALID refunds the invested amount, exactly.
        assert_eq!(position.payout_cents(Outcome::Invalid).unwrap(), 7_000);
    }
}
