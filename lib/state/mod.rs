//! Engine state, backed by LMDB.
//!
//! All financial state lives in one LMDB environment. Mutations happen
//! inside a single RwTxn per operation: the caller opens the transaction,
//! runs one or more operations, and commits. LMDB allows one writer at a
//! time, so operations serialize at the transaction boundary and read-only
//! snapshots (quotes, balances, history) never observe a half-applied
//! trade or settlement.

use std::sync::Arc;

use heed::types::SerdeBincode;
use serde::{Deserialize, Serialize};
use sneed::{DatabaseUnique, Env, RoTxn, RwTxn, UnitKey};
use tracing::info;

use crate::{
    audit::{AuditSink, TracingAuditSink},
    state::{
        ledger::{LedgerDatabase, LedgerEntry, LedgerEntryKind},
        markets::{Market, MarketId, MarketStatus, MarketsDatabase},
        pool::{LiquidityPool, ShortfallPolicy},
        positions::{Position, PositionsDatabase},
    },
    types::AccountId,
};

pub mod error;
pub mod ledger;
pub mod markets;
pub mod pool;
pub mod positions;
mod resolve;
mod trade;

pub use error::Error;
pub use resolve::ResolutionSummary;
pub use trade::{TradeQuote, TradeRequest, TradeResult};

/// Engine-wide settings, stored as a singleton row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trading fee in basis points, applied to the gross stake.
    pub default_fee_bps: u16,
    pub shortfall_policy: ShortfallPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_fee_bps: 100,
            shortfall_policy: ShortfallPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn fee_bps_for(&self, market: &Market) -> u16 {
        market.fee_override_bps.unwrap_or(self.default_fee_bps)
    }
}

#[derive(Clone)]
pub struct State {
    pub markets: MarketsDatabase,
    pub positions: PositionsDatabase,
    pub ledger: LedgerDatabase,
    /// Singleton pool row.
    pool: DatabaseUnique<UnitKey, SerdeBincode<LiquidityPool>>,
    /// Singleton engine configuration row.
    config: DatabaseUnique<UnitKey, SerdeBincode<EngineConfig>>,
    audit: Arc<dyn AuditSink>,
}

impl State {
    pub const NUM_DBS: u32 = MarketsDatabase::NUM_DBS
        + PositionsDatabase::NUM_DBS
        + LedgerDatabase::NUM_DBS
        + 2;

    /// Open (or initialize) the engine state in `env`.
    pub fn new(env: &Env) -> Result<Self, Error> {
        let mut rwtxn = env.write_txn()?;
        let markets = MarketsDatabase::new(env, &mut rwtxn)?;
        let positions = PositionsDatabase::new(env, &mut rwtxn)?;
        let ledger = LedgerDatabase::new(env, &mut rwtxn)?;
        let pool = DatabaseUnique::create(env, &mut rwtxn, "pool")?;
        let config = DatabaseUnique::create(env, &mut rwtxn, "config")?;
        if pool.try_get(&rwtxn, &())?.is_none() {
            pool.put(&mut rwtxn, &(), &LiquidityPool::default())?;
        }
        if config.try_get(&rwtxn, &())?.is_none() {
            config.put(&mut rwtxn, &(), &EngineConfig::default())?;
        }
        rwtxn.commit()?;
        Ok(Self {
            markets,
            positions,
            ledger,
            pool,
            config,
            audit: Arc::new(TracingAuditSink),
        })
    }

    /// Replace the audit sink (defaults to tracing).
    pub fn set_audit_sink(&mut self, sink: Arc<dyn AuditSink>) {
        self.audit = sink;
    }

    pub fn pool(&self, rotxn: &RoTxn) -> Result<LiquidityPool, Error> {
        Ok(self.pool.try_get(rotxn, &())?.unwrap_or_default())
    }

    pub(in crate::state) fn put_pool(
        &self,
        rwtxn: &mut RwTxn,
        pool: &LiquidityPool,
    ) -> Result<(), Error> {
        Ok(self.pool.put(rwtxn, &(), pool)?)
    }

    pub fn config(&self, rotxn: &RoTxn) -> Result<EngineConfig, Error> {
        Ok(self.config.try_get(rotxn, &())?.unwrap_or_default())
    }

    pub fn set_config(
        &self,
        rwtxn: &mut RwTxn,
        config: &EngineConfig,
    ) -> Result<(), Error> {
        Ok(self.config.put(rwtxn, &(), config)?)
    }

    /// Add capital to the shared liquidity pool.
    pub fn fund_pool(
        &self,
        rwtxn: &mut RwTxn,
        amount_cents: u64,
    ) -> Result<LiquidityPool, Error> {
        let mut pool = self.pool(rwtxn)?;
        pool.fund(amount_cents);
        pool.check_conservation()?;
        self.put_pool(rwtxn, &pool)?;
        info!(amount_cents, total_cents = pool.total_cents, "pool funded");
        Ok(pool)
    }

    /// Credit external funds to an account's cash balance.
    pub fn deposit(
        &self,
        rwtxn: &mut RwTxn,
        account: AccountId,
        amount_cents: u64,
        timestamp: u64,
    ) -> Result<LedgerEntry, Error> {
        self.ledger.credit(
            rwtxn,
            account,
            amount_cents,
            LedgerEntryKind::Deposit,
            "DEPOSIT".to_owned(),
            None,
            timestamp,
        )
    }

    /// Create a market, reserving its collateral from the pool.
    pub fn create_market(
        &self,
        rwtxn: &mut RwTxn,
        title: String,
        b: f64,
        initial_liquidity_cents: u64,
        fee_override_bps: Option<u16>,
        timestamp: u64,
    ) -> Result<Market, Error> {
        let mut pool = self.pool(rwtxn)?;
        if initial_liquidity_cents > pool.available_cents {
            return Err(Error::InsufficientPoolLiquidity {
                required_cents: initial_liquidity_cents,
                available_cents: pool.available_cents,
            });
        }
        let id = self.markets.allocate_id(rwtxn)?;
        let market = Market::new(
            id,
            title,
            b,
            initial_liquidity_cents,
            fee_override_bps,
            timestamp,
        )
        .map_err(Error::Market)?;

        pool.lock(initial_liquidity_cents)?;
        self.put_pool(rwtxn, &pool)?;
        self.markets.put_new(rwtxn, &market)?;
        info!(
            market = %market.id,
            b = market.b,
            initial_liquidity_cents,
            "market created"
        );
        Ok(market)
    }

    /// Suspend trading on a market.
    pub fn pause_market(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
    ) -> Result<Market, Error> {
        self.transition_market(rwtxn, market_id, MarketStatus::Paused)
    }

    /// Reopen a paused market for trading.
    pub fn resume_market(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
    ) -> Result<Market, Error> {
        self.transition_market(rwtxn, market_id, MarketStatus::Active)
    }

    fn transition_market(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
        new_status: MarketStatus,
    ) -> Result<Market, Error> {
        let mut market = self.markets.get(rwtxn, market_id)?;
        let old_status = market.status;
        market.transition_to(new_status).map_err(Error::Market)?;
        self.markets.update(rwtxn, &market, old_status)?;
        info!(market = %market_id, status = %new_status, "market status changed");
        Ok(market)
    }

    pub fn try_get_market(
        &self,
        rotxn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Option<Market>, Error> {
        self.markets.try_get(rotxn, market_id)
    }

    pub fn get_position(
        &self,
        rotxn: &RoTxn,
        market_id: MarketId,
        account: AccountId,
    ) -> Result<Option<Position>, Error> {
        self.positions.try_get(rotxn, market_id, account)
    }

    pub fn balance_of(
        &self,
        rotxn: &RoTxn,
        account: AccountId,
    ) -> Result<u64, Error> {
        self.ledger.balance_of(rotxn, account)
    }

    pub fn positions_for_market(
        &self,
        rotxn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Vec<(AccountId, Position)>, Error> {
        self.positions.for_market(rotxn, market_id)
    }

    /// Worst-case platform exposure of a market (`b * ln 2`), in KES.
    pub fn max_exposure(
        &self,
        rotxn: &RoTxn,
        market_id: MarketId,
    ) -> Result<f64, Error> {
        let market = self.markets.get(rotxn, market_id)?;
        Ok(market.max_exposure()?)
    }

    /// (timestamp, YES price) pairs for a market, in trade order.
    pub fn price_history(
        &self,
        rotxn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Vec<(u64, f64)>, Error> {
        self.ledger.price_history(rotxn, market_id)
    }
}
