//! Market rows and their database.
//!
//! A market is a binary LMSR book: two outstanding share quantities, a fixed
//! liquidity parameter `b`, and a status machine. Quantities only move
//! through the trade executor while the market is active; the status only
//! moves through the transitions below.

use heed::types::SerdeBincode;
use serde::{Deserialize, Serialize};
use sneed::{DatabaseUnique, Env, RoTxn, RwTxn, UnitKey};
use thiserror::Error as ThisError;

use crate::{
    math::lmsr::{self, LmsrError, MarketPrices, Side},
    state::Error,
    types::AccountId,
};

/// Unique identifier for a market (6 bytes, hex-displayed).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Ord,
    PartialOrd,
    Serialize,
    Deserialize,
)]
pub struct MarketId(pub [u8; 6]);

impl MarketId {
    pub fn new(data: [u8; 6]) -> Self {
        Self(data)
    }

    /// Derive an id from a monotonic sequence number.
    pub fn from_seq(seq: u64) -> Self {
        let bytes = seq.to_be_bytes();
        let mut id = [0u8; 6];
        id.copy_from_slice(&bytes[2..8]);
        Self(id)
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl std::fmt::Display for MarketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Final outcome of a resolved market.
///
/// `Invalid` means neither side is deemed to have won; resolution refunds
/// every position's invested amount instead of redeeming shares.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Outcome {
    Yes,
    No,
    Invalid,
}

impl Outcome {
    /// The side whose shares redeem at 1 KES each, if any.
    pub fn winning_side(self) -> Option<Side> {
        match self {
            Outcome::Yes => Some(Side::Yes),
            Outcome::No => Some(Side::No),
            Outcome::Invalid => None,
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Paused,
    Resolved,
}

impl MarketStatus {
    pub fn can_transition_to(&self, new_status: MarketStatus) -> bool {
        use MarketStatus::{Active, Paused, Resolved};
        match (self, new_status) {
            (Active, Paused) => true,
            (Paused, Active) => true,
            (Active, Resolved) => true,
            (Paused, Resolved) => true,
            // Resolved is terminal
            (Resolved, _) => false,
            (status, new_status) if status == &new_status => true,
            _ => false,
        }
    }

    pub fn allows_trading(&self) -> bool {
        matches!(self, MarketStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketStatus::Resolved)
    }
}

/// Market-specific error types
#[derive(Debug, ThisError, Clone)]
pub enum MarketError {
    #[error("market not found: {id}")]
    NotFound { id: MarketId },

    #[error("market {id} is not active (status: {status})")]
    NotActive { id: MarketId, status: MarketStatus },

    #[error("market {id} is already resolved")]
    AlreadyResolved { id: MarketId },

    #[error("invalid status transition from {from} to {to}")]
    InvalidStatusTransition { from: MarketStatus, to: MarketStatus },

    #[error("initial liquidity must be positive")]
    InvalidInitialLiquidity,

    #[error(transparent)]
    Pricing(#[from] LmsrError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub id: MarketId,
    pub title: String,
    /// LMSR liquidity parameter. Fixed at creation, never mutated.
    pub b: f64,
    /// Outstanding YES shares sold by the market maker.
    pub q_yes: f64,
    /// Outstanding NO shares sold by the market maker.
    pub q_no: f64,
    /// Pool collateral reserved against this market's worst-case payout.
    pub initial_liquidity_cents: u64,
    pub status: MarketStatus,
    pub resolved_outcome: Option<Outcome>,
    pub resolver: Option<AccountId>,
    pub resolved_at: Option<u64>,
    pub created_at: u64,
    /// Per-market fee override in basis points; `None` uses the global fee.
    pub fee_override_bps: Option<u16>,
}

impl Market {
    pub fn new(
        id: MarketId,
        title: String,
        b: f64,
        initial_liquidity_cents: u64,
        fee_override_bps: Option<u16>,
        created_at: u64,
    ) -> Result<Self, MarketError> {
        // Validates the liquidity parameter range as a side effect.
        let _exposure = lmsr::max_exposure(b)?;
        if initial_liquidity_cents == 0 {
            return Err(MarketError::InvalidInitialLiquidity);
        }
        Ok(Self {
            id,
            title,
            b,
            q_yes: 0.0,
            q_no: 0.0,
            initial_liquidity_cents,
            status: MarketStatus::Active,
            resolved_outcome: None,
            resolver: None,
            resolved_at: None,
            created_at,
            fee_override_bps,
        })
    }

    pub fn prices(&self) -> Result<MarketPrices, LmsrError> {
        lmsr::prices(self.b, self.q_yes, self.q_no)
    }

    /// Worst-case platform exposure for this market: `b * ln(2)`, in KES.
    pub fn max_exposure(&self) -> Result<f64, LmsrError> {
        lmsr::max_exposure(self.b)
    }

    /// Add bought shares to the outstanding quantity of `side`.
    ///
    /// Callers must have validated the trade; quantities only ever grow.
    pub fn apply_trade(&mut self, side: Side, shares: f64) {
        match side {
            Side::Yes => self.q_yes += shares,
            Side::No => self.q_no += shares,
        }
    }

    pub fn transition_to(
        &mut self,
        new_status: MarketStatus,
    ) -> Result<(), MarketError> {
        if !self.status.can_transition_to(new_status) {
            return Err(MarketError::InvalidStatusTransition {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        Ok(())
    }

    /// Flip the market to its terminal state.
    ///
    /// Keeps the `status == resolved <=> resolved_outcome.is_some()`
    /// invariant: outcome, resolver and timestamp are set in the same step
    /// as the status.
    pub fn mark_resolved(
        &mut self,
        outcome: Outcome,
        resolver: AccountId,
        timestamp: u64,
    ) -> Result<(), MarketError> {
        if self.status.is_terminal() {
            return Err(MarketError::AlreadyResolved { id: self.id });
        }
        self.transition_to(MarketStatus::Resolved)?;
        self.resolved_outcome = Some(outcome);
        self.resolver = Some(resolver);
        self.resolved_at = Some(timestamp);
        Ok(())
    }
}

/// Database wrapper for market storage with a status secondary index.
#[derive(Clone)]
pub struct MarketsDatabase {
    /// Primary market storage by id.
    markets: DatabaseUnique<SerdeBincode<MarketId>, SerdeBincode<Market>>,
    /// Secondary index: MarketStatus -> Vec<MarketId>.
    status_index:
        DatabaseUnique<SerdeBincode<MarketStatus>, SerdeBincode<Vec<MarketId>>>,
    /// Monotonic id allocator.
    next_seq: DatabaseUnique<UnitKey, SerdeBincode<u64>>,
}

impl MarketsDatabase {
    pub const NUM_DBS: u32 = 3;

    /// Create the markets databases. Does not commit the RwTxn.
    pub fn new(env: &Env, rwtxn: &mut RwTxn) -> Result<Self, Error> {
        let markets = DatabaseUnique::create(env, rwtxn, "markets")?;
        let status_index =
            DatabaseUnique::create(env, rwtxn, "markets_by_status")?;
        let next_seq =
            DatabaseUnique::create(env, rwtxn, "markets_next_seq")?;
        Ok(MarketsDatabase {
            markets,
            status_index,
            next_seq,
        })
    }

    pub fn allocate_id(&self, rwtxn: &mut RwTxn) -> Result<MarketId, Error> {
        let seq = self.next_seq.try_get(rwtxn, &())?.unwrap_or(0) + 1;
        self.next_seq.put(rwtxn, &(), &seq)?;
        Ok(MarketId::from_seq(seq))
    }

    /// Insert a new market and index it by status.
    pub fn put_new(
        &self,
        rwtxn: &mut RwTxn,
        market: &Market,
    ) -> Result<(), Error> {
        self.markets.put(rwtxn, &market.id, market)?;
        self.update_status_index(rwtxn, market.id, None, Some(market.status))
    }

    pub fn try_get(
        &self,
        txn: &RoTxn,
        market_id: MarketId,
    ) -> Result<Option<Market>, Error> {
        Ok(self.markets.try_get(txn, &market_id)?)
    }

    pub fn get(&self, txn: &RoTxn, market_id: MarketId) -> Result<Market, Error> {
        self.try_get(txn, market_id)?.ok_or_else(|| {
            Error::Market(MarketError::NotFound { id: market_id })
        })
    }

    /// Write back a mutated market, maintaining the status index.
    ///
    /// `old_status` is the status the row had when it was read inside this
    /// same transaction.
    pub fn update(
        &self,
        rwtxn: &mut RwTxn,
        market: &Market,
        old_status: MarketStatus,
    ) -> Result<(), Error> {
        self.markets.put(rwtxn, &market.id, market)?;
        if old_status != market.status {
            self.update_status_index(
                rwtxn,
                market.id,
                Some(old_status),
                Some(market.status),
            )?;
        }
        Ok(())
    }

    pub fn markets_by_status(
        &self,
        txn: &RoTxn,
        status: MarketStatus,
    ) -> Result<Vec<MarketId>, Error> {
        Ok(self.status_index.try_get(txn, &status)?.unwrap_or_default())
    }

    fn update_status_index(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
        old_status: Option<MarketStatus>,
        new_status: Option<MarketStatus>,
    ) -> Result<(), Error> {
        if let Some(old) = old_status {
            let mut market_ids =
                self.status_index.try_get(rwtxn, &old)?.unwrap_or_default();
            market_ids.retain(|id| *id != market_id);
            if market_ids.is_empty() {
                self.status_index.delete(rwtxn, &old)?;
            } else {
                self.status_index.put(rwtxn, &old, &market_ids)?;
            }
        }
        if let Some(new) = new_status {
            let mut market_ids =
                self.status_index.try_get(rwtxn, &new)?.unwrap_or_default();
            if !market_ids.contains(&market_id) {
                market_ids.push(market_id);
                self.status_index.put(rwtxn, &new, &market_ids)?;
            }
        }
        Ok(())
    }
}
