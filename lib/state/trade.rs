//! Trade quoting and execution.
//!
//! `execute_trade` performs every write of a trade inside the caller's
//! RwTxn: market quantities, the account position, the cash debit, pool
//! fee revenue, and the trade record either all land or none do. LMDB's
//! single writer serializes trades, so quantities read at the start of the
//! transaction cannot move underneath it.

use tracing::{info, warn};

use crate::{
    audit::AuditEvent,
    math::{
        currency::{self, Rounding},
        lmsr::{self, Side},
    },
    state::{
        Error, State,
        ledger::{LedgerEntryKind, TradeRecord},
        markets::MarketId,
    },
    types::AccountId,
};
use sneed::{RoTxn, RwTxn};

/// Cost/budget convergence tolerance for share sizing, in KES. One cent.
const SHARE_SIZING_TOLERANCE_KES: f64 = 0.01;

const FEE_BPS_SCALE: u128 = 10_000;

/// Fee in cents for a gross stake, rounded up in the platform's favor.
fn fee_cents(stake_cents: u64, fee_bps: u16) -> u64 {
    let fee = (stake_cents as u128 * fee_bps as u128).div_ceil(FEE_BPS_SCALE);
    // stake * bps / 10_000 <= stake, which fits.
    fee as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeRequest {
    pub market_id: MarketId,
    pub account: AccountId,
    pub side: Side,
    /// Gross stake in cents; the fee comes out of this.
    pub stake_cents: u64,
    pub timestamp: u64,
}

/// Read-only preview of a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeQuote {
    pub shares: f64,
    pub cost_cents: u64,
    pub fee_cents: u64,
    /// YES price if the quoted trade were applied.
    pub price_yes_after: f64,
    pub price_yes_before: f64,
    /// Redemption value of the quoted shares if they win, in cents.
    pub potential_payout_cents: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeResult {
    pub trade_seq: u64,
    pub shares: f64,
    pub stake_cents: u64,
    pub cost_cents: u64,
    pub fee_cents: u64,
    pub price_yes_before: f64,
    pub price_yes_after: f64,
}

/// Share sizing shared by quote and execution.
struct SizedTrade {
    shares: f64,
    cost_cents: u64,
    fee_cents: u64,
    net_stake_cents: u64,
    price_yes_before: f64,
    price_yes_after: f64,
}

impl State {
    fn size_trade(
        &self,
        txn: &RoTxn,
        request: &TradeRequest,
    ) -> Result<SizedTrade, Error> {
        let market = self.markets.get(txn, request.market_id)?;
        if !market.status.allows_trading() {
            return Err(crate::state::markets::MarketError::NotActive {
                id: market.id,
                status: market.status,
            }
            .into());
        }
        if request.stake_cents == 0 {
            return Err(Error::InvalidStake);
        }
        let config = self.config(txn)?;
        let fee_cents = fee_cents(request.stake_cents, config.fee_bps_for(&market));
        let net_stake_cents = request.stake_cents.saturating_sub(fee_cents);
        if net_stake_cents == 0 {
            return Err(Error::NegligibleShareAmount {
                account: request.account,
                stake_cents: request.stake_cents,
            });
        }

        let budget_kes = currency::to_kes(net_stake_cents);
        let shares = lmsr::shares_for_budget(
            market.b,
            market.q_yes,
            market.q_no,
            request.side,
            budget_kes,
            SHARE_SIZING_TOLERANCE_KES,
        )?;
        if shares <= 0.0 {
            return Err(Error::NegligibleShareAmount {
                account: request.account,
                stake_cents: request.stake_cents,
            });
        }
        let cost_kes = lmsr::cost_to_buy(
            market.b,
            market.q_yes,
            market.q_no,
            request.side,
            shares,
        )?;
        // The cost converged to within tolerance of the budget; never charge
        // past what the account staked.
        let cost_cents =
            currency::to_cents(cost_kes, Rounding::Up)?.min(net_stake_cents);

        let price_yes_before = market.prices()?.yes;
        let mut after = market.clone();
        after.apply_trade(request.side, shares);
        let price_yes_after = after.prices()?.yes;

        Ok(SizedTrade {
            shares,
            cost_cents,
            fee_cents,
            net_stake_cents,
            price_yes_before,
            price_yes_after,
        })
    }

    /// Price a prospective trade without touching state.
    pub fn quote_trade(
        &self,
        txn: &RoTxn,
        request: &TradeRequest,
    ) -> Result<TradeQuote, Error> {
        let sized = self.size_trade(txn, request)?;
        let potential_payout_cents =
            currency::to_cents(sized.shares, Rounding::Down)?;
        Ok(TradeQuote {
            shares: sized.shares,
            cost_cents: sized.cost_cents,
            fee_cents: sized.fee_cents,
            price_yes_after: sized.price_yes_after,
            price_yes_before: sized.price_yes_before,
            potential_payout_cents,
        })
    }

    /// Execute a buy against the market maker.
    ///
    /// Validates everything first, then applies all six writes (market
    /// quantities, position, balance debit, ledger entry, pool fees, trade
    /// record) in the caller's transaction.
    pub fn execute_trade(
        &self,
        rwtxn: &mut RwTxn,
        request: &TradeRequest,
    ) -> Result<TradeResult, Error> {
        let sized = self.size_trade(rwtxn, request)?;
        let balance = self.ledger.balance_of(rwtxn, request.account)?;
        if request.stake_cents > balance {
            return Err(crate::state::ledger::LedgerError::InsufficientBalance {
                account: request.account,
                required_cents: request.stake_cents,
                available_cents: balance,
            }
            .into());
        }

        let mut market = self.markets.get(rwtxn, request.market_id)?;
        let old_status = market.status;
        let (q_yes_before, q_no_before) = (market.q_yes, market.q_no);
        market.apply_trade(request.side, sized.shares);
        self.markets.update(rwtxn, &market, old_status)?;

        let mut position = self.positions.get_or_default(
            rwtxn,
            request.market_id,
            request.account,
        )?;
        position.record_trade(
            request.side,
            sized.shares,
            sized.net_stake_cents,
            request.timestamp,
        );
        self.positions.put(
            rwtxn,
            request.market_id,
            request.account,
            &position,
        )?;

        self.ledger.debit(
            rwtxn,
            request.account,
            request.stake_cents,
            LedgerEntryKind::Stake,
            format!("TRADE-{}-{}", request.market_id, request.side),
            Some(request.market_id),
            request.timestamp,
        )?;

        let mut pool = self.pool(rwtxn)?;
        pool.credit_fees(sized.fee_cents);
        pool.check_conservation()?;
        self.put_pool(rwtxn, &pool)?;

        let record = self.ledger.append_trade(
            rwtxn,
            TradeRecord {
                seq: 0,
                market_id: request.market_id,
                account: request.account,
                side: request.side,
                shares: sized.shares,
                stake_cents: request.stake_cents,
                cost_cents: sized.cost_cents,
                fee_cents: sized.fee_cents,
                price_yes: sized.price_yes_after,
                q_yes_before,
                q_no_before,
                q_yes_after: market.q_yes,
                q_no_after: market.q_no,
                timestamp: request.timestamp,
            },
        )?;

        info!(
            market = %request.market_id,
            account = %request.account,
            side = %request.side,
            shares = sized.shares,
            stake_cents = request.stake_cents,
            fee_cents = sized.fee_cents,
            price_yes = sized.price_yes_after,
            "trade executed"
        );
        // Emitted pre-commit; see the audit module docs.
        let event = AuditEvent {
            actor: request.account.to_string(),
            action: "trade.execute".to_owned(),
            resource: request.market_id.to_string(),
            details: serde_json::json!({
                "side": request.side.to_string(),
                "shares": sized.shares,
                "stake_cents": request.stake_cents,
                "fee_cents": sized.fee_cents,
                "price_yes": sized.price_yes_after,
            }),
            timestamp: request.timestamp,
        };
        if let Err(err) = self.audit.append(&event) {
            warn!("failed to record audit event: {err}");
        }

        Ok(TradeResult {
            trade_seq: record.seq,
            shares: sized.shares,
            stake_cents: request.stake_cents,
            cost_cents: sized.cost_cents,
            fee_cents: sized.fee_cents,
            price_yes_before: sized.price_yes_before,
            price_yes_after: sized.price_yes_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_rounds_up() {
        // 1% of 1001 cents is 10.01, charged as 11.
        assert_eq!(fee_cents(1_001, 100), 11);
        assert_eq!(fee_cents(1_000, 100), 10);
        assert_eq!(fee_cents(1_000, 0), 0);
        // 100% fee consumes the whole stake.
        assert_eq!(fee_cents(777, 10_000), 777);
    }
}
