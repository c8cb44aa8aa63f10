//! Market resolution and settlement.
//!
//! Resolving a market settles every open position in it atomically: all
//! payouts are computed first, then the pool releases the market's
//! reservation, then winners are credited and the settled position rows
//! deleted. Any failure before the caller commits rolls everything back,
//! so a market can never be left half settled.

use tracing::{info, warn};

use crate::{
    audit::AuditEvent,
    state::{
        Error, State,
        ledger::{self, LedgerEntryKind},
        markets::{MarketError, MarketId, Outcome},
    },
    types::AccountId,
};
use sneed::RwTxn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionSummary {
    pub market_id: MarketId,
    pub outcome: Outcome,
    /// Open positions settled (and deleted), winners or not.
    pub positions_settled: u64,
    /// Accounts credited a non-zero amount (winners, or everyone refunded
    /// under an INVALID outcome).
    pub accounts_paid: u64,
    pub total_payout_cents: u64,
    /// Reservation released back through the pool.
    pub released_reserve_cents: u64,
    /// Payouts absorbed beyond the reserve, zero unless the pool fell short.
    pub pool_shortfall_cents: u64,
    pub resolved_at: u64,
}

impl State {
    /// Resolve a market to a final outcome and settle all its positions.
    ///
    /// YES/NO redeem the winning side's shares at 1 KES each; INVALID
    /// refunds every position's invested stake. Fails without writing if
    /// the market is already resolved, or if the payouts overrun the
    /// reserve under [`ShortfallPolicy::Reject`].
    ///
    /// [`ShortfallPolicy::Reject`]: crate::state::pool::ShortfallPolicy::Reject
    pub fn resolve_market(
        &self,
        rwtxn: &mut RwTxn,
        market_id: MarketId,
        outcome: Outcome,
        resolver: AccountId,
        evidence: Option<String>,
        timestamp: u64,
    ) -> Result<ResolutionSummary, Error> {
        let mut market = self.markets.get(rwtxn, market_id)?;
        if market.status.is_terminal() {
            return Err(MarketError::AlreadyResolved { id: market_id }.into());
        }
        let old_status = market.status;

        // Settle phase 1: compute every payout before any write.
        let positions = self.positions.for_market(rwtxn, market_id)?;
        let mut payouts: Vec<(AccountId, u64)> =
            Vec::with_capacity(positions.len());
        let mut total_payout_cents: u64 = 0;
        for (account, position) in &positions {
            let payout_cents = position.payout_cents(outcome)?;
            total_payout_cents += payout_cents;
            payouts.push((*account, payout_cents));
        }

        let config = self.config(rwtxn)?;
        let reserve_cents = market.initial_liquidity_cents;
        let mut pool = self.pool(rwtxn)?;
        let pool_shortfall_cents = pool.release(
            reserve_cents,
            total_payout_cents,
            config.shortfall_policy,
        )?;

        // Settle phase 2: apply.
        market.mark_resolved(outcome, resolver, timestamp)?;
        self.markets.update(rwtxn, &market, old_status)?;
        self.put_pool(rwtxn, &pool)?;

        let reference = ledger::payout_reference(market_id, outcome);
        let entry_kind = match outcome.winning_side() {
            Some(_) => LedgerEntryKind::Payout,
            None => LedgerEntryKind::Refund,
        };
        let mut accounts_paid: u64 = 0;
        for (account, payout_cents) in &payouts {
            if *payout_cents > 0 {
                self.ledger.credit(
                    rwtxn,
                    *account,
                    *payout_cents,
                    entry_kind,
                    reference.clone(),
                    Some(market_id),
                    timestamp,
                )?;
                accounts_paid += 1;
            }
            self.positions.remove(rwtxn, market_id, *account)?;
        }

        let summary = ResolutionSummary {
            market_id,
            outcome,
            positions_settled: positions.len() as u64,
            accounts_paid,
            total_payout_cents,
            released_reserve_cents: reserve_cents,
            pool_shortfall_cents,
            resolved_at: timestamp,
        };
        info!(
            market = %market_id,
            outcome = %outcome,
            positions_settled = summary.positions_settled,
            accounts_paid = summary.accounts_paid,
            total_payout_cents = summary.total_payout_cents,
            pool_shortfall_cents = summary.pool_shortfall_cents,
            "market resolved"
        );
        // Emitted pre-commit; see the audit module docs.
        let event = AuditEvent {
            actor: resolver.to_string(),
            action: "market.resolve".to_owned(),
            resource: market_id.to_string(),
            details: serde_json::json!({
                "outcome": outcome.to_string(),
                "evidence": evidence,
                "positions_settled": summary.positions_settled,
                "total_payout_cents": summary.total_payout_cents,
                "pool_shortfall_cents": summary.pool_shortfall_cents,
            }),
            timestamp,
        };
        if let Err(err) = self.audit.append(&event) {
            warn!("failed to record audit event: {err}");
        }
        Ok(summary)
    }
}
