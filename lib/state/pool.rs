//! Shared liquidity pool.
//!
//! One pool backs every market. Creating a market moves collateral from
//! available to locked; resolving it releases the reservation and settles
//! the pool's net result on the market. The conservation invariant
//! `total == locked + available` must hold before and after every
//! operation; fees are additive revenue tracked separately and are never
//! drawn from the pool total.

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

#[derive(Debug, ThisError, Clone)]
pub enum PoolError {
    #[error(
        "pool conservation violated: total {total_cents} != locked {locked_cents} + available {available_cents}"
    )]
    Conservation {
        total_cents: u64,
        locked_cents: u64,
        available_cents: u64,
    },

    #[error(
        "insufficient pool liquidity: requested {requested_cents}, available {available_cents}"
    )]
    InsufficientAvailable {
        requested_cents: u64,
        available_cents: u64,
    },

    #[error(
        "release of {requested_cents} exceeds locked liquidity {locked_cents}"
    )]
    ReleaseExceedsLocked {
        requested_cents: u64,
        locked_cents: u64,
    },

    #[error(
        "payouts {payout_cents} exceed reserved liquidity {reserve_cents} and the shortfall policy rejects the overrun"
    )]
    ShortfallExceedsReserve {
        payout_cents: u64,
        reserve_cents: u64,
    },

    #[error(
        "pool insolvent: shortfall {shortfall_cents} exceeds available liquidity {available_cents}"
    )]
    Insolvent {
        shortfall_cents: u64,
        available_cents: u64,
    },
}

/// What to do when a market's payouts exceed its reserved liquidity.
///
/// The reservation (`b * ln 2`-sized at creation) does not provably cover
/// every payout pattern, so settlement may come up short. `Absorb` settles
/// the excess from available liquidity and reports it on the resolution
/// summary; `Reject` fails the resolution before any write.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum ShortfallPolicy {
    #[default]
    Absorb,
    Reject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidityPool {
    pub total_cents: u64,
    pub locked_cents: u64,
    pub available_cents: u64,
    /// Cumulative trading fees. Revenue, not part of `total_cents`.
    pub fees_collected_cents: u64,
}

impl LiquidityPool {
    pub fn check_conservation(&self) -> Result<(), PoolError> {
        if self.total_cents
            != self.locked_cents.saturating_add(self.available_cents)
        {
            return Err(PoolError::Conservation {
                total_cents: self.total_cents,
                locked_cents: self.locked_cents,
                available_cents: self.available_cents,
            });
        }
        Ok(())
    }

    /// Inject capital: grows both total and available.
    pub fn fund(&mut self, amount_cents: u64) {
        self.total_cents += amount_cents;
        self.available_cents += amount_cents;
    }

    /// Reserve collateral for a new market (available -> locked).
    pub fn lock(&mut self, amount_cents: u64) -> Result<(), PoolError> {
        if amount_cents > self.available_cents {
            return Err(PoolError::InsufficientAvailable {
                requested_cents: amount_cents,
                available_cents: self.available_cents,
            });
        }
        self.available_cents -= amount_cents;
        self.locked_cents += amount_cents;
        self.check_conservation()
    }

    /// Release a market's reservation and settle its payouts.
    ///
    /// `locked` drops by the reserve; `available` gains the unspent part of
    /// the reserve (or loses the overrun, under `Absorb`); `total` drops by
    /// the payouts, which leave the pool. Returns the shortfall absorbed
    /// beyond the reserve, for the resolution summary.
    pub fn release(
        &mut self,
        reserve_cents: u64,
        payout_cents: u64,
        policy: ShortfallPolicy,
    ) -> Result<u64, PoolError> {
        if reserve_cents > self.locked_cents {
            return Err(PoolError::ReleaseExceedsLocked {
                requested_cents: reserve_cents,
                locked_cents: self.locked_cents,
            });
        }
        let shortfall_cents = payout_cents.saturating_sub(reserve_cents);
        if shortfall_cents > 0 {
            match policy {
                ShortfallPolicy::Reject => {
                    return Err(PoolError::ShortfallExceedsReserve {
                        payout_cents,
                        reserve_cents,
                    });
                }
                ShortfallPolicy::Absorb => {
                    if shortfall_cents > self.available_cents {
                        return Err(PoolError::Insolvent {
                            shortfall_cents,
                            available_cents: self.available_cents,
                        });
                    }
                }
            }
        }

        self.locked_cents -= reserve_cents;
        if shortfall_cents > 0 {
            self.available_cents -= shortfall_cents;
        } else {
            self.available_cents += reserve_cents - payout_cents;
        }
        self.total_cents -= payout_cents;
        self.check_conservation()?;
        Ok(shortfall_cents)
    }

    /// Credit trading fee revenue. Tracked outside the total.
    pub fn credit_fees(&mut self, fee_cents: u64) {
        self.fees_collected_cents += fee_cents;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(available: u64) -> LiquidityPool {
        let mut pool = LiquidityPool::default();
        pool.fund(available);
        pool
    }

    #[test]
    fn test_lock_moves_available_to_locked() {
        let mut pool = pool_with(100_000);
        pool.lock(30_000).unwrap();
        assert_eq!(pool.locked_cents, 30_000);
        assert_eq!(pool.available_cents, 70_000);
        assert_eq!(pool.total_cents, 100_000);

        let err = pool.lock(80_000).unwrap_err();
        assert!(matches!(err, PoolError::InsufficientAvailable { .. }));
    }

    #[test]
    fn test_release_within_reserve() {
        let mut pool = pool_with(100_000);
        pool.lock(30_000).unwrap();

        let shortfall =
            pool.release(30_000, 10_000, ShortfallPolicy::Absorb).unwrap();
        assert_eq!(shortfall, 0);
        assert_eq!(pool.locked_cents, 0);
        // Unspent reserve returns; payouts leave the pool entirely.
        assert_eq!(pool.available_cents, 90_000);
        assert_eq!(pool.total_cents, 90_000);
    }

    #[test]
    fn test_release_shortfall_absorbed() {
        let mut pool = pool_with(100_000);
        pool.lock(30_000).unwrap();

        let shortfall =
            pool.release(30_000, 45_000, ShortfallPolicy::Absorb).unwrap();
        assert_eq!(shortfall, 15_000);
        assert_eq!(pool.locked_cents, 0);
        assert_eq!(pool.available_cents, 55_000);
        assert_eq!(pool.total_cents, 55_000);
    }

    #[test]
    fn test_release_shortfall_rejected() {
        let mut pool = pool_with(100_000);
        pool.lock(30_000).unwrap();

        let err = pool
            .release(30_000, 45_000, ShortfallPolicy::Reject)
            .unwrap_err();
        assert!(matches!(err, PoolError::ShortfallExceedsReserve { .. }));
        // Failed release leaves the pool untouched.
        assert_eq!(pool.locked_cents, 30_000);
        assert_eq!(pool.available_cents, 70_000);
    }

    #[test]
    fn test_release_insolvency() {
        let mut pool = pool_with(40_000);
        pool.lock(30_000).unwrap();

        let err = pool
            .release(30_000, 50_000, ShortfallPolicy::Absorb)
            .unwrap_err();
        assert!(matches!(err, PoolError::Insolvent { .. }));
    }

    #[test]
    fn test_fees_do_not_touch_total() {
        let mut pool = pool_with(10_000);
        pool.credit_fees(250);
        assert_eq!(pool.fees_collected_cents, 250);
        assert_eq!(pool.total_cents, 10_000);
        pool.check_conservation().unwrap();
    }
}
