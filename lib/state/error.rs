//! State errors

use sneed::{db::error as db, env::error as env, rwtxn::error as rwtxn};
use thiserror::Error;
use transitive::Transitive;

use crate::types::AccountId;

#[derive(Debug, Error, Transitive)]
#[transitive(from(db::Clear, db::Error))]
#[transitive(from(db::Delete, db::Error))]
#[transitive(from(db::Error, sneed::Error))]
#[transitive(from(db::IterInit, db::Error))]
#[transitive(from(db::IterItem, db::Error))]
#[transitive(from(db::Last, db::Error))]
#[transitive(from(db::Put, db::Error))]
#[transitive(from(db::TryGet, db::Error))]
#[transitive(from(env::CreateDb, env::Error))]
#[transitive(from(env::Error, sneed::Error))]
#[transitive(from(env::WriteTxn, env::Error))]
#[transitive(from(rwtxn::Commit, rwtxn::Error))]
#[transitive(from(rwtxn::Error, sneed::Error))]
pub enum Error {
    #[error(transparent)]
    Currency(#[from] crate::math::currency::CurrencyError),
    #[error(transparent)]
    Db(#[from] sneed::Error),
    #[error(transparent)]
    Ledger(#[from] crate::state::ledger::LedgerError),
    #[error(transparent)]
    Lmsr(#[from] crate::math::lmsr::LmsrError),
    #[error(transparent)]
    Market(#[from] crate::state::markets::MarketError),
    #[error(transparent)]
    Pool(#[from] crate::state::pool::PoolError),

    #[error(
        "insufficient pool liquidity: required {required_cents}, available {available_cents}"
    )]
    InsufficientPoolLiquidity {
        required_cents: u64,
        available_cents: u64,
    },
    #[error("stake must be positive")]
    InvalidStake,
    #[error(
        "stake of {stake_cents} for {account} buys a negligible number of shares"
    )]
    NegligibleShareAmount {
        account: AccountId,
        stake_cents: u64,
    },
}
