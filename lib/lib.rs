//! LMSR prediction-market engine.
//!
//! Binary YES/NO markets priced by a logarithmic market scoring rule
//! market maker, with trade execution, a shared liquidity pool, and
//! atomic resolution/settlement on top of LMDB.

pub mod audit;
pub mod math;
pub mod state;
pub mod types;

pub use state::{Error, State};
