//! Pure market math: LMSR pricing and currency conversion.

pub mod currency;
pub mod lmsr;
