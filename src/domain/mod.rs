//! Domain layer types and invariants.

pub mod edition;
pub mod error;
pub mod ledger;
pub mod seed;
