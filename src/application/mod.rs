//! Application services layer: artifact generation and the build sequence.

pub mod artifact;
pub mod build;
pub mod error;
pub mod ports;
