//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod gateway;
pub mod http;
pub mod manifest;
pub mod renderer;
pub mod telemetry;
