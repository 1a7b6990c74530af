// src/market/mod.rs

// Collaborator protocol plus the markets shipped with the crate.
// Each concrete market is feature-gated so downstream models pull in only the SDK.

pub mod sdk;
pub use sdk::*;

#[cfg(feature = "market-linear")]
pub mod linear;
