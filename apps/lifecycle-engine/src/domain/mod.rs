//! Domain Layer
//!
//! Pure types and policies with no I/O. Everything here is deterministic
//! given its inputs, which keeps the lifecycle rules testable without a
//! broker or a clock.
//!
//! # Modules
//!
//! - [`leg`]: Legs, role tags and the per-strategy ledger
//! - [`market`]: Per-cycle market snapshot and broker row normalisation
//! - [`selection`]: Strike selection by delta, distance or exact strike
//! - [`timing`]: Holiday calendar and time-of-day gates
//! - [`risk`]: Delta triggers, loss limit, gap and integrity checks
//! - [`reconciliation`]: Merging broker truth into the ledger
//! - [`pricing`]: Black-Scholes fallback Greeks

pub mod leg;
pub mod market;
pub mod pricing;
pub mod reconciliation;
pub mod risk;
pub mod selection;
pub mod timing;
