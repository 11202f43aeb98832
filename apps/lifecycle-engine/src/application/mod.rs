//! Application Layer
//!
//! Orchestration on top of the domain: the driven ports, the per-strategy
//! lifecycle controller, market context derivation and the cycle runner.

pub mod context;
pub mod controller;
pub mod ports;
pub mod runner;
