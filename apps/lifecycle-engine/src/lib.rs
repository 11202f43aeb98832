// Allow unwrap/expect in tests - tests should panic on unexpected errors
// Allow test-specific patterns and pedantic lints in test code
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call,
        clippy::panic
    )
)]

//! Lifecycle Engine - Rust Core Library
//!
//! Unattended lifecycle management for multi-leg index-option structures
//! (calendar spreads, iron-flies and the six-leg "batman").
//!
//! # Architecture (Clean Architecture + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Legs and ledger, market snapshot, strike selection, timing
//!   gates, risk policy, reconciliation, Black-Scholes fallback delta
//!
//! - **Application**: Ports and orchestration
//!   - `ports`: Broker, execution, feed, journal, persistence and sync traits
//!   - `controller`: The per-strategy lifecycle state machine and its variants
//!   - `context`: Expiry bucketing and gating flags per tick
//!   - `runner`: The poll loop
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: Upstox REST client, order-fill workflow, paper fills
//!   - `feed`: Replay and HTTP market feeds
//!   - `journal`: CSV trade journal
//!   - `persistence`: JSON state files and git replication
//!   - `holidays`: Holiday calendar fetch

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - pure lifecycle rules with no I/O.
pub mod domain;

/// Application layer - ports, controllers and the runner.
pub mod application;

/// Infrastructure layer - adapters implementing the ports.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// Configuration loading and validation.
pub mod config;

/// Tracing and metrics setup.
pub mod observability;
