//! Infrastructure Layer
//!
//! Adapters behind the application ports: broker access, market feeds,
//! state files with optional git replication, the CSV trade journal and
//! the holiday calendar fetch.

pub mod broker;
pub mod feed;
pub mod holidays;
pub mod journal;
pub mod persistence;
