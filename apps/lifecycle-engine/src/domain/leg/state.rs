//! Strategy State
//!
//! The ledger of live legs owned by one strategy controller. Keyed by
//! [`RoleTag`] so a role can hold at most one leg.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::entity::Leg;
use super::value_objects::RoleTag;

/// Derived ledger status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LedgerStatus {
    /// No legs.
    Empty,
    /// Some required legs are missing.
    Partial,
    /// Every required leg is present.
    Active,
}

/// Persistent per-strategy ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyState {
    /// Live legs by role.
    #[serde(default)]
    pub legs: BTreeMap<RoleTag, Leg>,
    /// Adjustments performed on the current structure.
    #[serde(default)]
    pub adjustment_count: u32,
    /// Date of the last calendar-leg rollover.
    #[serde(default)]
    pub last_rollover_date: Option<NaiveDate>,
    /// Iron-fly repair has been applied.
    #[serde(default)]
    pub is_adjusted: bool,
    /// Time of the last failed entry attempt.
    #[serde(default)]
    pub last_failed_entry: Option<NaiveDateTime>,
    /// P&L booked by closes since the structure was opened.
    #[serde(default)]
    pub realized_pnl: Decimal,
}

impl StrategyState {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the ledger holds no legs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Leg for a role.
    #[must_use]
    pub fn leg(&self, role: RoleTag) -> Option<&Leg> {
        self.legs.get(&role)
    }

    /// Mutable leg for a role.
    pub fn leg_mut(&mut self, role: RoleTag) -> Option<&mut Leg> {
        self.legs.get_mut(&role)
    }

    /// Check if a role is filled.
    #[must_use]
    pub fn has(&self, role: RoleTag) -> bool {
        self.legs.contains_key(&role)
    }

    /// Insert or replace the leg for its role.
    pub fn put(&mut self, leg: Leg) -> Option<Leg> {
        self.legs.insert(leg.role(), leg)
    }

    /// Remove the leg for a role.
    ///
    /// Structure counters survive even when the ledger empties, so a roll
    /// that closes the last leg before opening its replacement keeps them.
    pub fn remove(&mut self, role: RoleTag) -> Option<Leg> {
        self.legs.remove(&role)
    }

    /// Clear the structure counters once no leg is left.
    ///
    /// Returns whether the structure was closed.
    pub fn close_structure(&mut self) -> bool {
        if !self.legs.is_empty() {
            return false;
        }
        self.clear_structure_counters();
        true
    }

    /// Find a leg by instrument key.
    #[must_use]
    pub fn find_by_key(&self, instrument_key: &str) -> Option<&Leg> {
        self.legs
            .values()
            .find(|leg| leg.instrument_key() == instrument_key)
    }

    /// Status relative to the roles a complete structure needs.
    #[must_use]
    pub fn status(&self, required: &[RoleTag]) -> LedgerStatus {
        if self.legs.is_empty() {
            LedgerStatus::Empty
        } else if required.iter().all(|role| self.legs.contains_key(role)) {
            LedgerStatus::Active
        } else {
            LedgerStatus::Partial
        }
    }

    /// Add booked P&L from a close.
    pub fn book(&mut self, pnl: Decimal) {
        self.realized_pnl += pnl;
    }

    /// Drop every leg whose expiry is strictly before `today`.
    ///
    /// Returns the removed legs. Expired legs are settled by the exchange,
    /// so nothing is traded or journaled here.
    pub fn purge_expired(&mut self, today: NaiveDate) -> Vec<Leg> {
        let expired: Vec<RoleTag> = self
            .legs
            .iter()
            .filter(|(_, leg)| leg.expiry_date().is_some_and(|d| d < today))
            .map(|(role, _)| *role)
            .collect();
        let removed: Vec<Leg> = expired
            .iter()
            .filter_map(|role| self.legs.remove(role))
            .collect();
        if !removed.is_empty() {
            self.close_structure();
        }
        removed
    }

    /// Clear everything except the entry cooldown.
    pub fn reset(&mut self) {
        self.legs.clear();
        self.clear_structure_counters();
    }

    fn clear_structure_counters(&mut self) {
        self.adjustment_count = 0;
        self.is_adjusted = false;
        self.realized_pnl = Decimal::ZERO;
    }

    /// Whether an entry attempt is still cooling down at `now`.
    #[must_use]
    pub fn in_entry_cooldown(&self, now: NaiveDateTime, cooldown_secs: i64) -> bool {
        self.last_failed_entry
            .is_some_and(|failed| (now - failed).num_seconds() < cooldown_secs)
    }
}
