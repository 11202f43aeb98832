//! Instrument-keyed reconciliation.

use std::collections::HashMap;

use crate::domain::leg::{RoleTag, StrategyState};
use crate::domain::market::BrokerPositionRow;

use super::{clear, sync_in_place, ReconciliationReport};

/// Reconcile every tracked leg against the broker row with the same key.
///
/// Absent or flat rows clear the leg, a different size updates it in
/// place, and a sign disagreement overwrites the side. Untracked rows are
/// ignored.
pub fn reconcile_keyed(state: &mut StrategyState, rows: &[BrokerPositionRow]) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();
    let by_key: HashMap<String, &BrokerPositionRow> = rows
        .iter()
        .rev()
        .map(|row| (row.instrument_key.to_uppercase(), row))
        .collect();

    let roles: Vec<RoleTag> = state.legs.keys().copied().collect();
    for role in roles {
        let Some(key) = state.leg(role).map(|leg| leg.instrument_key().to_uppercase()) else {
            continue;
        };
        match by_key.get(&key).copied().filter(|row| row.quantity != 0) {
            Some(row) => sync_in_place(state, role, row, &mut report),
            None => clear(state, role, &mut report),
        }
    }
    report
}
