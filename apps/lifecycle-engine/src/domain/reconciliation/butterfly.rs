//! Iron-fly reconciliation: keyed sync, then adoption into empty roles.

use std::collections::HashSet;

use crate::domain::leg::{OptionType, RoleTag, StrategyState};
use crate::domain::market::BrokerPositionRow;

use super::{assign, filter_underlying, of_type, reconcile_keyed, ReconciliationReport};

const BODY_ROLES: [RoleTag; 3] = [RoleTag::IfLeg1, RoleTag::IfLeg2, RoleTag::IfLeg3];

/// Reconcile the iron-fly ledger.
///
/// Tracked legs are first synced by instrument key. Empty body roles are
/// then filled from untracked put rows of the structure's expiry: the
/// largest short becomes the body, the highest long the upper wing and
/// the lowest distinct long the lower wing.
pub fn reconcile_butterfly(
    state: &mut StrategyState,
    rows: &[BrokerPositionRow],
    underlying: &str,
) -> ReconciliationReport {
    let mut report = reconcile_keyed(state, rows);

    let tracked: HashSet<String> = state
        .legs
        .values()
        .map(|leg| leg.instrument_key().to_uppercase())
        .collect();
    let anchor_expiry = BODY_ROLES
        .iter()
        .filter_map(|role| state.leg(*role).and_then(|leg| leg.expiry_date()))
        .min();
    let candidates: Vec<&BrokerPositionRow> = of_type(&filter_underlying(rows, underlying), OptionType::Put)
        .into_iter()
        .filter(|row| !tracked.contains(&row.instrument_key.to_uppercase()))
        .filter(|row| match (anchor_expiry, row.expiry) {
            (Some(anchor), Some(expiry)) => anchor == expiry,
            _ => true,
        })
        .collect();

    if !state.has(RoleTag::IfLeg2)
        && let Some(body) = candidates
            .iter()
            .copied()
            .filter(|row| row.quantity < 0)
            .min_by(|a, b| {
                b.quantity
                    .unsigned_abs()
                    .cmp(&a.quantity.unsigned_abs())
                    .then_with(|| a.instrument_key.cmp(&b.instrument_key))
            })
    {
        assign(state, RoleTag::IfLeg2, body, &mut report);
    }

    let mut longs: Vec<&BrokerPositionRow> = candidates
        .iter()
        .copied()
        .filter(|row| row.quantity > 0)
        .collect();
    longs.sort_by(|a, b| {
        b.strike
            .cmp(&a.strike)
            .then_with(|| a.instrument_key.cmp(&b.instrument_key))
    });

    let mut upper_taken: Option<&str> = None;
    if !state.has(RoleTag::IfLeg1)
        && let Some(upper) = longs.first()
    {
        assign(state, RoleTag::IfLeg1, upper, &mut report);
        upper_taken = Some(upper.instrument_key.as_str());
    }
    if !state.has(RoleTag::IfLeg3)
        && let Some(lower) = longs
            .iter()
            .rev()
            .find(|row| upper_taken != Some(row.instrument_key.as_str()))
    {
        assign(state, RoleTag::IfLeg3, lower, &mut report);
    }

    report
}
