//! Calendar reconciliation: one near short put, one far long put.

use std::cmp::Ordering;

use crate::domain::leg::{OptionType, RoleTag, StrategyState};
use crate::domain::market::BrokerPositionRow;

use super::{assign, clear, filter_underlying, of_type, ReconciliationReport};

/// Known expiries first, earliest first; then by symbol and key.
fn nearest_first(a: &BrokerPositionRow, b: &BrokerPositionRow) -> Ordering {
    match (a.expiry, b.expiry) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.symbol.cmp(&b.symbol))
    .then_with(|| a.instrument_key.cmp(&b.instrument_key))
}

/// Reconcile the calendar ledger.
///
/// The earliest-expiry short put becomes the weekly leg. The long put
/// already tracked as the hedge is kept while the broker still holds it;
/// otherwise the latest-expiry long put is taken. A role with no broker
/// candidate is cleared.
pub fn reconcile_calendar(
    state: &mut StrategyState,
    rows: &[BrokerPositionRow],
    underlying: &str,
) -> ReconciliationReport {
    let mut report = ReconciliationReport::default();
    let puts = of_type(&filter_underlying(rows, underlying), OptionType::Put);

    let weekly = puts
        .iter()
        .copied()
        .filter(|row| row.quantity < 0)
        .min_by(|a, b| nearest_first(a, b));
    match weekly {
        Some(row) => assign(state, RoleTag::WeeklySell, row, &mut report),
        None => clear(state, RoleTag::WeeklySell, &mut report),
    }

    let tracked_hedge = state
        .leg(RoleTag::MonthlyBuy)
        .map(|leg| leg.instrument_key().to_string());
    let longs: Vec<&BrokerPositionRow> = puts.iter().copied().filter(|row| row.quantity > 0).collect();
    let monthly = longs
        .iter()
        .copied()
        .find(|row| {
            tracked_hedge
                .as_deref()
                .is_some_and(|key| key.eq_ignore_ascii_case(&row.instrument_key))
        })
        .or_else(|| longs.iter().copied().max_by(|a, b| nearest_first(a, b)));
    match monthly {
        Some(row) => assign(state, RoleTag::MonthlyBuy, row, &mut report),
        None => clear(state, RoleTag::MonthlyBuy, &mut report),
    }

    for role in [RoleTag::WeeklySell, RoleTag::MonthlyBuy] {
        if let Some(leg) = state.leg(role)
            && leg.side() != role.natural_side()
        {
            tracing::error!(role = %role, instrument_key = leg.instrument_key(), "Calendar leg held on the wrong side");
        }
    }
    report
}
