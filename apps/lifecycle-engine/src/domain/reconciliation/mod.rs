//! Reconciliation Engine
//!
//! Merges the broker's position list into a strategy ledger. The broker is
//! the source of truth for which instruments are held and in what size;
//! the ledger keeps what the broker does not report (role, entry spot,
//! expiry when the feed omits it).
//!
//! Every routine here is a fixed point: running it again against the same
//! snapshot produces no further change.

mod butterfly;
mod calendar;
mod keyed;

pub use butterfly::reconcile_butterfly;
pub use calendar::reconcile_calendar;
pub use keyed::reconcile_keyed;

use std::fmt;

use rust_decimal::Decimal;

use super::leg::{Leg, NewLeg, OptionType, RoleTag, Side, StrategyState};
use super::market::BrokerPositionRow;

/// One correction applied to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    /// Tracked leg missing from the broker; removed locally.
    Cleared {
        /// Role that was cleared.
        role: RoleTag,
        /// Instrument that disappeared.
        instrument_key: String,
    },
    /// Broker holds a different size.
    QuantityUpdated {
        /// Affected role.
        role: RoleTag,
        /// Ledger quantity before.
        from: u32,
        /// Broker quantity.
        to: u32,
    },
    /// Broker sign disagrees with the ledger side.
    SideOverwritten {
        /// Affected role.
        role: RoleTag,
        /// Ledger side before.
        from: Side,
        /// Broker side.
        to: Side,
    },
    /// Untracked broker position taken into an empty role.
    Adopted {
        /// Filled role.
        role: RoleTag,
        /// Adopted instrument.
        instrument_key: String,
    },
    /// Missing expiry taken from the broker row.
    ExpiryRestored {
        /// Affected role.
        role: RoleTag,
        /// Restored expiry.
        expiry: chrono::NaiveDate,
    },
    /// Role now points at a different broker instrument.
    Replaced {
        /// Affected role.
        role: RoleTag,
        /// Previously tracked instrument.
        old_key: String,
        /// Broker instrument now tracked.
        new_key: String,
    },
}

impl LedgerChange {
    /// Whether the change indicates a deeper desync.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        matches!(self, Self::SideOverwritten { .. })
    }
}

impl fmt::Display for LedgerChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cleared {
                role,
                instrument_key,
            } => write!(f, "{role} ({instrument_key}) not held at broker; cleared"),
            Self::QuantityUpdated { role, from, to } => {
                write!(f, "{role} quantity {from} -> {to}")
            }
            Self::SideOverwritten { role, from, to } => {
                write!(f, "{role} side mismatch: ledger {from}, broker {to}")
            }
            Self::Adopted {
                role,
                instrument_key,
            } => write!(f, "{role} adopted broker position {instrument_key}"),
            Self::ExpiryRestored { role, expiry } => write!(f, "{role} expiry set to {expiry}"),
            Self::Replaced {
                role,
                old_key,
                new_key,
            } => write!(f, "{role} re-pointed {old_key} -> {new_key}"),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationReport {
    /// Applied corrections, in order.
    pub changes: Vec<LedgerChange>,
}

impl ReconciliationReport {
    /// Whether the ledger changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Record a change.
    pub fn push(&mut self, change: LedgerChange) {
        self.changes.push(change);
    }

    /// Instrument keys that were cleared.
    pub fn cleared_keys(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().filter_map(|change| match change {
            LedgerChange::Cleared { instrument_key, .. } => Some(instrument_key.as_str()),
            _ => None,
        })
    }

    /// Log every change for `strategy`.
    pub fn emit(&self, strategy: &str) {
        for change in &self.changes {
            if change.is_critical() {
                tracing::error!(strategy, change = %change, "Reconciliation: ledger desync");
            } else {
                tracing::warn!(strategy, change = %change, "Reconciliation");
            }
        }
    }
}

/// Open rows belonging to `underlying`.
#[must_use]
pub fn filter_underlying<'a>(
    rows: &'a [BrokerPositionRow],
    underlying: &str,
) -> Vec<&'a BrokerPositionRow> {
    rows.iter()
        .filter(|row| row.quantity != 0 && row.matches_underlying(underlying))
        .collect()
}

fn same_key(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Build a ledger leg from a broker row, keeping what the ledger already
/// knew about the same instrument.
fn leg_from_row(row: &BrokerPositionRow, role: RoleTag, previous: Option<&Leg>) -> Option<Leg> {
    let side = row.side()?;
    let known = previous.filter(|leg| same_key(leg.instrument_key(), &row.instrument_key));
    let strike = if row.strike > Decimal::ZERO {
        row.strike
    } else {
        known.map_or(Decimal::ZERO, Leg::strike)
    };
    let params = NewLeg {
        instrument_key: row.instrument_key.clone(),
        strike,
        option_type: row.option_type.unwrap_or_else(|| role.option_type()),
        side,
        quantity: row.abs_quantity(),
        entry_price: if row.price > Decimal::ZERO {
            row.price
        } else {
            known.map_or(Decimal::ZERO, Leg::entry_price)
        },
        delta: known.map_or(0.0, Leg::current_delta),
        expiry_date: row.expiry.or_else(|| known.and_then(Leg::expiry_date)),
        role,
        entry_spot: known.and_then(Leg::entry_spot),
    };
    match Leg::from_broker(params) {
        Ok(leg) => Some(leg),
        Err(e) => {
            tracing::warn!(
                instrument_key = %row.instrument_key,
                role = %role,
                error = %e,
                "Broker row cannot be tracked"
            );
            None
        }
    }
}

/// Bring a tracked leg in line with the broker row for the same instrument.
fn sync_in_place(
    state: &mut StrategyState,
    role: RoleTag,
    row: &BrokerPositionRow,
    report: &mut ReconciliationReport,
) {
    let (Some(leg), Some(broker_side)) = (state.leg_mut(role), row.side()) else {
        return;
    };
    let broker_qty = row.abs_quantity();
    if broker_qty != leg.quantity() {
        report.push(LedgerChange::QuantityUpdated {
            role,
            from: leg.quantity(),
            to: broker_qty,
        });
        leg.set_quantity(broker_qty);
    }
    if broker_side != leg.side() {
        report.push(LedgerChange::SideOverwritten {
            role,
            from: leg.side(),
            to: broker_side,
        });
        leg.set_side(broker_side);
    }
    if leg.expiry_date().is_none()
        && let Some(expiry) = row.expiry
    {
        leg.set_expiry(expiry);
        report.push(LedgerChange::ExpiryRestored { role, expiry });
    }
}

/// Put a broker row into `role`, adopting or re-pointing as needed.
fn assign(
    state: &mut StrategyState,
    role: RoleTag,
    row: &BrokerPositionRow,
    report: &mut ReconciliationReport,
) {
    let previous = state.leg(role).cloned();
    if let Some(prev) = &previous
        && same_key(prev.instrument_key(), &row.instrument_key)
    {
        sync_in_place(state, role, row, report);
        return;
    }
    let Some(leg) = leg_from_row(row, role, previous.as_ref()) else {
        clear(state, role, report);
        return;
    };
    state.put(leg);
    report.push(match previous {
        Some(prev) => LedgerChange::Replaced {
            role,
            old_key: prev.instrument_key().to_string(),
            new_key: row.instrument_key.clone(),
        },
        None => LedgerChange::Adopted {
            role,
            instrument_key: row.instrument_key.clone(),
        },
    });
}

/// Clear a role because the broker no longer holds anything for it.
fn clear(state: &mut StrategyState, role: RoleTag, report: &mut ReconciliationReport) {
    if let Some(leg) = state.remove(role) {
        report.push(LedgerChange::Cleared {
            role,
            instrument_key: leg.instrument_key().to_string(),
        });
    }
}

/// Rows of one option type, treating rows with an unknown type as `default`.
fn of_type<'a>(
    rows: &[&'a BrokerPositionRow],
    option_type: OptionType,
) -> Vec<&'a BrokerPositionRow> {
    rows.iter()
        .copied()
        .filter(|row| row.option_type.unwrap_or(OptionType::Put) == option_type)
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDate;

    pub fn row(key: &str, qty: i64, strike: Decimal, expiry: Option<NaiveDate>) -> BrokerPositionRow {
        BrokerPositionRow {
            instrument_key: key.to_string(),
            symbol: format!("NIFTY{strike}PE"),
            quantity: qty,
            price: Decimal::from(100),
            buy_value: Decimal::ZERO,
            sell_value: Decimal::ZERO,
            last_price: Decimal::from(100),
            strike,
            option_type: Some(OptionType::Put),
            expiry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::row;
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_filter_underlying_drops_flat_and_foreign_rows() {
        let mut banknifty = row("NSE_FO|9", -65, dec!(51000), None);
        banknifty.symbol = "BANKEX51000PE".to_string();
        let rows = vec![
            row("NSE_FO|1", -65, dec!(24000), None),
            row("NSE_FO|2", 0, dec!(24000), None),
            banknifty,
        ];
        let filtered = filter_underlying(&rows, "NIFTY");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].instrument_key, "NSE_FO|1");
    }

    #[test]
    fn test_report_cleared_keys() {
        let mut report = ReconciliationReport::default();
        assert!(!report.changed());
        report.push(LedgerChange::Cleared {
            role: RoleTag::WeeklySell,
            instrument_key: "K".to_string(),
        });
        assert!(report.changed());
        assert_eq!(report.cleared_keys().collect::<Vec<_>>(), vec!["K"]);
    }
}
