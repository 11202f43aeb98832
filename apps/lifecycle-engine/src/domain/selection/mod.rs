//! Strike Selector
//!
//! Pure functions choosing a contract from one expiry's chain, either by
//! target delta or by distance from a reference strike.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;

use super::leg::OptionType;
use super::market::{ExpiryChain, OptionChainEntry};

/// Strike spacing used for ATM rounding and round-strike filtering.
pub const ROUND_STRIKE_STEP: Decimal = dec!(100);

/// Strike spacing of the listed chain.
pub const CHAIN_STRIKE_STEP: Decimal = dec!(50);

/// Distance from the ATM target beyond which a forced-ATM pick is logged.
const ATM_WARN_DISTANCE: Decimal = dec!(200);

/// Errors raised by strike selection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// No contract of the requested type in the chain.
    #[error("No {option_type} contracts in chain expiring {expiry}")]
    EmptyChain {
        /// Requested type.
        option_type: OptionType,
        /// Chain expiry.
        expiry: chrono::NaiveDate,
    },

    /// Round strikes were required but none are listed.
    #[error("No round-{step} strikes available")]
    NoRoundStrikes {
        /// Required step.
        step: Decimal,
    },

    /// No contract carries a usable delta.
    #[error("No contract with a usable delta")]
    NoDeltaCandidates,

    /// A fixed strike is not listed.
    #[error("Strike {strike} {option_type} not listed")]
    StrikeNotFound {
        /// Requested strike.
        strike: Decimal,
        /// Requested type.
        option_type: OptionType,
    },
}

/// Delta-selection request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaTarget {
    /// Absolute delta to approach.
    pub delta: f64,
    /// Restrict to strikes divisible by [`ROUND_STRIKE_STEP`].
    pub force_round: bool,
    /// Ignore delta; pick the strike nearest the rounded spot.
    pub force_atm: bool,
}

impl DeltaTarget {
    /// Plain delta target.
    #[must_use]
    pub const fn delta(delta: f64) -> Self {
        Self {
            delta,
            force_round: false,
            force_atm: false,
        }
    }

    /// Delta target restricted to round strikes.
    #[must_use]
    pub const fn round(delta: f64) -> Self {
        Self {
            delta,
            force_round: true,
            force_atm: false,
        }
    }

    /// Pure ATM by distance on round strikes.
    #[must_use]
    pub const fn atm() -> Self {
        Self {
            delta: 0.5,
            force_round: true,
            force_atm: true,
        }
    }
}

/// Round `value` to the nearest multiple of `step`.
#[must_use]
pub fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).round() * step
}

fn by_strike_then_key(a: &OptionChainEntry, b: &OptionChainEntry) -> Ordering {
    a.strike
        .cmp(&b.strike)
        .then_with(|| a.instrument_key.cmp(&b.instrument_key))
}

fn nearest_strike<'a>(
    candidates: &[&'a OptionChainEntry],
    target: Decimal,
) -> Option<&'a OptionChainEntry> {
    candidates.iter().copied().min_by(|a, b| {
        (a.strike - target)
            .abs()
            .cmp(&(b.strike - target).abs())
            .then_with(|| by_strike_then_key(a, b))
    })
}

/// Select the contract closest to a target delta.
///
/// # Errors
///
/// Returns an error if the chain has no contract of the type, no round
/// strikes when they are required, or no contract with a delta.
pub fn select_by_delta<'a>(
    chain: &'a ExpiryChain,
    option_type: OptionType,
    spot: Decimal,
    target: DeltaTarget,
) -> Result<&'a OptionChainEntry, SelectionError> {
    let mut candidates = chain.of_type(option_type);
    if candidates.is_empty() {
        return Err(SelectionError::EmptyChain {
            option_type,
            expiry: chain.expiry,
        });
    }

    if target.force_round || target.force_atm {
        candidates.retain(|e| (e.strike % ROUND_STRIKE_STEP).is_zero());
        if candidates.is_empty() {
            tracing::warn!(expiry = %chain.expiry, "No round strikes listed; forced selection aborted");
            return Err(SelectionError::NoRoundStrikes {
                step: ROUND_STRIKE_STEP,
            });
        }
    }

    if target.force_atm {
        let atm = round_to_step(spot, ROUND_STRIKE_STEP);
        let best = nearest_strike(&candidates, atm).ok_or(SelectionError::NoDeltaCandidates)?;
        if (best.strike - atm).abs() > ATM_WARN_DISTANCE {
            tracing::warn!(
                strike = %best.strike,
                target = %atm,
                "Closest ATM strike is far from target"
            );
        }
        return Ok(best);
    }

    let with_delta: Vec<&OptionChainEntry> = candidates
        .into_iter()
        .filter(|e| e.abs_delta().is_some())
        .collect();
    let priced: Vec<&OptionChainEntry> = with_delta.iter().copied().filter(|e| e.iv > 0.0).collect();
    let pool = if priced.is_empty() { &with_delta } else { &priced };

    pool.iter()
        .copied()
        .min_by(|a, b| {
            let da = (a.abs_delta().unwrap_or(f64::MAX) - target.delta).abs();
            let db = (b.abs_delta().unwrap_or(f64::MAX) - target.delta).abs();
            da.total_cmp(&db).then_with(|| by_strike_then_key(a, b))
        })
        .ok_or(SelectionError::NoDeltaCandidates)
}

/// Select the listed strike nearest `target_strike`.
///
/// # Errors
///
/// Returns an error if the chain has no contract of the type.
pub fn select_by_distance(
    chain: &ExpiryChain,
    option_type: OptionType,
    target_strike: Decimal,
) -> Result<&OptionChainEntry, SelectionError> {
    let candidates = chain.of_type(option_type);
    nearest_strike(&candidates, target_strike).ok_or(SelectionError::EmptyChain {
        option_type,
        expiry: chain.expiry,
    })
}

/// Select an exact strike.
///
/// # Errors
///
/// Returns [`SelectionError::StrikeNotFound`] when the strike is not listed.
pub fn select_by_strike(
    chain: &ExpiryChain,
    option_type: OptionType,
    strike: Decimal,
) -> Result<&OptionChainEntry, SelectionError> {
    chain
        .find_strike(strike, option_type)
        .ok_or(SelectionError::StrikeNotFound {
            strike,
            option_type,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn expiry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 5).unwrap()
    }

    fn put(strike: Decimal, delta: Option<f64>, iv: f64) -> OptionChainEntry {
        OptionChainEntry {
            instrument_key: format!("NSE_FO|{strike}PE"),
            strike,
            option_type: OptionType::Put,
            delta,
            iv,
            time_to_expiry: Some(0.02),
            last_price: dec!(100),
            expiry_date: expiry(),
        }
    }

    fn ladder() -> ExpiryChain {
        ExpiryChain::new(
            expiry(),
            vec![
                put(dec!(23800), Some(-0.30), 0.12),
                put(dec!(23850), Some(-0.38), 0.12),
                put(dec!(23900), Some(-0.44), 0.12),
                put(dec!(23950), Some(-0.47), 0.12),
                put(dec!(24000), Some(-0.52), 0.12),
                put(dec!(24050), Some(-0.58), 0.12),
                put(dec!(24100), Some(-0.63), 0.12),
            ],
        )
    }

    #[test]
    fn test_select_nearest_delta() {
        let chain = ladder();
        let pick = select_by_delta(&chain, OptionType::Put, dec!(24010), DeltaTarget::delta(0.5)).unwrap();
        assert_eq!(pick.strike, dec!(24000));
        let pick = select_by_delta(&chain, OptionType::Put, dec!(24010), DeltaTarget::delta(0.45)).unwrap();
        assert_eq!(pick.strike, dec!(23900));
    }

    #[test]
    fn test_force_round_filters_odd_strikes() {
        let chain = ladder();
        let pick = select_by_delta(&chain, OptionType::Put, dec!(24010), DeltaTarget::round(0.47)).unwrap();
        assert_eq!(pick.strike % ROUND_STRIKE_STEP, Decimal::ZERO);
        assert_eq!(pick.strike, dec!(23900));
    }

    #[test]
    fn test_force_atm_ignores_delta() {
        let chain = ladder();
        let pick = select_by_delta(&chain, OptionType::Put, dec!(23940), DeltaTarget::atm()).unwrap();
        assert_eq!(pick.strike, dec!(23900));
    }

    #[test]
    fn test_force_round_without_round_strikes_fails() {
        let chain = ExpiryChain::new(expiry(), vec![put(dec!(23950), Some(-0.5), 0.1)]);
        let err = select_by_delta(&chain, OptionType::Put, dec!(24000), DeltaTarget::atm()).unwrap_err();
        assert!(matches!(err, SelectionError::NoRoundStrikes { .. }));
    }

    #[test]
    fn test_prefers_positive_iv() {
        let chain = ExpiryChain::new(
            expiry(),
            vec![put(dec!(24000), Some(-0.50), 0.0), put(dec!(23900), Some(-0.44), 0.1)],
        );
        let pick = select_by_delta(&chain, OptionType::Put, dec!(24000), DeltaTarget::delta(0.5)).unwrap();
        assert_eq!(pick.strike, dec!(23900));
    }

    #[test]
    fn test_falls_back_to_zero_iv_when_nothing_priced() {
        let chain = ExpiryChain::new(expiry(), vec![put(dec!(24000), Some(-0.50), 0.0)]);
        let pick = select_by_delta(&chain, OptionType::Put, dec!(24000), DeltaTarget::delta(0.5)).unwrap();
        assert_eq!(pick.strike, dec!(24000));
    }

    #[test]
    fn test_wrong_type_is_empty() {
        let chain = ladder();
        let err = select_by_delta(&chain, OptionType::Call, dec!(24000), DeltaTarget::delta(0.5)).unwrap_err();
        assert!(matches!(err, SelectionError::EmptyChain { .. }));
    }

    #[test]
    fn test_distance_and_exact_strike() {
        let chain = ladder();
        let target = round_to_step(dec!(24010) - dec!(200), CHAIN_STRIKE_STEP);
        assert_eq!(target, dec!(23800));
        assert_eq!(select_by_distance(&chain, OptionType::Put, dec!(23830)).unwrap().strike, dec!(23850));
        assert!(select_by_strike(&chain, OptionType::Put, dec!(23700)).is_err());
    }

    proptest! {
        #[test]
        fn prop_selection_is_idempotent(
            deltas in proptest::collection::vec(0.01f64..0.99, 1..20),
            target in 0.05f64..0.95,
            spot in 23000i64..25000,
        ) {
            let entries = deltas
                .iter()
                .enumerate()
                .map(|(i, d)| put(Decimal::from(23000 + 50 * i64::try_from(i).unwrap_or(0)), Some(-d), 0.1))
                .collect();
            let chain = ExpiryChain::new(expiry(), entries);
            let first = select_by_delta(&chain, OptionType::Put, Decimal::from(spot), DeltaTarget::delta(target))
                .map(|e| e.instrument_key.clone());
            let second = select_by_delta(&chain, OptionType::Put, Decimal::from(spot), DeltaTarget::delta(target))
                .map(|e| e.instrument_key.clone());
            prop_assert_eq!(first, second);
        }
    }
}
