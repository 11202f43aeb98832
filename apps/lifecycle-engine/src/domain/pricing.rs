//! Black-Scholes Fallback Greeks
//!
//! Used when the broker does not report a delta for a contract: delta from
//! a known or default volatility, and implied volatility backed out of the
//! last traded price.

// Black-Scholes uses standard mathematical notation (s, k, t, r, sigma)
#![allow(clippy::many_single_char_names)]
#![allow(clippy::suboptimal_flops)]

use std::f64::consts::{PI, SQRT_2};

use thiserror::Error;

use super::leg::OptionType;

/// Volatility assumed when nothing better is known.
pub const DEFAULT_VOLATILITY: f64 = 0.15;

/// Time to expiry assumed when the chain does not report one (years).
pub const DEFAULT_TIME_TO_EXPIRY: f64 = 0.01;

const MIN_VOL: f64 = 0.001;
const MAX_VOL: f64 = 10.0;
const MAX_ITERATIONS: u32 = 100;
const PRICE_TOLERANCE: f64 = 1e-5;

/// Errors from implied-volatility solving.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PricingError {
    /// Inputs out of domain.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// Error message.
        message: String,
    },

    /// Price is outside the attainable Black-Scholes range.
    #[error("No valid IV solution: {reason}")]
    NoSolution {
        /// Reason no solution exists.
        reason: String,
    },
}

fn norm_cdf(x: f64) -> f64 {
    0.5 * (1.0 + libm::erf(x / SQRT_2))
}

fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

fn d1(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    ((s / k).ln() + (r + 0.5 * sigma * sigma) * t) / (sigma * t.sqrt())
}

/// Black-Scholes price.
#[must_use]
pub fn bs_price(kind: OptionType, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    let sigma = sigma.clamp(MIN_VOL, MAX_VOL);
    let t = if t <= 0.0 { 0.0001 } else { t };
    let d1_val = d1(s, k, t, r, sigma);
    let d2_val = d1_val - sigma * t.sqrt();
    match kind {
        OptionType::Call => s * norm_cdf(d1_val) - k * (-r * t).exp() * norm_cdf(d2_val),
        OptionType::Put => k * (-r * t).exp() * norm_cdf(-d2_val) - s * norm_cdf(-d1_val),
    }
}

/// Black-Scholes delta. Signed: calls in `[0, 1]`, puts in `[-1, 0]`.
///
/// At or past expiry the intrinsic delta is returned.
#[must_use]
pub fn bs_delta(kind: OptionType, s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    if t <= 0.0 {
        return match kind {
            OptionType::Call if s > k => 1.0,
            OptionType::Put if s < k => -1.0,
            _ => 0.0,
        };
    }
    let sigma = sigma.clamp(MIN_VOL, MAX_VOL);
    let n = norm_cdf(d1(s, k, t, r, sigma));
    match kind {
        OptionType::Call => n,
        OptionType::Put => n - 1.0,
    }
}

fn bs_vega(s: f64, k: f64, t: f64, r: f64, sigma: f64) -> f64 {
    s * norm_pdf(d1(s, k, t, r, sigma)) * t.sqrt()
}

/// Implied volatility from a market price.
///
/// Newton-Raphson from 0.5, falling back to bisection when vega vanishes
/// or the iteration does not settle.
///
/// # Errors
///
/// Returns an error for non-positive inputs or a price below intrinsic.
pub fn implied_volatility(
    kind: OptionType,
    price: f64,
    s: f64,
    k: f64,
    t: f64,
    r: f64,
) -> Result<f64, PricingError> {
    if price <= 0.0 || s <= 0.0 || k <= 0.0 || t <= 0.0 {
        return Err(PricingError::InvalidInput {
            message: format!("price={price} spot={s} strike={k} t={t}"),
        });
    }
    let intrinsic = match kind {
        OptionType::Call => (s - k).max(0.0),
        OptionType::Put => (k - s).max(0.0),
    };
    if price < intrinsic {
        return Err(PricingError::NoSolution {
            reason: format!("price {price:.4} below intrinsic {intrinsic:.4}"),
        });
    }

    let mut sigma = 0.5;
    for _ in 0..MAX_ITERATIONS {
        let diff = price - bs_price(kind, s, k, t, r, sigma);
        if diff.abs() < PRICE_TOLERANCE {
            return Ok(sigma);
        }
        let vega = bs_vega(s, k, t, r, sigma);
        if vega.abs() < 1e-12 {
            break;
        }
        sigma = (sigma + diff / vega).clamp(MIN_VOL, MAX_VOL);
    }
    bisection(kind, price, s, k, t, r)
}

fn bisection(kind: OptionType, price: f64, s: f64, k: f64, t: f64, r: f64) -> Result<f64, PricingError> {
    let (mut low, mut high) = (MIN_VOL, MAX_VOL);
    if price > bs_price(kind, s, k, t, r, high) {
        return Err(PricingError::NoSolution {
            reason: format!("price {price:.4} exceeds maximum theoretical price"),
        });
    }
    if price < bs_price(kind, s, k, t, r, low) {
        return Ok(MIN_VOL);
    }
    let mut mid = low.midpoint(high);
    for _ in 0..MAX_ITERATIONS {
        mid = low.midpoint(high);
        let error = bs_price(kind, s, k, t, r, mid) - price;
        if error.abs() < PRICE_TOLERANCE || (high - low) < 1e-10 {
            break;
        }
        if error > 0.0 {
            high = mid;
        } else {
            low = mid;
        }
    }
    Ok(mid)
}
