//! Leg Entity
//!
//! One tracked option position belonging to a strategy.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::LegError;
use super::value_objects::{OptionType, RoleTag, Side};

/// Construction parameters for a leg opened by the engine.
#[derive(Debug, Clone)]
pub struct NewLeg {
    /// Broker instrument identifier.
    pub instrument_key: String,
    /// Strike price.
    pub strike: Decimal,
    /// Call or put.
    pub option_type: OptionType,
    /// Side the position was opened with.
    pub side: Side,
    /// Absolute quantity in units.
    pub quantity: u32,
    /// Fill price.
    pub entry_price: Decimal,
    /// Delta at entry.
    pub delta: f64,
    /// Contract expiry.
    pub expiry_date: Option<NaiveDate>,
    /// Structural role.
    pub role: RoleTag,
    /// Underlying spot at entry.
    pub entry_spot: Option<Decimal>,
}

/// A tracked option position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    instrument_key: String,
    strike: Decimal,
    option_type: OptionType,
    side: Side,
    quantity: u32,
    entry_price: Decimal,
    current_delta: f64,
    #[serde(default)]
    expiry_date: Option<NaiveDate>,
    role: RoleTag,
    #[serde(default)]
    entry_spot: Option<Decimal>,
}

impl Leg {
    /// Create a leg opened by the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty, the strike or price is not
    /// positive/non-negative, or the quantity is not a lot multiple.
    pub fn new(params: NewLeg, lot_size: u32) -> Result<Self, LegError> {
        if lot_size == 0 || params.quantity == 0 || params.quantity % lot_size != 0 {
            return Err(LegError::InvalidQuantity {
                quantity: params.quantity,
                lot_size,
            });
        }
        Self::validated(params)
    }

    /// Create a leg adopted from a broker position row.
    ///
    /// Broker quantities are taken as-is; only positivity is checked.
    ///
    /// # Errors
    ///
    /// Returns an error if the row is structurally invalid.
    pub fn from_broker(params: NewLeg) -> Result<Self, LegError> {
        if params.quantity == 0 {
            return Err(LegError::InvalidQuantity {
                quantity: 0,
                lot_size: 0,
            });
        }
        Self::validated(params)
    }

    fn validated(params: NewLeg) -> Result<Self, LegError> {
        if params.instrument_key.trim().is_empty() {
            return Err(LegError::InvalidField {
                field: "instrument_key",
                message: "must not be empty".to_string(),
            });
        }
        if params.strike <= Decimal::ZERO {
            return Err(LegError::InvalidField {
                field: "strike",
                message: format!("must be positive, got {}", params.strike),
            });
        }
        if params.entry_price < Decimal::ZERO {
            return Err(LegError::InvalidField {
                field: "entry_price",
                message: format!("must not be negative, got {}", params.entry_price),
            });
        }
        Ok(Self {
            instrument_key: params.instrument_key,
            strike: params.strike,
            option_type: params.option_type,
            side: params.side,
            quantity: params.quantity,
            entry_price: params.entry_price,
            current_delta: params.delta.abs(),
            expiry_date: params.expiry_date,
            role: params.role,
            entry_spot: params.entry_spot,
        })
    }

    /// Broker instrument identifier.
    #[must_use]
    pub fn instrument_key(&self) -> &str {
        &self.instrument_key
    }

    /// Strike price.
    #[must_use]
    pub const fn strike(&self) -> Decimal {
        self.strike
    }

    /// Call or put.
    #[must_use]
    pub const fn option_type(&self) -> OptionType {
        self.option_type
    }

    /// Position side.
    #[must_use]
    pub const fn side(&self) -> Side {
        self.side
    }

    /// Absolute quantity in units.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Quantity in lots (floor).
    #[must_use]
    pub const fn lots(&self, lot_size: u32) -> u32 {
        if lot_size == 0 { 0 } else { self.quantity / lot_size }
    }

    /// Entry price.
    #[must_use]
    pub const fn entry_price(&self) -> Decimal {
        self.entry_price
    }

    /// Latest known absolute delta.
    #[must_use]
    pub const fn current_delta(&self) -> f64 {
        self.current_delta
    }

    /// Contract expiry, if known.
    #[must_use]
    pub const fn expiry_date(&self) -> Option<NaiveDate> {
        self.expiry_date
    }

    /// Structural role.
    #[must_use]
    pub const fn role(&self) -> RoleTag {
        self.role
    }

    /// Spot at entry, if recorded.
    #[must_use]
    pub const fn entry_spot(&self) -> Option<Decimal> {
        self.entry_spot
    }

    /// Signed quantity (positive long, negative short).
    #[must_use]
    pub fn signed_quantity(&self) -> i64 {
        match self.side {
            Side::Buy => i64::from(self.quantity),
            Side::Sell => -i64::from(self.quantity),
        }
    }

    /// Whether the leg expires on or before `date`.
    #[must_use]
    pub fn expires_on_or_before(&self, date: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry <= date)
    }

    /// Replace the delta reading. Stored as an absolute value.
    pub fn set_delta(&mut self, delta: f64) {
        if delta.is_finite() {
            self.current_delta = delta.abs();
        }
    }

    /// Overwrite the quantity with the broker's figure.
    pub fn set_quantity(&mut self, quantity: u32) {
        self.quantity = quantity;
    }

    /// Overwrite the side with the broker's figure.
    pub fn set_side(&mut self, side: Side) {
        self.side = side;
    }

    /// Fill in a missing expiry.
    pub fn set_expiry(&mut self, expiry: NaiveDate) {
        self.expiry_date = Some(expiry);
    }

    /// Reassign the structural role.
    pub fn set_role(&mut self, role: RoleTag) {
        self.role = role;
    }

    /// Signed P&L at `mark` (long gains when price rises).
    #[must_use]
    pub fn pnl_at(&self, mark: Decimal) -> Decimal {
        let qty = Decimal::from(self.quantity);
        match self.side {
            Side::Buy => (mark - self.entry_price) * qty,
            Side::Sell => (self.entry_price - mark) * qty,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use rust_decimal_macros::dec;

    pub fn put_params(role: RoleTag, strike: Decimal, side: Side, qty: u32) -> NewLeg {
        NewLeg {
            instrument_key: format!("NSE_FO|P{strike}"),
            strike,
            option_type: OptionType::Put,
            side,
            quantity: qty,
            entry_price: dec!(100),
            delta: 0.5,
            expiry_date: NaiveDate::from_ymd_opt(2026, 3, 5),
            role,
            entry_spot: Some(dec!(24000)),
        }
    }
}
