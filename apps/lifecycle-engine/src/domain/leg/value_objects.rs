//! Leg Value Objects

use std::fmt;

use serde::{Deserialize, Serialize};

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionType {
    /// Call option.
    #[serde(rename = "CE", alias = "ce", alias = "c", alias = "CALL", alias = "call")]
    Call,
    /// Put option.
    #[serde(rename = "PE", alias = "pe", alias = "p", alias = "PUT", alias = "put")]
    Put,
}

impl OptionType {
    /// Exchange suffix ("CE" / "PE").
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Call => "CE",
            Self::Put => "PE",
        }
    }

    /// Check if this is a put.
    #[must_use]
    pub const fn is_put(&self) -> bool {
        matches!(self, Self::Put)
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Order / position side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Long (bought).
    Buy,
    /// Short (sold).
    Sell,
}

impl Side {
    /// The side that closes a position opened with this side.
    #[must_use]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// Side implied by a signed broker quantity. Zero has no side.
    #[must_use]
    pub const fn from_signed(quantity: i64) -> Option<Self> {
        if quantity > 0 {
            Some(Self::Buy)
        } else if quantity < 0 {
            Some(Self::Sell)
        } else {
            None
        }
    }

    /// Check if this is a short.
    #[must_use]
    pub const fn is_sell(&self) -> bool {
        matches!(self, Self::Sell)
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural identity of a leg within its strategy.
///
/// A ledger holds at most one live leg per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoleTag {
    /// Calendar: near-week short put.
    #[serde(rename = "weekly_sell")]
    WeeklySell,
    /// Calendar: far-month long put hedge.
    #[serde(rename = "monthly_buy")]
    MonthlyBuy,
    /// Iron-fly: upper long put wing.
    #[serde(rename = "IF_LEG1")]
    IfLeg1,
    /// Iron-fly: short put body (two lots).
    #[serde(rename = "IF_LEG2")]
    IfLeg2,
    /// Iron-fly: lower long put wing.
    #[serde(rename = "IF_LEG3")]
    IfLeg3,
    /// Iron-fly repair: short call in the body's expiry.
    #[serde(rename = "IF_ADJ_CE_SHORT")]
    IfAdjCeShort,
    /// Iron-fly repair: long call in the following expiry.
    #[serde(rename = "IF_ADJ_CE_LONG")]
    IfAdjCeLong,
    /// Batman: long call wing.
    #[serde(rename = "CE_WING")]
    CeWing,
    /// Batman: short call core.
    #[serde(rename = "CE_CORE")]
    CeCore,
    /// Batman: far OTM long call hedge.
    #[serde(rename = "CE_HEDGE")]
    CeHedge,
    /// Batman: long put wing.
    #[serde(rename = "PE_WING")]
    PeWing,
    /// Batman: short put core.
    #[serde(rename = "PE_CORE")]
    PeCore,
    /// Batman: far OTM long put hedge.
    #[serde(rename = "PE_HEDGE")]
    PeHedge,
}

impl RoleTag {
    /// Side the role is opened with.
    #[must_use]
    pub const fn natural_side(&self) -> Side {
        match self {
            Self::WeeklySell | Self::IfLeg2 | Self::IfAdjCeShort | Self::CeCore | Self::PeCore => {
                Side::Sell
            }
            _ => Side::Buy,
        }
    }

    /// Option type the role trades.
    #[must_use]
    pub const fn option_type(&self) -> OptionType {
        match self {
            Self::IfAdjCeShort | Self::IfAdjCeLong | Self::CeWing | Self::CeCore | Self::CeHedge => {
                OptionType::Call
            }
            _ => OptionType::Put,
        }
    }

    /// Stable tag used in journals and order tags.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::WeeklySell => "WEEKLY_SELL",
            Self::MonthlyBuy => "MONTHLY_BUY",
            Self::IfLeg1 => "IF_LEG1",
            Self::IfLeg2 => "IF_LEG2",
            Self::IfLeg3 => "IF_LEG3",
            Self::IfAdjCeShort => "IF_ADJ_CE_SHORT",
            Self::IfAdjCeLong => "IF_ADJ_CE_LONG",
            Self::CeWing => "CE_WING",
            Self::CeCore => "CE_CORE",
            Self::CeHedge => "CE_HEDGE",
            Self::PeWing => "PE_WING",
            Self::PeCore => "PE_CORE",
            Self::PeHedge => "PE_HEDGE",
        }
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
