//! Builders and fakes shared by the controller tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{ControllerDeps, ControllerSettings, StrategyController, StrategyVariant};
use crate::application::ports::{ExecutionError, ExecutionPort, Fill, NoOpStateSync, OrderRequest};
use crate::config::Config;
use crate::domain::leg::{Leg, NewLeg, OptionType, RoleTag, Side, StrategyState};
use crate::domain::market::{
    BrokerSnapshot, ChainSet, ExpiryChain, GreeksQuote, MarketFlags, MarketSnapshot, OptionChainEntry,
};
use crate::domain::risk::RiskPolicy;
use crate::domain::timing::HolidayCalendar;
use crate::infrastructure::journal::InMemoryTradeJournal;
use crate::infrastructure::persistence::InMemoryStatePersistence;

pub const LOT: u32 = 65;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, hour: u32, minute: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(hour, minute, 0).unwrap()
}

/// Chain key: `NSE_FO|<mmdd><P|C><strike>`.
pub fn key(expiry: NaiveDate, option_type: OptionType, strike: Decimal) -> String {
    let code = if option_type.is_put() { "P" } else { "C" };
    format!("NSE_FO|{}{code}{strike}", expiry.format("%m%d"))
}

/// Absolute delta falls linearly by 0.05 per 100 points away from `center`.
fn ladder_delta(option_type: OptionType, strike: Decimal, center: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    let offset = (strike - center).to_f64().unwrap() / 2000.0;
    let delta = if option_type.is_put() { 0.5 + offset } else { 0.5 - offset };
    delta.clamp(0.01, 0.99)
}

fn entries(expiry: NaiveDate, center: Decimal, option_type: OptionType) -> Vec<OptionChainEntry> {
    (-20..=20)
        .map(|step| {
            let strike = center + Decimal::from(step * 50);
            let delta = ladder_delta(option_type, strike, center);
            let signed = if option_type.is_put() { -delta } else { delta };
            OptionChainEntry {
                instrument_key: key(expiry, option_type, strike),
                strike,
                option_type,
                delta: Some(signed),
                iv: 0.12,
                time_to_expiry: Some(0.02),
                last_price: dec!(20) + Decimal::from(step + 20) * dec!(5),
                expiry_date: expiry,
            }
        })
        .collect()
}

/// Puts from `center - 1000` to `center + 1000`.
pub fn put_ladder(expiry: NaiveDate, center: Decimal) -> ExpiryChain {
    ExpiryChain::new(expiry, entries(expiry, center, OptionType::Put))
}

/// Puts and calls from `center - 1000` to `center + 1000`.
pub fn ladder(expiry: NaiveDate, center: Decimal) -> ExpiryChain {
    let mut all = entries(expiry, center, OptionType::Put);
    all.extend(entries(expiry, center, OptionType::Call));
    ExpiryChain::new(expiry, all)
}

pub fn market(now: NaiveDateTime, spot: Decimal, chains: ChainSet) -> MarketSnapshot {
    MarketSnapshot {
        now,
        spot,
        previous_spot: None,
        chains,
        quotes: HashMap::new(),
        greeks: HashMap::new(),
        broker: BrokerSnapshot::Unavailable,
        flags: MarketFlags::default(),
    }
}

/// Quote every ledger leg at its entry price with the given delta.
pub fn quote_state(snapshot: &mut MarketSnapshot, state: &StrategyState) {
    for leg in state.legs.values() {
        snapshot
            .quotes
            .insert(leg.instrument_key().to_string(), leg.entry_price());
        snapshot.greeks.insert(
            leg.instrument_key().to_string(),
            GreeksQuote {
                delta: Some(leg.current_delta()),
                iv: Some(0.12),
            },
        );
    }
}

/// Quote the two calendar legs used by the calendar tests.
pub fn quote_held(snapshot: &mut MarketSnapshot, weekly_delta: f64, monthly_delta: f64) {
    for (key, delta) in [("NSE_FO|W23800", weekly_delta), ("NSE_FO|M24000", monthly_delta)] {
        snapshot.quotes.insert(key.to_string(), dec!(100));
        snapshot.greeks.insert(
            key.to_string(),
            GreeksQuote {
                delta: Some(delta),
                iv: Some(0.12),
            },
        );
    }
}

pub fn leg(role: RoleTag, key: &str, strike: Decimal, side: Side, expiry: NaiveDate) -> Leg {
    leg_with_qty(role, key, strike, side, expiry, LOT)
}

pub fn leg_with_qty(
    role: RoleTag,
    key: &str,
    strike: Decimal,
    side: Side,
    expiry: NaiveDate,
    quantity: u32,
) -> Leg {
    Leg::new(
        NewLeg {
            instrument_key: key.to_string(),
            strike,
            option_type: role.option_type(),
            side,
            quantity,
            entry_price: dec!(100),
            delta: 0.5,
            expiry_date: Some(expiry),
            role,
            entry_spot: Some(dec!(24000)),
        },
        LOT,
    )
    .unwrap()
}

/// Execution double: records every request and fills at the reference price
/// unless told to fail.
#[derive(Debug, Default)]
pub struct FakeExecution {
    requests: Mutex<Vec<OrderRequest>>,
    failing_side: Mutex<Option<Side>>,
    failing_keys: Mutex<Vec<String>>,
}

impl FakeExecution {
    pub fn requests(&self) -> Vec<OrderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.requests.lock().unwrap().clear();
    }

    pub fn fail_side(&self, side: Side) {
        *self.failing_side.lock().unwrap() = Some(side);
    }

    pub fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().push(key.to_string());
    }

    pub fn heal(&self) {
        *self.failing_side.lock().unwrap() = None;
        self.failing_keys.lock().unwrap().clear();
    }
}

#[async_trait]
impl ExecutionPort for FakeExecution {
    async fn execute(&self, request: OrderRequest) -> Result<Fill, ExecutionError> {
        self.requests.lock().unwrap().push(request.clone());
        let side_fails = *self.failing_side.lock().unwrap() == Some(request.side);
        let key_fails = self
            .failing_keys
            .lock()
            .unwrap()
            .contains(&request.instrument_key);
        if side_fails || key_fails {
            return Err(ExecutionError::Rejected {
                reason: "test rejection".to_string(),
            });
        }
        Ok(Fill::confirmed(
            request.reference_price.unwrap_or_default(),
            Some(format!("T{}", self.requests.lock().unwrap().len())),
        ))
    }
}

pub struct Harness {
    pub execution: Arc<FakeExecution>,
    pub journal: Arc<InMemoryTradeJournal>,
    pub persistence: Arc<InMemoryStatePersistence>,
}

impl Harness {
    pub fn build(variant: Box<dyn StrategyVariant>) -> (Self, StrategyController) {
        Self::build_with(variant, &Config::default())
    }

    pub fn build_with(variant: Box<dyn StrategyVariant>, config: &Config) -> (Self, StrategyController) {
        let harness = Self {
            execution: Arc::new(FakeExecution::default()),
            journal: Arc::new(InMemoryTradeJournal::new()),
            persistence: Arc::new(InMemoryStatePersistence::new()),
        };
        let deps = ControllerDeps {
            execution: harness.execution.clone(),
            persistence: harness.persistence.clone(),
            journal: harness.journal.clone(),
            sync: Arc::new(NoOpStateSync),
        };
        let mut settings = ControllerSettings::from(config);
        settings.lot_size = LOT;
        let controller = StrategyController::new(
            variant,
            deps,
            settings,
            RiskPolicy::new((&config.risk).into()),
            Arc::new(HolidayCalendar::default()),
        );
        (harness, controller)
    }
}
