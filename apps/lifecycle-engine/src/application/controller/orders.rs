//! Order placement for the controller: opening and closing legs, rolls and
//! full exits. Every fill is journaled; closes book their P&L.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use super::variant::{ExitReason, LegOrder, LegRoll, RollSequence};
use super::{ControllerError, StrategyController};
use crate::application::ports::{ExecutionError, Fill, OrderRequest, TradeRecord};
use crate::domain::leg::{Leg, NewLeg, RoleTag, Side};
use crate::domain::market::MarketSnapshot;
use crate::observability;

/// Orders filled and failed during one plan.
#[derive(Debug, Default, Clone, Copy)]
pub(super) struct Tally {
    pub filled: usize,
    pub failed: usize,
}

pub(super) fn trade_record(
    timestamp: NaiveDateTime,
    leg: &Leg,
    side: Side,
    price: Decimal,
    tag: &str,
    pnl: Option<Decimal>,
) -> TradeRecord {
    TradeRecord {
        timestamp,
        instrument_key: leg.instrument_key().to_string(),
        side,
        quantity: leg.quantity(),
        price,
        expiry: leg.expiry_date(),
        tag: tag.to_string(),
        pnl,
    }
}

impl StrategyController {
    fn order_tag(&self, tag: &str) -> String {
        format!("{}_{}_{}", self.settings.order_tag_prefix, self.name(), tag)
    }

    async fn submit(&self, request: OrderRequest) -> Result<Fill, ExecutionError> {
        let name = self.name();
        let side = request.side;
        let instrument_key = request.instrument_key.clone();

        match self.deps.execution.execute(request).await {
            Ok(fill) => {
                if fill.ambiguous {
                    tracing::warn!(
                        strategy = name,
                        instrument_key = %instrument_key,
                        order_id = ?fill.order_id,
                        "Order state unconfirmed; treating as filled"
                    );
                    observability::record_order(name, side.as_str(), "ambiguous");
                } else {
                    observability::record_order(name, side.as_str(), "filled");
                }
                Ok(fill)
            }
            Err(e) => {
                observability::record_order(name, side.as_str(), "failed");
                Err(e)
            }
        }
    }

    async fn journal(&self, record: TradeRecord) {
        if let Err(e) = self.deps.journal.record(record, false).await {
            tracing::warn!(strategy = self.name(), error = %e, "Journal write failed; ledger kept");
        }
    }

    /// Open `order` and put the new leg into its role. Returns the leg that
    /// previously held the role, if any.
    pub(super) async fn open_leg(
        &mut self,
        order: &LegOrder,
        tag: &str,
        market: &MarketSnapshot,
    ) -> Result<Option<Leg>, ControllerError> {
        let name = self.name();
        let contract = &order.contract;
        let request = OrderRequest {
            instrument_key: contract.instrument_key.clone(),
            quantity: order.quantity,
            side: order.side(),
            tag: self.order_tag(tag),
            expiry: Some(contract.expiry_date),
            reference_price: market
                .last_price(&contract.instrument_key)
                .or(Some(contract.last_price)),
        };
        let fill = self.submit(request).await?;

        let leg = Leg::new(
            NewLeg {
                instrument_key: contract.instrument_key.clone(),
                strike: contract.strike,
                option_type: contract.option_type,
                side: order.side(),
                quantity: order.quantity,
                entry_price: fill.avg_price,
                delta: contract.abs_delta().unwrap_or_default(),
                expiry_date: Some(contract.expiry_date),
                role: order.role,
                entry_spot: Some(market.spot),
            },
            self.settings.lot_size,
        )
        .inspect_err(|e| {
            tracing::error!(
                strategy = name,
                instrument_key = %contract.instrument_key,
                error = %e,
                "Order filled but the leg could not be tracked"
            );
        })?;

        tracing::info!(
            strategy = name,
            role = %order.role,
            instrument_key = %contract.instrument_key,
            strike = %contract.strike,
            side = %order.side(),
            quantity = order.quantity,
            price = %fill.avg_price,
            "Leg opened"
        );
        self.journal(trade_record(market.now, &leg, order.side(), fill.avg_price, tag, None))
            .await;
        Ok(self.state.put(leg))
    }

    /// Close `leg` at the broker and book its P&L. The ledger is not touched.
    pub(super) async fn close_position(
        &mut self,
        leg: &Leg,
        tag: &str,
        market: &MarketSnapshot,
    ) -> Result<Decimal, ControllerError> {
        let side = leg.side().opposite();
        let request = OrderRequest {
            instrument_key: leg.instrument_key().to_string(),
            quantity: leg.quantity(),
            side,
            tag: self.order_tag(tag),
            expiry: leg.expiry_date(),
            reference_price: market
                .last_price(leg.instrument_key())
                .or(Some(leg.entry_price())),
        };
        let fill = self.submit(request).await?;

        let pnl = leg.pnl_at(fill.avg_price);
        self.state.book(pnl);
        tracing::info!(
            strategy = self.name(),
            role = %leg.role(),
            instrument_key = leg.instrument_key(),
            price = %fill.avg_price,
            pnl = %pnl,
            "Leg closed"
        );
        self.journal(trade_record(market.now, leg, side, fill.avg_price, tag, Some(pnl)))
            .await;
        Ok(pnl)
    }

    /// Close the leg in `role` and drop it from the ledger.
    pub(super) async fn close_role(
        &mut self,
        role: RoleTag,
        tag: &str,
        market: &MarketSnapshot,
    ) -> Result<(), ControllerError> {
        let Some(leg) = self.state.leg(role).cloned() else {
            return Ok(());
        };
        self.close_position(&leg, tag, market).await?;
        self.state.remove(role);
        Ok(())
    }

    /// Execute one roll. Returns `false` when the remaining rolls of the
    /// plan should not run.
    pub(super) async fn execute_roll(
        &mut self,
        roll: &LegRoll,
        tag: &str,
        market: &MarketSnapshot,
        tally: &mut Tally,
    ) -> bool {
        let name = self.name();
        let role = roll.replacement.role;
        let new_key = &roll.replacement.contract.instrument_key;

        if self
            .state
            .leg(role)
            .is_some_and(|leg| leg.instrument_key() == new_key)
        {
            tracing::info!(strategy = name, role = %role, instrument_key = %new_key, "Roll target is the current leg; skipped");
            return true;
        }

        match roll.sequence {
            RollSequence::CloseFirst => {
                if self.state.has(role) {
                    if let Err(e) = self.close_role(role, tag, market).await {
                        tally.failed += 1;
                        tracing::warn!(
                            strategy = name,
                            role = %role,
                            error = %e,
                            "Roll aborted: exit of the old leg failed; old leg kept"
                        );
                        return false;
                    }
                    tally.filled += 1;
                    self.persist().await;
                }
                match self.open_leg(&roll.replacement, tag, market).await {
                    Ok(_) => {
                        tally.filled += 1;
                        true
                    }
                    Err(e) => {
                        tally.failed += 1;
                        tracing::error!(
                            strategy = name,
                            role = %role,
                            instrument_key = %new_key,
                            error = %e,
                            "NAKED: replacement entry failed after the old leg was closed"
                        );
                        false
                    }
                }
            }
            RollSequence::OpenFirst => {
                let previous = match self.open_leg(&roll.replacement, tag, market).await {
                    Ok(previous) => {
                        tally.filled += 1;
                        previous
                    }
                    Err(e) => {
                        tally.failed += 1;
                        tracing::warn!(
                            strategy = name,
                            role = %role,
                            error = %e,
                            "Roll aborted: replacement entry failed; old leg kept"
                        );
                        return false;
                    }
                };
                let Some(old) = previous else {
                    return true;
                };
                match self.close_position(&old, tag, market).await {
                    Ok(_) => {
                        tally.filled += 1;
                        true
                    }
                    Err(e) => {
                        tally.failed += 1;
                        tracing::error!(
                            strategy = name,
                            role = %role,
                            instrument_key = old.instrument_key(),
                            error = %e,
                            "TWO HEDGES: exit of the old leg failed after the replacement filled"
                        );
                        false
                    }
                }
            }
        }
    }

    /// Close every live leg, buying back shorts before selling longs. Legs
    /// whose exit fails stay in the ledger for the next cycle.
    pub(super) async fn exit_all(&mut self, reason: ExitReason, market: &MarketSnapshot, tally: &mut Tally) {
        let name = self.name();
        let mut roles: Vec<(Side, RoleTag)> = self
            .state
            .legs
            .values()
            .map(|leg| (leg.side(), leg.role()))
            .collect();
        roles.sort_by_key(|(side, role)| (!side.is_sell(), *role));

        tracing::warn!(strategy = name, reason = %reason, legs = roles.len(), "Exiting all legs");
        for (_, role) in roles {
            match self.close_role(role, reason.tag(), market).await {
                Ok(()) => tally.filled += 1,
                Err(e) => {
                    tally.failed += 1;
                    tracing::error!(
                        strategy = name,
                        role = %role,
                        error = %e,
                        "Exit order failed; leg stays in the ledger"
                    );
                }
            }
        }

        if self.state.close_structure() {
            tracing::info!(strategy = name, reason = %reason, "Structure closed");
        }
    }
}
