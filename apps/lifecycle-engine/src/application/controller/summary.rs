//! Per-cycle P&L summary.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::StrategyController;
use crate::domain::market::MarketSnapshot;
use crate::domain::risk::RiskPolicy;
use crate::observability;

/// P&L figures printed after every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PnlSummary {
    /// Booked P&L from the journal.
    pub closed: Decimal,
    /// Mark-to-market P&L of live legs.
    pub open: Decimal,
    /// Manual offset aligning the figure with broker history.
    pub offset: Decimal,
    /// Broker-reported P&L for the underlying, when positions are available.
    pub broker: Option<Decimal>,
}

impl PnlSummary {
    /// Closed plus open plus offset.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.closed + self.open + self.offset
    }

    /// Log the summary. Logged at info on candle marks, debug otherwise.
    pub fn log(&self, strategy: &str, verbose: bool) {
        let total = self.total();
        if verbose {
            tracing::info!(
                strategy,
                closed = %self.closed,
                open = %self.open,
                offset = %self.offset,
                total = %total,
                broker = ?self.broker,
                "P&L"
            );
        } else {
            tracing::debug!(strategy, open = %self.open, total = %total, "P&L");
        }
    }
}

impl StrategyController {
    pub(super) async fn pnl_summary(&self, market: &MarketSnapshot) -> PnlSummary {
        let open = RiskPolicy::open_pnl(&self.state, market).total;
        observability::set_open_pnl(self.name(), open.to_f64().unwrap_or_default());

        let broker = market.broker.rows().map(|rows| {
            rows.iter()
                .filter(|row| row.matches_underlying(&self.settings.underlying))
                .map(|row| row.broker_pnl())
                .sum::<Decimal>()
        });

        PnlSummary {
            closed: self.deps.journal.closed_pnl().await,
            open,
            offset: self.settings.manual_pnl_offset,
            broker,
        }
    }
}
