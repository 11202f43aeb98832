//! Upstox v2 REST request and response types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::market::RawPositionRow;

// ============================================================================
// Envelope
// ============================================================================

/// Every Upstox response wraps its payload in `{status, data, errors}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ApiEnvelope<T> {
    /// `"success"` or `"error"`.
    pub status: String,
    /// Payload on success.
    #[serde(default)]
    pub data: Option<T>,
    /// Error details on failure.
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status.eq_ignore_ascii_case("success")
    }

    /// First error as `CODE: message`.
    pub fn error_text(&self) -> String {
        self.errors
            .first()
            .map_or_else(|| format!("status {}", self.status), ApiErrorDetail::describe)
    }
}

/// One entry of the `errors` array.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorDetail {
    #[serde(default, rename = "errorCode", alias = "error_code")]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorDetail {
    pub fn describe(&self) -> String {
        match (&self.error_code, &self.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(code), None) => code.clone(),
            (None, Some(message)) => message.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

/// Error body for non-2xx responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub errors: Vec<ApiErrorDetail>,
}

// ============================================================================
// Orders
// ============================================================================

/// `POST /v2/order/place` body.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceOrderBody {
    pub quantity: u32,
    pub product: String,
    pub validity: String,
    pub price: f64,
    pub tag: String,
    pub instrument_token: String,
    pub order_type: String,
    pub transaction_type: String,
    pub disclosed_quantity: u32,
    pub trigger_price: f64,
    pub is_amo: bool,
}

/// `data` of a placed or cancelled order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderIdData {
    pub order_id: String,
}

/// `data` of `GET /v2/order/details`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderDetails {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub filled_quantity: u32,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub status_message: Option<String>,
}

/// Order details arrive either as one object or as a list.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_first(self) -> Option<T> {
        match self {
            Self::One(item) => Some(item),
            Self::Many(items) => items.into_iter().next(),
        }
    }
}

// ============================================================================
// Positions
// ============================================================================

/// One row of `GET /v2/portfolio/short-term-positions`.
///
/// Upstox sends both `trading_symbol` and `tradingsymbol`; only the first is
/// read so the generic row aliases never see a duplicate.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionData {
    #[serde(default)]
    pub instrument_token: Option<String>,
    #[serde(default)]
    pub trading_symbol: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub average_price: Option<Decimal>,
    #[serde(default)]
    pub buy_value: Option<Decimal>,
    #[serde(default)]
    pub sell_value: Option<Decimal>,
    #[serde(default)]
    pub day_buy_price: Option<Decimal>,
    #[serde(default)]
    pub day_sell_price: Option<Decimal>,
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    #[serde(default)]
    pub sell_price: Option<Decimal>,
    #[serde(default)]
    pub last_price: Option<Decimal>,
}

impl From<PositionData> for RawPositionRow {
    fn from(data: PositionData) -> Self {
        Self {
            instrument_key: data.instrument_token,
            trading_symbol: data.trading_symbol,
            net_quantity: data.quantity,
            average_price: data.average_price,
            buy_value: data.buy_value,
            sell_value: data.sell_value,
            day_buy_price: data.day_buy_price,
            day_sell_price: data.day_sell_price,
            buy_price: data.buy_price,
            sell_price: data.sell_price,
            last_price: data.last_price,
            strike_price: None,
            expiry: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn test_envelope_without_data_decodes_for_any_payload() {
        let envelope: ApiEnvelope<OrderIdData> = serde_json::from_value(serde_json::json!({
            "status": "error",
            "errors": [{"errorCode": "UDAPI100040", "message": "already completed"}]
        }))
        .unwrap();

        assert!(!envelope.is_success());
        assert!(envelope.data.is_none());
        assert_eq!(envelope.error_text(), "UDAPI100040: already completed");
    }

    #[test]
    fn test_envelope_carries_order_details_list() {
        let envelope: ApiEnvelope<OneOrMany<OrderDetails>> = serde_json::from_value(serde_json::json!({
            "status": "success",
            "data": [{"status": "complete", "filled_quantity": 65, "average_price": 101.5}]
        }))
        .unwrap();

        let details = envelope.data.and_then(OneOrMany::into_first).unwrap();
        assert_eq!(details.filled_quantity, 65);
        assert_eq!(details.average_price, Some(dec!(101.5)));
    }
}
