//! HTTP client for the Upstox v2 REST API.
//!
//! One request per call. Pacing and retries belong to the
//! [`OrderExecutor`](crate::infrastructure::broker::OrderExecutor), so this
//! client only classifies failures into [`BrokerApiError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use super::api_types::{
    ApiEnvelope, ApiErrorBody, ApiErrorDetail, OneOrMany, OrderDetails, OrderIdData, PlaceOrderBody,
    PositionData,
};
use crate::application::ports::{
    BrokerApi, BrokerApiError, CancelOutcome, OrderRequest, OrderState, OrderStatusReport,
};
use crate::config::BrokerConfig;
use crate::domain::market::RawPositionRow;

/// Upstox error code for a cancel on an order that is already closed.
const ALREADY_CLOSED_CODE: &str = "UDAPI100040";
const ALREADY_CLOSED_TEXT: &str = "already cancelled/rejected/completed";

/// Upstox REST client.
#[derive(Debug, Clone)]
pub struct UpstoxHttpClient {
    client: Client,
    base_url: String,
    access_token: String,
    product: String,
    validity: String,
}

impl UpstoxHttpClient {
    /// Create a client from broker config.
    pub fn new(config: &BrokerConfig) -> Result<Self, BrokerApiError> {
        if config.access_token.trim().is_empty() {
            return Err(BrokerApiError::Api {
                status: 401,
                message: "access token is not configured".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BrokerApiError::Network {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            product: config.product.clone(),
            validity: config.validity.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BrokerApiError> {
        let response = request
            .bearer_auth(&self.access_token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BrokerApiError::Network {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            let envelope: ApiEnvelope<T> =
                response.json().await.map_err(|e| BrokerApiError::Decode {
                    message: e.to_string(),
                })?;
            if !envelope.is_success() {
                return Err(BrokerApiError::Api {
                    status: status.as_u16(),
                    message: envelope.error_text(),
                });
            }
            return envelope.data.ok_or_else(|| BrokerApiError::Decode {
                message: "response has no data".to_string(),
            });
        }

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .ok()
            .and_then(|b| b.errors.first().map(ApiErrorDetail::describe))
            .unwrap_or(body);

        Err(match categorize_status(status) {
            ErrorCategory::RateLimited => BrokerApiError::RateLimited {
                retry_after_secs: retry_after,
            },
            ErrorCategory::Retryable => BrokerApiError::Network {
                message: format!("HTTP {}: {message}", status.as_u16()),
            },
            ErrorCategory::NonRetryable => BrokerApiError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }
}

/// Error category for retry handling.
#[derive(Debug, PartialEq, Eq)]
enum ErrorCategory {
    RateLimited,
    Retryable,
    NonRetryable,
}

const fn categorize_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        429 => ErrorCategory::RateLimited,
        408 | 500 | 502 | 503 | 504 => ErrorCategory::Retryable,
        _ => ErrorCategory::NonRetryable,
    }
}

fn is_already_closed(message: &str) -> bool {
    message.contains(ALREADY_CLOSED_CODE) || message.to_lowercase().contains(ALREADY_CLOSED_TEXT)
}

#[async_trait]
impl BrokerApi for UpstoxHttpClient {
    async fn place_order(&self, request: &OrderRequest) -> Result<String, BrokerApiError> {
        let body = PlaceOrderBody {
            quantity: request.quantity,
            product: self.product.clone(),
            validity: self.validity.clone(),
            price: 0.0,
            tag: request.tag.clone(),
            instrument_token: request.instrument_key.clone(),
            order_type: "MARKET".to_string(),
            transaction_type: request.side.as_str().to_string(),
            disclosed_quantity: 0,
            trigger_price: 0.0,
            is_amo: false,
        };

        let placed: Result<OrderIdData, _> = self
            .send(self.client.post(self.url("/v2/order/place")).json(&body))
            .await;
        match placed {
            Ok(data) => Ok(data.order_id),
            Err(BrokerApiError::Api {
                status: 400 | 422,
                message,
            }) => Err(BrokerApiError::OrderRejected { reason: message }),
            Err(e) => Err(e),
        }
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderStatusReport, BrokerApiError> {
        let details: OneOrMany<OrderDetails> = self
            .send(
                self.client
                    .get(self.url("/v2/order/details"))
                    .query(&[("order_id", order_id)]),
            )
            .await?;
        let order = details.into_first().ok_or_else(|| BrokerApiError::Decode {
            message: format!("no details for order {order_id}"),
        })?;

        Ok(OrderStatusReport {
            state: OrderState::parse(&order.status),
            filled_quantity: order.filled_quantity,
            average_price: order.average_price.unwrap_or_default(),
            message: order.status_message,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<CancelOutcome, BrokerApiError> {
        let cancelled: Result<OrderIdData, _> = self
            .send(
                self.client
                    .delete(self.url("/v2/order/cancel"))
                    .query(&[("order_id", order_id)]),
            )
            .await;
        match cancelled {
            Ok(_) => Ok(CancelOutcome::Cancelled),
            Err(BrokerApiError::Api { message, .. }) if is_already_closed(&message) => {
                Ok(CancelOutcome::NotCancelled { message })
            }
            Err(e) => Err(e),
        }
    }

    async fn positions(&self) -> Result<Vec<RawPositionRow>, BrokerApiError> {
        let rows: Vec<PositionData> = self
            .send(self.client.get(self.url("/v2/portfolio/short-term-positions")))
            .await?;
        Ok(rows.into_iter().map(RawPositionRow::from).collect())
    }
}
