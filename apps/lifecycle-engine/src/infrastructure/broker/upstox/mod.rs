//! Upstox Broker Adapter
//!
//! Implements [`BrokerApi`](crate::application::ports::BrokerApi) over the
//! Upstox v2 REST API: market orders, order details, cancels and
//! short-term positions.

mod api_types;
mod http_client;

pub use http_client::UpstoxHttpClient;
