use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use crate::{errors::MarketDataError, ticker::MarketSnapshot};

const BOOK_TICKER_PATH: &str = "/api/v3/ticker/bookTicker";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Source of best bid/ask snapshots.
#[async_trait]
pub trait MarketDataPort: Send + Sync {
    /// Current best bid/ask for `symbol`, or [`MarketDataError::NotFound`].
    async fn lookup(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError>;
}

/// Binance sends every number as a decimal string.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookTicker {
    symbol: String,
    bid_price: String,
    bid_qty: String,
    ask_price: String,
    ask_qty: String,
}

fn parse_field(symbol: &str, field: &'static str, raw: &str) -> Result<f64, MarketDataError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| MarketDataError::Malformed {
            symbol: symbol.to_string(),
            field,
            value: raw.to_string(),
        })
}

impl BookTicker {
    fn into_snapshot(self) -> Result<MarketSnapshot, MarketDataError> {
        Ok(MarketSnapshot {
            bid_price: parse_field(&self.symbol, "bidPrice", &self.bid_price)?,
            bid_quantity: parse_field(&self.symbol, "bidQty", &self.bid_qty)?,
            ask_price: parse_field(&self.symbol, "askPrice", &self.ask_price)?,
            ask_quantity: parse_field(&self.symbol, "askQty", &self.ask_qty)?,
            symbol: self.symbol,
        })
    }
}

/// Order book ticker lookups against the Binance spot REST API.
pub struct BinanceBookTicker {
    client: Client,
    api_base: String,
    api_key: Option<String>,
}

impl BinanceBookTicker {
    pub fn new(api_base: &str, api_key: Option<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl MarketDataPort for BinanceBookTicker {
    async fn lookup(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        let mut req = self
            .client
            .get(format!("{}{}", self.api_base, BOOK_TICKER_PATH))
            .query(&[("symbol", symbol)]);
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req.send().await?;
        // Binance answers an unknown symbol with 400 {"code":-1121,...}
        if matches!(resp.status(), StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND) {
            return Err(MarketDataError::NotFound(symbol.to_string()));
        }
        let body = resp.error_for_status()?.text().await?;
        if body.trim().is_empty() {
            return Err(MarketDataError::NotFound(symbol.to_string()));
        }
        let ticker: BookTicker =
            serde_json::from_str(&body).map_err(|_| MarketDataError::Malformed {
                symbol: symbol.to_string(),
                field: "body",
                value: body.clone(),
            })?;
        debug!(symbol, bid = %ticker.bid_price, qty = %ticker.bid_qty, "book ticker");
        ticker.into_snapshot()
    }
}
