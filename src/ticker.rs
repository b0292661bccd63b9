use serde::{Deserialize, Serialize};

/// Best bid/ask for one symbol at one point in time.
///
/// Only the bid side drives fills; the ask side is kept for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub bid_price: f64,
    pub bid_quantity: f64,
    pub ask_price: f64,
    pub ask_quantity: f64,
}

impl MarketSnapshot {
    pub fn bid(symbol: impl Into<String>, bid_price: f64, bid_quantity: f64) -> Self {
        MarketSnapshot {
            symbol: symbol.into(),
            bid_price,
            bid_quantity,
            ask_price: 0.0,
            ask_quantity: 0.0,
        }
    }

    pub fn spread(&self) -> f64 {
        self.ask_price - self.bid_price
    }
}
