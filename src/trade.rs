use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::instrument::Pair;

/// A trade is a standing intent to sell `order_size_total` units of the base
/// asset at `order_price` (quote per base) or better.
///
/// # Lifecycle
/// - Created with `order_size_remaining == order_size_total`.
/// - Every fill records an [`Order`](crate::orders::Order) and decrements
///   `order_size_remaining` by the order size.
/// - Once `order_size_remaining` reaches zero the trade is done and is no
///   longer returned by [`TradeStore::load_active`](crate::store::TradeStore::load_active).
///
/// Sizes and prices are plain `f64`, compared and subtracted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: Uuid,
    pub order_size_total: f64,
    pub order_size_remaining: f64,
    pub order_price: f64,
    pub base_currency: String,
    pub quote_currency: String,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl Trade {
    pub fn new(
        base_currency: impl Into<String>,
        quote_currency: impl Into<String>,
        order_size: f64,
        order_price: f64,
    ) -> Self {
        let now = SystemTime::now();
        Trade {
            id: Uuid::new_v4(),
            order_size_total: order_size,
            order_size_remaining: order_size,
            order_price,
            base_currency: base_currency.into(),
            quote_currency: quote_currency.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.base_currency.clone(), self.quote_currency.clone())
    }

    /// Exchange symbol of the pair, e.g. "BNBUSDT".
    pub fn symbol(&self) -> String {
        self.pair().symbol()
    }

    pub fn is_active(&self) -> bool {
        self.order_size_remaining > 0.0
    }

    /// Size already matched by orders.
    pub fn filled(&self) -> f64 {
        self.order_size_total - self.order_size_remaining
    }
}
