use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sell order recorded against a [`Trade`](crate::trade::Trade).
///
/// - `size` is what was matched in this fill, never zero or negative
/// - `price` is the best bid at the moment of the fill
///
/// Orders are written once and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub trade_id: Uuid,
    pub size: f64,
    pub price: f64,
    pub created_at: SystemTime,
}

impl Order {
    /// Quote amount received for this fill.
    pub fn notional(&self) -> f64 {
        self.size * self.price
    }
}
