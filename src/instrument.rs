use std::fmt;

use serde::{Deserialize, Serialize};

/// A trading pair: base/quote.
///
/// Exchanges like Binance address a pair by the two asset codes glued
/// together with no separator, so `BNB`/`USDT` trades as `BNBUSDT`.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash)]
pub struct Pair {
    /// The asset you sell
    pub base: String,
    /// The asset you receive
    pub quote: String,
}

impl Pair {
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Self {
        Pair {
            base: base.into(),
            quote: quote.into(),
        }
    }

    /// Returns the exchange symbol, e.g "BNBUSDT". Case is preserved.
    pub fn symbol(&self) -> String {
        let mut s = String::with_capacity(self.base.len() + self.quote.len());
        s.push_str(&self.base);
        s.push_str(&self.quote);
        s
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}
