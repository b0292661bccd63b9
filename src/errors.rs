use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Errors from a [`MarketDataPort`](crate::market_data::MarketDataPort) lookup.
#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("cannot find order book ticker for `{0}`")]
    NotFound(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed {field} for `{symbol}`: {value:?}")]
    Malformed {
        symbol: String,
        field: &'static str,
        value: String,
    },

    #[error("ticker lookup for `{0}` timed out")]
    Timeout(String),
}

/// Errors from [`OrderFillEngine::evaluate`](crate::engine::OrderFillEngine::evaluate).
#[derive(Debug, Error)]
pub enum EngineError {
    /// Nothing was written; the trade is untouched.
    #[error("failed to create order for trade {trade_id}: {source}")]
    OrderCreate {
        trade_id: Uuid,
        #[source]
        source: StoreError,
    },

    /// The order exists but the trade still carries its old remaining size.
    #[error("order {order_id} created but trade {trade_id} was not saved: {source}")]
    TradeSave {
        trade_id: Uuid,
        order_id: Uuid,
        #[source]
        source: StoreError,
    },
}

/// Why a single trade could not be evaluated during a pass.
#[derive(Debug, Error)]
pub enum TradeFailure {
    #[error(transparent)]
    MarketData(#[from] MarketDataError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("evaluation task failed: {0}")]
    Task(String),
}

/// Pass-level outcome of [`TradeScanner::run_once`](crate::scanner::TradeScanner::run_once).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to load active trades: {0}")]
    LoadTrades(#[source] StoreError),

    #[error("nothing to trade")]
    NothingToTrade,

    #[error("a pass is already running")]
    PassInProgress,
}

impl ScanError {
    /// `true` for outcomes that are not faults of the system.
    pub fn is_benign(&self) -> bool {
        matches!(self, ScanError::NothingToTrade | ScanError::PassInProgress)
    }
}
