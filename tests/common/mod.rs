#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use sell_trader::{
    engine::OrderFillEngine,
    errors::MarketDataError,
    market_data::MarketDataPort,
    orders::Order,
    scanner::{ScannerConfig, TradeScanner},
    store::{MemoryStore, OrderStore, StoreError, StoreResult, TradeStore},
    ticker::MarketSnapshot,
    trade::Trade,
};

/// How the scripted market answers for one symbol.
#[derive(Clone)]
pub enum Quote {
    Bid { price: f64, qty: f64 },
    Slow { delay: Duration, price: f64, qty: f64 },
    Panic,
}

/// A market whose answers are fixed up front. Unknown symbols are not found.
#[derive(Default)]
pub struct ScriptedMarket {
    quotes: HashMap<String, Quote>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quote(mut self, symbol: &str, quote: Quote) -> Self {
        self.quotes.insert(symbol.to_string(), quote);
        self
    }

    pub fn bid(self, symbol: &str, price: f64, qty: f64) -> Self {
        self.quote(symbol, Quote::Bid { price, qty })
    }
}

#[async_trait]
impl MarketDataPort for ScriptedMarket {
    async fn lookup(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let answer = match self.quotes.get(symbol).cloned() {
            Some(Quote::Bid { price, qty }) => Ok(MarketSnapshot::bid(symbol, price, qty)),
            Some(Quote::Slow { delay, price, qty }) => {
                tokio::time::sleep(delay).await;
                Ok(MarketSnapshot::bid(symbol, price, qty))
            }
            Some(Quote::Panic) => panic!("market blew up for {symbol}"),
            None => Err(MarketDataError::NotFound(symbol.to_string())),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        answer
    }
}

/// A [`MemoryStore`] whose reads and order writes can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    pub fail_load: AtomicBool,
    pub fail_orders: AtomicBool,
    pub saves: AtomicUsize,
}

impl FlakyStore {
    pub fn with_trades(trades: impl IntoIterator<Item = Trade>) -> Self {
        FlakyStore {
            inner: MemoryStore::with_trades(trades),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TradeStore for FlakyStore {
    async fn load_active(&self) -> StoreResult<Vec<Trade>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("database is locked".into()));
        }
        self.inner.load_active().await
    }

    async fn save(&self, trade: &Trade) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(trade).await
    }
}

#[async_trait]
impl OrderStore for FlakyStore {
    async fn create(&self, order: &Order) -> StoreResult<()> {
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("orders table is read-only".into()));
        }
        self.inner.create(order).await
    }
}

pub fn bnb_trade() -> Trade {
    Trade::new("BNB", "USDT", 50.0, 111.0)
}

pub fn scanner<S, M>(store: Arc<S>, market: Arc<M>, config: ScannerConfig) -> TradeScanner
where
    S: TradeStore + OrderStore + 'static,
    M: MarketDataPort + 'static,
{
    let engine = Arc::new(OrderFillEngine::new(store.clone(), store.clone()));
    TradeScanner::new(store, market, engine, config)
}
