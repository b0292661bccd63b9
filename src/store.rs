use async_trait::async_trait;
use bincode::{
    config::standard,
    error::{DecodeError, EncodeError},
};
use parity_db::{ColId, Db, Options};
use serde::{Serialize, de::DeserializeOwned};
use std::{
    collections::HashMap,
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{orders::Order, trade::Trade};

/// Errors from the trade/order stores
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("order {0} already exists")]
    DuplicateOrder(Uuid),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Where trades live.
#[async_trait]
pub trait TradeStore: Send + Sync {
    /// All trades with `order_size_remaining > 0`, in no particular order.
    async fn load_active(&self) -> StoreResult<Vec<Trade>>;

    /// Overwrite the stored trade with the same id.
    async fn save(&self, trade: &Trade) -> StoreResult<()>;
}

/// Where orders live. Insert-only.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateOrder`] if the id is taken.
    async fn create(&self, order: &Order) -> StoreResult<()>;
}

/// What `total - Σ(order sizes)` says the remaining size of `trade` should be.
pub fn expected_remaining(trade: &Trade, orders: &[Order]) -> f64 {
    trade.order_size_total - orders.iter().map(|o| o.size).sum::<f64>()
}

/// A trade whose remaining size was rewritten by [`Store::reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Repair {
    pub trade_id: Uuid,
    pub before: f64,
    pub after: f64,
}

/// Remaining size to restore if `trade` missed the decrement of one of its
/// orders (order written, trade save failed). `None` when consistent.
fn stale_remaining(trade: &Trade, orders: &[Order]) -> Option<f64> {
    let expected = expected_remaining(trade, orders).max(0.0);
    let tolerance = 1e-9 * trade.order_size_total.abs().max(1.0);
    (trade.order_size_remaining - expected > tolerance).then_some(expected)
}

const TRADES: ColId = 0;
const ORDERS: ColId = 1;
const ORDER_IDS: ColId = 2;

/// A ParityDB-backed store for trades and orders.
///
/// - column 0: trades keyed by trade id
/// - column 1: orders keyed by `trade_id ++ order_id`, so a trade's orders
///   are one prefix scan away
/// - column 2: order id -> column 1 key, so ids stay unique across trades
pub struct Store {
    db: Db,
    // serializes the id check and the commit in `create`
    order_writes: Mutex<()>,
}

impl Store {
    /// Open (or create) a ParityDB at `path`. Trades and orders are B-tree
    /// indexed so they can be iterated.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), 3);
        opts.columns[TRADES as usize].btree_index = true;
        opts.columns[ORDERS as usize].btree_index = true;
        let db = Db::open_or_create(&opts)?;
        Ok(Store {
            db,
            order_writes: Mutex::new(()),
        })
    }

    #[inline]
    fn order_key(order: &Order) -> Vec<u8> {
        let mut key = Vec::with_capacity(32);
        key.extend_from_slice(order.trade_id.as_bytes());
        key.extend_from_slice(order.id.as_bytes());
        key
    }

    #[inline]
    fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(value, standard())?)
    }

    #[inline]
    fn decode<T: DeserializeOwned>(raw: &[u8]) -> StoreResult<T> {
        let (value, _) = bincode::serde::decode_from_slice(raw, standard())?;
        Ok(value)
    }

    /// Insert (or overwrite) a trade.
    pub fn insert_trade(&self, trade: &Trade) -> StoreResult<()> {
        let value = Self::encode(trade)?;
        self.db
            .commit(vec![(TRADES, trade.id.as_bytes().to_vec(), Some(value))])?;
        Ok(())
    }

    pub fn trade(&self, id: Uuid) -> StoreResult<Option<Trade>> {
        match self.db.get(TRADES, id.as_bytes())? {
            Some(raw) => Ok(Some(Self::decode(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn all_trades(&self) -> StoreResult<Vec<Trade>> {
        let mut iter = self.db.iter(TRADES)?;
        iter.seek_to_first()?;
        let mut trades = Vec::new();
        while let Some((_key, raw)) = iter.next()? {
            trades.push(Self::decode(&raw)?);
        }
        Ok(trades)
    }

    /// Orders recorded against `trade_id`, oldest first.
    pub fn orders_for(&self, trade_id: Uuid) -> StoreResult<Vec<Order>> {
        let prefix = trade_id.as_bytes();
        let mut iter = self.db.iter(ORDERS)?;
        iter.seek(prefix)?;
        let mut orders: Vec<Order> = Vec::new();
        while let Some((key, raw)) = iter.next()? {
            if !key.starts_with(prefix) {
                break;
            }
            orders.push(Self::decode(&raw)?);
        }
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }

    /// Rewrite every trade whose remaining size is larger than its orders
    /// allow. Recomputed from the order records, so running it twice is
    /// harmless.
    pub fn reconcile(&self) -> StoreResult<Vec<Repair>> {
        let mut repairs = Vec::new();
        let mut batch = Vec::new();
        for mut trade in self.all_trades()? {
            let orders = self.orders_for(trade.id)?;
            let Some(after) = stale_remaining(&trade, &orders) else {
                continue;
            };
            warn!(
                trade_id = %trade.id,
                before = trade.order_size_remaining,
                after,
                "repairing stale remaining size"
            );
            repairs.push(Repair {
                trade_id: trade.id,
                before: trade.order_size_remaining,
                after,
            });
            trade.order_size_remaining = after;
            batch.push((TRADES, trade.id.as_bytes().to_vec(), Some(Self::encode(&trade)?)));
        }
        if !batch.is_empty() {
            self.db.commit(batch)?;
        }
        Ok(repairs)
    }
}

#[async_trait]
impl TradeStore for Store {
    async fn load_active(&self) -> StoreResult<Vec<Trade>> {
        let active: Vec<Trade> = self
            .all_trades()?
            .into_iter()
            .filter(Trade::is_active)
            .collect();
        debug!(count = active.len(), "loaded active trades");
        Ok(active)
    }

    async fn save(&self, trade: &Trade) -> StoreResult<()> {
        self.insert_trade(trade)
    }
}

#[async_trait]
impl OrderStore for Store {
    async fn create(&self, order: &Order) -> StoreResult<()> {
        let key = Self::order_key(order);
        let value = Self::encode(order)?;
        let _guard = lock(&self.order_writes);
        if self.db.get(ORDER_IDS, order.id.as_bytes())?.is_some() {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        self.db.commit(vec![
            (ORDER_IDS, order.id.as_bytes().to_vec(), Some(key.clone())),
            (ORDERS, key, Some(value)),
        ])?;
        Ok(())
    }
}

/// Trades and orders kept in process memory. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    trades: Mutex<HashMap<Uuid, Trade>>,
    orders: Mutex<Vec<Order>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trades(trades: impl IntoIterator<Item = Trade>) -> Self {
        let store = Self::new();
        for t in trades {
            store.insert_trade(t);
        }
        store
    }

    pub fn insert_trade(&self, trade: Trade) {
        lock(&self.trades).insert(trade.id, trade);
    }

    pub fn trade(&self, id: Uuid) -> Option<Trade> {
        lock(&self.trades).get(&id).cloned()
    }

    pub fn all_trades(&self) -> Vec<Trade> {
        lock(&self.trades).values().cloned().collect()
    }

    pub fn orders_for(&self, trade_id: Uuid) -> Vec<Order> {
        lock(&self.orders)
            .iter()
            .filter(|o| o.trade_id == trade_id)
            .cloned()
            .collect()
    }

    pub fn order_count(&self) -> usize {
        lock(&self.orders).len()
    }
}

#[async_trait]
impl TradeStore for MemoryStore {
    async fn load_active(&self) -> StoreResult<Vec<Trade>> {
        Ok(lock(&self.trades)
            .values()
            .filter(|t| t.is_active())
            .cloned()
            .collect())
    }

    async fn save(&self, trade: &Trade) -> StoreResult<()> {
        lock(&self.trades).insert(trade.id, trade.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create(&self, order: &Order) -> StoreResult<()> {
        let mut orders = lock(&self.orders);
        if orders.iter().any(|o| o.id == order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        orders.push(order.clone());
        Ok(())
    }
}
