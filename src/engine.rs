use std::{cmp::Ordering, sync::Arc, time::SystemTime};

use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    errors::EngineError,
    orders::Order,
    store::{OrderStore, TradeStore},
    ticker::MarketSnapshot,
    trade::Trade,
};

/// How much of `trade` can be sold into `ticker`'s best bid, if anything.
///
/// - bid below the target price: nothing
/// - otherwise `min(remaining, bid quantity)`; equal quantities fill the rest
/// - a non-positive (or NaN) result is nothing, so an exhausted trade or an
///   empty bid never yields a zero-size order
pub fn plan_fill(trade: &Trade, ticker: &MarketSnapshot) -> Option<f64> {
    match ticker.bid_price.partial_cmp(&trade.order_price) {
        Some(Ordering::Less) | None => return None,
        Some(_) => {}
    }
    let size = if trade.order_size_remaining <= ticker.bid_quantity {
        trade.order_size_remaining
    } else {
        ticker.bid_quantity
    };
    (size > 0.0).then_some(size)
}

/// Result of one evaluation. `trade` is the post-fill state (unchanged if
/// `order` is `None`).
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub order: Option<Order>,
    pub trade: Trade,
}

/// Turns a trade plus a market snapshot into an order and a smaller trade.
///
/// The two writes are ordered and not transactional:
/// 1. the order is created; on failure nothing else happens
/// 2. the trade is saved with its reduced remaining size
///
/// If (2) fails the order exists while the stored trade is stale;
/// [`Store::reconcile`](crate::store::Store::reconcile) repairs that from
/// the order records.
pub struct OrderFillEngine {
    orders: Arc<dyn OrderStore>,
    trades: Arc<dyn TradeStore>,
}

impl OrderFillEngine {
    pub fn new(orders: Arc<dyn OrderStore>, trades: Arc<dyn TradeStore>) -> Self {
        Self { orders, trades }
    }

    pub async fn evaluate(
        &self,
        mut trade: Trade,
        ticker: &MarketSnapshot,
    ) -> Result<Evaluation, EngineError> {
        let Some(size) = plan_fill(&trade, ticker) else {
            debug!(
                trade_id = %trade.id,
                bid = ticker.bid_price,
                target = trade.order_price,
                "no fill"
            );
            return Ok(Evaluation { order: None, trade });
        };

        let order = Order {
            id: Uuid::new_v4(),
            trade_id: trade.id,
            size,
            price: ticker.bid_price,
            created_at: SystemTime::now(),
        };

        self.orders
            .create(&order)
            .await
            .map_err(|source| EngineError::OrderCreate {
                trade_id: trade.id,
                source,
            })?;

        trade.order_size_remaining -= size;
        trade.updated_at = order.created_at;

        self.trades
            .save(&trade)
            .await
            .map_err(|source| EngineError::TradeSave {
                trade_id: trade.id,
                order_id: order.id,
                source,
            })?;

        info!(
            trade_id = %trade.id,
            order_id = %order.id,
            size,
            price = order.price,
            notional = order.notional(),
            remaining = trade.order_size_remaining,
            "order created"
        );
        Ok(Evaluation {
            order: Some(order),
            trade,
        })
    }
}
