//! The periodic driver: one pass loads every active trade, fetches a ticker
//! for each and hands the pair to the [`OrderFillEngine`].
//!
//! ## Concurrency
//! - every trade gets its own tokio task, all spawned at the start of a pass
//!   and joined before the pass returns
//! - a [`Semaphore`] caps how many of them run at once
//!   ([`ScannerConfig::max_concurrency`])
//! - passes never overlap: a second `run_once` while one is in flight gets
//!   [`ScanError::PassInProgress`], so a trade is never evaluated twice at once
//!
//! ## Failures
//! Only failing to load the trades fails a pass. Anything that goes wrong for
//! a single trade (missing ticker, timeout, storage error) is logged, kept in
//! [`PassReport::failures`] and does not stop its siblings.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, Semaphore},
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    engine::{Evaluation, OrderFillEngine},
    errors::{MarketDataError, ScanError, TradeFailure},
    market_data::MarketDataPort,
    store::TradeStore,
    trade::Trade,
};

#[derive(Clone, Debug)]
pub struct ScannerConfig {
    /// Upper bound on evaluations running at the same time.
    pub max_concurrency: usize,
    /// Deadline for a single ticker lookup.
    pub lookup_timeout: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        ScannerConfig {
            max_concurrency: 16,
            lookup_timeout: Duration::from_secs(5),
        }
    }
}

/// What happened during one pass.
#[derive(Debug, Default)]
pub struct PassReport {
    /// Trades that got a ticker and went through the engine.
    pub evaluated: usize,
    /// Orders created in this pass.
    pub orders: Vec<Uuid>,
    pub failures: Vec<(Uuid, TradeFailure)>,
}

impl PassReport {
    fn record(&mut self, eval: Evaluation) {
        self.evaluated += 1;
        if let Some(order) = eval.order {
            self.orders.push(order.id);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct TradeScanner {
    trades: Arc<dyn TradeStore>,
    market: Arc<dyn MarketDataPort>,
    engine: Arc<OrderFillEngine>,
    config: ScannerConfig,
    pass: Mutex<()>,
}

impl TradeScanner {
    pub fn new(
        trades: Arc<dyn TradeStore>,
        market: Arc<dyn MarketDataPort>,
        engine: Arc<OrderFillEngine>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            trades,
            market,
            engine,
            config,
            pass: Mutex::new(()),
        }
    }

    /// Evaluate every active trade once.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<PassReport, ScanError> {
        let Ok(_pass) = self.pass.try_lock() else {
            warn!("previous pass still running, skipping");
            return Err(ScanError::PassInProgress);
        };

        let trades = self.trades.load_active().await.map_err(|e| {
            error!(error = %e, "failed to load active trades");
            ScanError::LoadTrades(e)
        })?;
        if trades.is_empty() {
            return Err(ScanError::NothingToTrade);
        }
        debug!(count = trades.len(), "evaluating active trades");

        let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let mut trade_of_task = HashMap::with_capacity(trades.len());

        for trade in trades {
            let trade_id = trade.id;
            let permits = permits.clone();
            let market = self.market.clone();
            let engine = self.engine.clone();
            let cancel = cancel.clone();
            let lookup_timeout = self.config.lookup_timeout;

            let handle = tasks.spawn(async move {
                // the semaphore is never closed
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Err(TradeFailure::Cancelled);
                };
                evaluate_trade(trade, market.as_ref(), &engine, &cancel, lookup_timeout).await
            });
            trade_of_task.insert(handle.id(), trade_id);
        }

        let mut report = PassReport::default();
        while let Some(joined) = tasks.join_next_with_id().await {
            let (trade_id, result) = match joined {
                Ok((task, result)) => (trade_of_task[&task], result),
                Err(e) => (
                    trade_of_task[&e.id()],
                    Err(TradeFailure::Task(e.to_string())),
                ),
            };
            match result {
                Ok(eval) => report.record(eval),
                Err(failure) => {
                    error!(%trade_id, error = %failure, "trade evaluation failed");
                    report.failures.push((trade_id, failure));
                }
            }
        }

        info!(
            evaluated = report.evaluated,
            orders = report.orders.len(),
            failures = report.failures.len(),
            "pass finished"
        );
        Ok(report)
    }

    /// Run a pass every `every` until `cancel` fires. Errors are logged, the
    /// loop keeps going.
    pub async fn watch(&self, every: Duration, cancel: CancellationToken) {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("received shutdown, stopping trade scanner");
                    break;
                }
                _ = ticker.tick() => {
                    match self.run_once(&cancel).await {
                        Ok(_) => {}
                        Err(e) if e.is_benign() => debug!("{e}"),
                        Err(e) => error!(error = %e, "pass failed"),
                    }
                }
            }
        }
    }
}

/// Ticker lookup followed by the engine, for a single trade.
async fn evaluate_trade(
    trade: Trade,
    market: &dyn MarketDataPort,
    engine: &OrderFillEngine,
    cancel: &CancellationToken,
    lookup_timeout: Duration,
) -> Result<Evaluation, TradeFailure> {
    let symbol = trade.symbol();
    debug!(
        trade_id = %trade.id,
        %symbol,
        target = trade.order_price,
        remaining = trade.order_size_remaining,
        "trade"
    );

    let ticker = tokio::select! {
        _ = cancel.cancelled() => return Err(TradeFailure::Cancelled),
        looked_up = time::timeout(lookup_timeout, market.lookup(&symbol)) => match looked_up {
            Ok(res) => res?,
            Err(_) => return Err(MarketDataError::Timeout(symbol.clone()).into()),
        },
    };
    debug!(
        %symbol,
        bid = ticker.bid_price,
        bid_qty = ticker.bid_quantity,
        spread = ticker.spread(),
        "ticker"
    );

    // once the order write starts both writes run to completion
    if cancel.is_cancelled() {
        return Err(TradeFailure::Cancelled);
    }
    Ok(engine.evaluate(trade, &ticker).await?)
}
