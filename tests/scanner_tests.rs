mod common;

use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use common::{FlakyStore, Quote, ScriptedMarket, bnb_trade, scanner};
use sell_trader::{
    errors::{EngineError, MarketDataError, ScanError, TradeFailure},
    scanner::ScannerConfig,
    store::MemoryStore,
    trade::Trade,
};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn empty_store_is_nothing_to_trade() {
    let s = scanner(
        Arc::new(MemoryStore::new()),
        Arc::new(ScriptedMarket::new()),
        ScannerConfig::default(),
    );
    let err = s.run_once(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ScanError::NothingToTrade));
    assert!(err.is_benign());
}

#[tokio::test]
async fn load_failure_fails_the_pass() {
    let store = Arc::new(FlakyStore::with_trades([bnb_trade()]));
    store.fail_load.store(true, Ordering::SeqCst);
    let market = Arc::new(ScriptedMarket::new().bid("BNBUSDT", 115.0, 50.0));
    let s = scanner(store, market.clone(), ScannerConfig::default());

    let err = s.run_once(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ScanError::LoadTrades(_)));
    assert!(!err.is_benign());
    assert_eq!(market.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fills_every_eligible_trade() {
    let full = bnb_trade();
    let partial = Trade::new("ETH", "BTC", 3.0, 0.05);
    let below = Trade::new("SOL", "USDT", 10.0, 200.0);
    let store = Arc::new(MemoryStore::with_trades([
        full.clone(),
        partial.clone(),
        below.clone(),
    ]));
    let market = Arc::new(
        ScriptedMarket::new()
            .bid("BNBUSDT", 115.0, 50.0)
            .bid("ETHBTC", 0.06, 1.25)
            .bid("SOLUSDT", 150.0, 100.0),
    );
    let s = scanner(store.clone(), market, ScannerConfig::default());

    let report = s.run_once(&CancellationToken::new()).await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.evaluated, 3);
    assert_eq!(report.orders.len(), 2);

    assert_eq!(store.trade(full.id).unwrap().order_size_remaining, 0.0);
    assert_eq!(store.trade(partial.id).unwrap().order_size_remaining, 1.75);
    assert_eq!(store.trade(below.id).unwrap().order_size_remaining, 10.0);
    assert!(store.orders_for(below.id).is_empty());
}

#[tokio::test]
async fn failed_lookup_does_not_stop_siblings() {
    let missing = Trade::new("FOO", "BAR", 1.0, 1.0);
    let eligible = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([missing.clone(), eligible.clone()]));
    let market = Arc::new(ScriptedMarket::new().bid("BNBUSDT", 130.0, 22.0));
    let s = scanner(store.clone(), market, ScannerConfig::default());

    let report = s.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.orders.len(), 1);
    assert_eq!(report.failures.len(), 1);
    let (failed_id, failure) = &report.failures[0];
    assert_eq!(*failed_id, missing.id);
    assert!(matches!(
        failure,
        TradeFailure::MarketData(MarketDataError::NotFound(sym)) if sym == "FOOBAR"
    ));
    assert_eq!(store.trade(eligible.id).unwrap().order_size_remaining, 28.0);
    assert_eq!(store.trade(missing.id).unwrap().order_size_remaining, 1.0);
}

#[tokio::test]
async fn panicking_lookup_is_isolated() {
    let doomed = Trade::new("BAD", "USDT", 1.0, 1.0);
    let eligible = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([doomed.clone(), eligible.clone()]));
    let market = Arc::new(
        ScriptedMarket::new()
            .quote("BADUSDT", Quote::Panic)
            .bid("BNBUSDT", 115.0, 50.0),
    );
    let s = scanner(store.clone(), market, ScannerConfig::default());

    let report = s.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.orders.len(), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, doomed.id);
    assert!(matches!(report.failures[0].1, TradeFailure::Task(_)));
    assert_eq!(store.trade(eligible.id).unwrap().order_size_remaining, 0.0);
}

#[tokio::test]
async fn order_store_failure_keeps_remaining_size() {
    let trade = bnb_trade();
    let store = Arc::new(FlakyStore::with_trades([trade.clone()]));
    store.fail_orders.store(true, Ordering::SeqCst);
    let market = Arc::new(ScriptedMarket::new().bid("BNBUSDT", 115.0, 50.0));
    let s = scanner(store.clone(), market, ScannerConfig::default());

    let report = s.run_once(&CancellationToken::new()).await.unwrap();

    assert!(report.orders.is_empty());
    assert!(matches!(
        report.failures[0].1,
        TradeFailure::Engine(EngineError::OrderCreate { .. })
    ));
    assert_eq!(store.saves.load(Ordering::SeqCst), 0);
    assert_eq!(store.inner.trade(trade.id).unwrap().order_size_remaining, 50.0);
    assert_eq!(store.inner.order_count(), 0);
}

#[tokio::test]
async fn repeated_passes_conserve_size() {
    let trade = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([trade.clone()]));
    let market = Arc::new(ScriptedMarket::new().bid("BNBUSDT", 112.0, 7.0));
    let s = scanner(store.clone(), market, ScannerConfig::default());
    let cancel = CancellationToken::new();

    let mut passes = 0;
    loop {
        match s.run_once(&cancel).await {
            Ok(report) => {
                assert!(report.is_clean());
                passes += 1;
                let now = store.trade(trade.id).unwrap();
                let filled: f64 = store.orders_for(trade.id).iter().map(|o| o.size).sum();
                assert_eq!(now.order_size_remaining + filled, trade.order_size_total);
            }
            Err(ScanError::NothingToTrade) => break,
            Err(e) => panic!("unexpected pass error: {e}"),
        }
    }

    // 7 × 7 then the last unit
    assert_eq!(passes, 8);
    let orders = store.orders_for(trade.id);
    assert_eq!(orders.len(), 8);
    assert_eq!(orders.last().unwrap().size, 1.0);
    assert_eq!(store.trade(trade.id).unwrap().order_size_remaining, 0.0);
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_bounded() {
    let trades: Vec<Trade> = (0..10).map(|_| bnb_trade()).collect();
    let store = Arc::new(MemoryStore::with_trades(trades));
    let market = Arc::new(ScriptedMarket::new().quote(
        "BNBUSDT",
        Quote::Slow {
            delay: Duration::from_millis(50),
            price: 100.0,
            qty: 1.0,
        },
    ));
    let config = ScannerConfig {
        max_concurrency: 3,
        ..ScannerConfig::default()
    };
    let s = scanner(store, market.clone(), config);

    let report = s.run_once(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.evaluated, 10);
    assert_eq!(market.calls.load(Ordering::SeqCst), 10);
    let peak = market.peak.load(Ordering::SeqCst);
    assert!(peak <= 3, "peak concurrency was {peak}");
    assert!(peak >= 2, "lookups never overlapped");
}

#[tokio::test(start_paused = true)]
async fn slow_lookup_times_out() {
    let trade = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([trade.clone()]));
    let market = Arc::new(ScriptedMarket::new().quote(
        "BNBUSDT",
        Quote::Slow {
            delay: Duration::from_secs(30),
            price: 115.0,
            qty: 50.0,
        },
    ));
    let config = ScannerConfig {
        lookup_timeout: Duration::from_millis(100),
        ..ScannerConfig::default()
    };
    let s = scanner(store.clone(), market, config);

    let report = s.run_once(&CancellationToken::new()).await.unwrap();

    assert!(matches!(
        report.failures[0].1,
        TradeFailure::MarketData(MarketDataError::Timeout(_))
    ));
    assert_eq!(store.trade(trade.id).unwrap().order_size_remaining, 50.0);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_pending_lookups() {
    let trade = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([trade.clone()]));
    let market = Arc::new(ScriptedMarket::new().quote(
        "BNBUSDT",
        Quote::Slow {
            delay: Duration::from_secs(2),
            price: 115.0,
            qty: 50.0,
        },
    ));
    let s = scanner(store.clone(), market, ScannerConfig::default());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        trigger.cancel();
    });

    let report = s.run_once(&cancel).await.unwrap();

    assert!(matches!(report.failures[0].1, TradeFailure::Cancelled));
    assert!(report.orders.is_empty());
    assert_eq!(store.order_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn overlapping_pass_is_rejected() {
    let trade = bnb_trade();
    let store = Arc::new(MemoryStore::with_trades([trade.clone()]));
    let market = Arc::new(ScriptedMarket::new().quote(
        "BNBUSDT",
        Quote::Slow {
            delay: Duration::from_millis(200),
            price: 130.0,
            qty: 22.0,
        },
    ));
    let s = Arc::new(scanner(store.clone(), market, ScannerConfig::default()));

    let first = {
        let s = s.clone();
        tokio::spawn(async move {
            let cancel = CancellationToken::new();
            s.run_once(&cancel).await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = s.run_once(&CancellationToken::new()).await;
    assert!(matches!(second, Err(ScanError::PassInProgress)));

    let report = first.await.unwrap().unwrap();
    assert_eq!(report.orders.len(), 1);
    // only the first pass touched the trade
    assert_eq!(store.orders_for(trade.id).len(), 1);
    assert_eq!(store.trade(trade.id).unwrap().order_size_remaining, 28.0);
}

#[tokio::test(start_paused = true)]
async fn watch_keeps_ticking_until_cancelled() {
    let trade = Trade::new("BNB", "USDT", 10.0, 111.0);
    let missing = Trade::new("FOO", "BAR", 1.0, 1.0);
    let store = Arc::new(MemoryStore::with_trades([trade.clone(), missing]));
    let market = Arc::new(ScriptedMarket::new().bid("BNBUSDT", 115.0, 2.0));
    let s = Arc::new(scanner(store.clone(), market, ScannerConfig::default()));

    let cancel = CancellationToken::new();
    let handle = {
        let s = s.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { s.watch(Duration::from_millis(100), cancel).await })
    };

    // ticks at 0, 100 and 200ms; each sells 2 despite the failing sibling
    tokio::time::sleep(Duration::from_millis(250)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(store.orders_for(trade.id).len(), 3);
    assert_eq!(store.trade(trade.id).unwrap().order_size_remaining, 4.0);
}
