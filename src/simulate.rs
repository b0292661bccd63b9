//! Offline market for exercising the scanner without an exchange.
//!
//! Every lookup moves the symbol's mid price by a Gaussian step
//! `N(0, noise_sigma)` and quotes:
//! - `bid = mid - spread / 2`, `ask = mid + spread / 2`
//! - bid/ask quantities drawn as `Exp1 * mean_qty` (heavy-tailed sizes around
//!   `mean_qty`)
//!
//! Symbols that were never seeded are reported as not found, the same way an
//! exchange rejects an unknown symbol.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use rand_distr::{Distribution, Exp1, Normal, NormalError};
use thiserror::Error;

use crate::{errors::MarketDataError, market_data::MarketDataPort, ticker::MarketSnapshot};

#[derive(Clone, Debug)]
pub struct SimConfig {
    pub noise_sigma: f64,
    pub mean_qty: f64,
    pub spread: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            noise_sigma: 1.0,
            mean_qty: 10.0,
            spread: 0.2,
        }
    }
}

#[derive(Debug, Error)]
pub enum SimConfigError {
    #[error("noise_sigma must be finite and >= 0, got {0}")]
    NoiseSigma(f64),

    #[error("mean_qty must be finite and > 0, got {0}")]
    MeanQty(f64),

    #[error("spread must be finite and >= 0, got {0}")]
    Spread(f64),

    #[error(transparent)]
    Normal(#[from] NormalError),
}

pub struct SimulatedMarket {
    cfg: SimConfig,
    drift: Normal<f64>,
    mids: Mutex<HashMap<String, f64>>,
}

impl SimulatedMarket {
    /// Fails if `noise_sigma` or `spread` is negative, `mean_qty` is not
    /// positive, or any of them is not finite.
    pub fn new(cfg: SimConfig) -> Result<Self, SimConfigError> {
        if !(cfg.noise_sigma.is_finite() && cfg.noise_sigma >= 0.0) {
            return Err(SimConfigError::NoiseSigma(cfg.noise_sigma));
        }
        if !(cfg.mean_qty.is_finite() && cfg.mean_qty > 0.0) {
            return Err(SimConfigError::MeanQty(cfg.mean_qty));
        }
        if !(cfg.spread.is_finite() && cfg.spread >= 0.0) {
            return Err(SimConfigError::Spread(cfg.spread));
        }
        let drift = Normal::new(0.0, cfg.noise_sigma)?;
        Ok(SimulatedMarket {
            cfg,
            drift,
            mids: Mutex::new(HashMap::new()),
        })
    }

    /// Start quoting `symbol` around `mid`.
    pub fn seed(&self, symbol: impl Into<String>, mid: f64) {
        self.mids
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(symbol.into(), mid);
    }

    fn tick(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        let mut rng = rand::rng();
        let mut mids = self.mids.lock().unwrap_or_else(PoisonError::into_inner);
        let mid = mids
            .get_mut(symbol)
            .ok_or_else(|| MarketDataError::NotFound(symbol.to_string()))?;
        *mid = (*mid + self.drift.sample(&mut rng)).max(0.0);

        let half = self.cfg.spread / 2.0;
        let bid_qty: f64 = Exp1.sample(&mut rng);
        let ask_qty: f64 = Exp1.sample(&mut rng);
        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            bid_price: (*mid - half).max(0.0),
            bid_quantity: bid_qty * self.cfg.mean_qty,
            ask_price: *mid + half,
            ask_quantity: ask_qty * self.cfg.mean_qty,
        })
    }
}

#[async_trait]
impl MarketDataPort for SimulatedMarket {
    async fn lookup(&self, symbol: &str) -> Result<MarketSnapshot, MarketDataError> {
        self.tick(symbol)
    }
}
