//! Process configuration. Every value can come from a flag or from the
//! matching `TRADER_*` environment variable.

use std::{path::PathBuf, time::Duration};

use clap::Args;
use tracing::Level;

use crate::scanner::ScannerConfig;

#[derive(Args, Debug, Clone)]
pub struct TraderConfig {
    /// ParityDB directory holding trades and orders
    #[arg(long, env = "TRADER_DB_PATH", default_value = "trader.db", global = true)]
    pub db_path: PathBuf,

    /// Milliseconds between two passes
    #[arg(long, env = "TRADER_FREQUENCY", default_value_t = 1000, global = true)]
    pub frequency_ms: u64,

    /// trace, debug, info, warn or error
    #[arg(long, env = "TRADER_LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: Level,

    /// Evaluations allowed to run at the same time
    #[arg(long, env = "TRADER_MAX_CONCURRENCY", default_value_t = 16, global = true)]
    pub max_concurrency: usize,

    /// Deadline for one ticker lookup, in milliseconds
    #[arg(long, env = "TRADER_LOOKUP_TIMEOUT_MS", default_value_t = 5000, global = true)]
    pub lookup_timeout_ms: u64,

    #[command(flatten)]
    pub binance: BinanceConfig,
}

#[derive(Args, Debug, Clone)]
pub struct BinanceConfig {
    /// Binance REST base url
    #[arg(
        long = "binance-url",
        env = "TRADER_BINANCE_URL",
        default_value = "https://api.binance.com",
        global = true
    )]
    pub api_base: String,

    /// Sent as `X-MBX-APIKEY`; public ticker lookups work without it
    #[arg(
        long = "binance-api-key",
        env = "TRADER_BINANCE_APIKEY",
        hide_env_values = true,
        global = true
    )]
    pub api_key: Option<String>,
}

impl TraderConfig {
    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms.max(1))
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }

    pub fn scanner(&self) -> ScannerConfig {
        ScannerConfig {
            max_concurrency: self.max_concurrency.max(1),
            lookup_timeout: self.lookup_timeout(),
        }
    }
}
