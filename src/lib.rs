pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod instrument;
pub mod market_data;
pub mod orders;
pub mod scanner;
pub mod simulate;
pub mod store;
pub mod ticker;
pub mod trade;
pub mod utils;
