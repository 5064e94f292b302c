pub mod alpha_vantage;
pub mod cache;
pub mod enricher;
pub mod provider;
pub mod yahoo;

pub use enricher::{EnrichOptions, Enricher};
pub use provider::{FundamentalsProvider, MarketDataProvider};
