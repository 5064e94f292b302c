use crate::domain::quote::{Fundamentals, MarketData};
use crate::error::FetchError;

#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Latest quote plus daily bars covering at least the last `history_days` days.
    async fn fetch(&self, symbol: &str, history_days: u32) -> Result<MarketData, FetchError>;
}

#[async_trait::async_trait]
pub trait FundamentalsProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<Fundamentals, FetchError>;
}
