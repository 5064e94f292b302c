use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickerRank {
    pub symbol: String,
    pub mention_count: u32,
    pub rank: u32,
}
