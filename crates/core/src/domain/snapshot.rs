use crate::domain::mention::Source;
use crate::domain::quote::{PricePoint, QuoteSnapshot};
use crate::domain::rank::TickerRank;
use crate::time::window::AggregationWindow;
use anyhow::{bail, ensure};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Ok { posts: usize },
    RateLimited { retry_after_secs: Option<u64> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceReport {
    pub name: String,
    pub source: Source,
    #[serde(flatten)]
    pub status: SourceStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Enrichment {
    Ok {
        quote: QuoteSnapshot,
        history: Vec<PricePoint>,
    },
    Failed {
        error: String,
    },
}

impl Enrichment {
    pub fn quote(&self) -> Option<&QuoteSnapshot> {
        match self {
            Enrichment::Ok { quote, .. } => Some(quote),
            Enrichment::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerEntry {
    pub rank: TickerRank,
    pub market: Enrichment,
}

/// Everything one cycle produced. Published as a unit; readers never see a mix of cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub window: AggregationWindow,
    pub sources: Vec<SourceReport>,
    pub total_posts: usize,
    pub total_mentions: usize,
    pub entries: Vec<TickerEntry>,
}

impl DashboardSnapshot {
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut symbols = BTreeSet::<&str>::new();
        let mut prev_count: Option<u32> = None;

        for (idx, entry) in self.entries.iter().enumerate() {
            let expected_rank = (idx + 1) as u32;
            ensure!(
                entry.rank.rank == expected_rank,
                "ranks must be contiguous: expected {expected_rank}, got {}",
                entry.rank.rank
            );
            ensure!(
                symbols.insert(entry.rank.symbol.as_str()),
                "duplicate symbol in rank table: {}",
                entry.rank.symbol
            );
            if let Some(prev) = prev_count {
                ensure!(
                    entry.rank.mention_count <= prev,
                    "mention counts must be non-increasing (rank {} has {} > {prev})",
                    entry.rank.rank,
                    entry.rank.mention_count
                );
            }
            prev_count = Some(entry.rank.mention_count);
        }

        for entry in &self.entries {
            if let Some(quote) = entry.market.quote() {
                if quote.symbol != entry.rank.symbol {
                    bail!(
                        "quote for {} attached to ranked symbol {}",
                        quote.symbol,
                        entry.rank.symbol
                    );
                }
            }
        }

        Ok(())
    }

    pub fn entry(&self, symbol: &str) -> Option<&TickerEntry> {
        self.entries
            .iter()
            .find(|e| e.rank.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn ranks(&self) -> impl Iterator<Item = &TickerRank> {
        self.entries.iter().map(|e| &e.rank)
    }
}

/// Record of a cycle that did not produce a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleFailure {
    pub cycle_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub error: String,
}
