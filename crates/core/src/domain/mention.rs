use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Reddit,
    Twitter,
    StockTwits,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Reddit => "reddit",
            Source::Twitter => "twitter",
            Source::StockTwits => "stocktwits",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reddit" => Some(Source::Reddit),
            "twitter" | "x" => Some(Source::Twitter),
            "stocktwits" => Some(Source::StockTwits),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A post as returned by a feed, before ticker extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    pub source: Source,
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One (post, ticker) occurrence. Posts without any recognised ticker produce a single
/// mention with `extracted_ticker = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub source: Source,
    pub raw_text: String,
    pub timestamp: DateTime<Utc>,
    pub extracted_ticker: Option<String>,
}
