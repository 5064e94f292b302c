use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A market metric that the provider may not have. Unavailable values are kept explicit so
/// a missing P/E (e.g. no earnings) is never shown as zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Metric<T> {
    Available(T),
    Unavailable,
}

impl<T> Default for Metric<T> {
    fn default() -> Self {
        Metric::Unavailable
    }
}

impl<T> Metric<T> {
    pub fn from_option(v: Option<T>) -> Self {
        match v {
            Some(v) => Metric::Available(v),
            None => Metric::Unavailable,
        }
    }

    pub fn as_option(&self) -> Option<&T> {
        match self {
            Metric::Available(v) => Some(v),
            Metric::Unavailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Metric::Available(_))
    }

    /// Keeps `self` when available, otherwise takes `other`.
    pub fn or(self, other: Metric<T>) -> Metric<T> {
        match self {
            Metric::Available(_) => self,
            Metric::Unavailable => other,
        }
    }
}

impl Metric<f64> {
    /// Non-finite provider values (NaN, inf) are treated as missing.
    pub fn finite(v: Option<f64>) -> Self {
        Metric::from_option(v.filter(|x| x.is_finite()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub symbol: String,
    pub name: Option<String>,
    pub currency: Option<String>,
    pub price: Metric<f64>,
    pub previous_close: Metric<f64>,
    pub change: Metric<f64>,
    pub change_percent: Metric<f64>,
    pub volume: Metric<u64>,
    pub avg_volume: Metric<f64>,
    pub day_high: Metric<f64>,
    pub day_low: Metric<f64>,
    pub market_cap: Metric<f64>,
    pub pe_ratio: Metric<f64>,
    pub dividend_yield: Metric<f64>,
    pub beta: Metric<f64>,
    pub as_of: DateTime<Utc>,
}

impl QuoteSnapshot {
    /// Overlays fundamentals onto a price quote. Values already present on the quote win.
    pub fn apply_fundamentals(&mut self, f: &Fundamentals) {
        if self.name.is_none() {
            self.name = f.name.clone();
        }
        self.market_cap = self.market_cap.or(f.market_cap);
        self.pe_ratio = self.pe_ratio.or(f.pe_ratio);
        self.dividend_yield = self.dividend_yield.or(f.dividend_yield);
        self.beta = self.beta.or(f.beta);
    }
}

/// Absolute and percent change against the previous close. Unavailable unless both prices
/// are known and the previous close is non-zero.
pub fn price_change(price: Metric<f64>, previous_close: Metric<f64>) -> (Metric<f64>, Metric<f64>) {
    match (price, previous_close) {
        (Metric::Available(p), Metric::Available(prev)) if prev != 0.0 => {
            let change = p - prev;
            (Metric::Available(change), Metric::Available(change / prev * 100.0))
        }
        _ => (Metric::Unavailable, Metric::Unavailable),
    }
}

/// Daily bar. Bars without a close are not kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: Metric<f64>,
    pub high: Metric<f64>,
    pub low: Metric<f64>,
    pub close: f64,
    pub volume: Metric<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub symbol: String,
    pub name: Option<String>,
    pub market_cap: Metric<f64>,
    pub pe_ratio: Metric<f64>,
    pub dividend_yield: Metric<f64>,
    pub beta: Metric<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketData {
    pub quote: QuoteSnapshot,
    pub history: Vec<PricePoint>,
}

/// Mean volume over the bars that report one.
pub fn average_volume(history: &[PricePoint]) -> Metric<f64> {
    let volumes: Vec<u64> = history
        .iter()
        .filter_map(|p| p.volume.as_option().copied())
        .collect();
    if volumes.is_empty() {
        return Metric::Unavailable;
    }
    let total: f64 = volumes.iter().map(|v| *v as f64).sum();
    Metric::Available(total / volumes.len() as f64)
}
