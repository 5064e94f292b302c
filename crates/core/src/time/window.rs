use anyhow::{bail, Context};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// Longer windows would keep feeds' pagination and the mention set unbounded.
const MAX_WINDOW_DAYS: i64 = 30;

/// Inclusive `[start, end]` interval of post timestamps counted by one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl AggregationWindow {
    pub fn trailing(end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start: end - length,
            end,
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }
}

/// Parses lengths like `90m`, `24h`, `7d` or `3600s`.
pub fn parse_window_length(s: &str) -> anyhow::Result<Duration> {
    let t = s.trim();
    let Some((unit_idx, _)) = t.char_indices().last() else {
        bail!("invalid window {s:?}: expected <number><s|m|h|d>");
    };

    let (num, unit) = t.split_at(unit_idx);
    let n: i64 = num
        .parse()
        .with_context(|| format!("invalid window {s:?}: {num:?} is not a number"))?;
    anyhow::ensure!(n > 0, "window must be positive (got {s:?})");

    let length = match unit {
        "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        _ => bail!("invalid window unit in {s:?}: expected s, m, h or d"),
    };

    match length {
        Some(length) if length <= Duration::days(MAX_WINDOW_DAYS) => Ok(length),
        _ => bail!("window {s:?} exceeds {MAX_WINDOW_DAYS} days"),
    }
}
