use crate::domain::mention::{Mention, RawPost, Source};
use crate::domain::rank::TickerRank;
use crate::time::window::AggregationWindow;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct Tally {
    count: u32,
    first_seen: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateStats {
    pub counted: usize,
    pub without_ticker: usize,
    pub outside_window: usize,
    pub distinct_symbols: usize,
}

/// Counts ticker mentions for a single window. Counts never carry over: a new window
/// starts from zero.
#[derive(Debug)]
pub struct MentionAggregator {
    window: AggregationWindow,
    tallies: HashMap<String, Tally>,
    next_seq: u64,
    stats: AggregateStats,
}

impl MentionAggregator {
    pub fn new(window: AggregationWindow) -> Self {
        Self {
            window,
            tallies: HashMap::new(),
            next_seq: 0,
            stats: AggregateStats::default(),
        }
    }

    /// Returns true when the mention was counted.
    pub fn record(&mut self, mention: &Mention) -> bool {
        if !self.window.contains(mention.timestamp) {
            self.stats.outside_window += 1;
            return false;
        }
        let Some(symbol) = mention.extracted_ticker.as_deref() else {
            self.stats.without_ticker += 1;
            return false;
        };

        let next_seq = &mut self.next_seq;
        let tally = self.tallies.entry(symbol.to_string()).or_insert_with(|| {
            let first_seen = *next_seq;
            *next_seq += 1;
            Tally {
                count: 0,
                first_seen,
            }
        });
        tally.count += 1;
        self.stats.counted += 1;
        true
    }

    pub fn extend<'a, I>(&mut self, mentions: I)
    where
        I: IntoIterator<Item = &'a Mention>,
    {
        for m in mentions {
            self.record(m);
        }
    }

    /// Top `top_n` symbols by count; equal counts keep first-seen order.
    pub fn rank(&self, top_n: usize) -> Vec<TickerRank> {
        let mut rows: Vec<(&str, Tally)> = self
            .tallies
            .iter()
            .map(|(sym, tally)| (sym.as_str(), *tally))
            .collect();

        rows.sort_by(|a, b| {
            b.1.count
                .cmp(&a.1.count)
                .then_with(|| a.1.first_seen.cmp(&b.1.first_seen))
        });

        rows.into_iter()
            .take(top_n)
            .enumerate()
            .map(|(idx, (symbol, tally))| TickerRank {
                symbol: symbol.to_string(),
                mention_count: tally.count,
                rank: (idx + 1) as u32,
            })
            .collect()
    }

    pub fn stats(&self) -> AggregateStats {
        AggregateStats {
            distinct_symbols: self.tallies.len(),
            ..self.stats
        }
    }

    /// Starts a new window, discarding every count from the previous one.
    pub fn reset(&mut self, window: AggregationWindow) {
        self.window = window;
        self.tallies.clear();
        self.next_seq = 0;
        self.stats = AggregateStats::default();
    }
}

/// Drops repeated posts (same source and id), keeping the first occurrence.
pub fn dedupe_posts(posts: Vec<RawPost>) -> Vec<RawPost> {
    let mut seen = HashSet::<(Source, String)>::new();
    posts
        .into_iter()
        .filter(|p| seen.insert((p.source, p.id.clone())))
        .collect()
}

/// Chronological order; the sort is stable so equal timestamps keep source/post order.
pub fn order_mentions(mentions: &mut [Mention]) {
    mentions.sort_by_key(|m| m.timestamp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap()
    }

    fn mention(ticker: Option<&str>, ts: DateTime<Utc>) -> Mention {
        Mention {
            source: Source::Reddit,
            raw_text: String::new(),
            timestamp: ts,
            extracted_ticker: ticker.map(str::to_string),
        }
    }

    fn window() -> AggregationWindow {
        AggregationWindow::trailing(now(), Duration::hours(24))
    }

    #[test]
    fn ranks_by_count_descending() {
        let mut agg = MentionAggregator::new(window());
        let t = now() - Duration::hours(1);
        for sym in ["AAPL", "TSLA", "TSLA", "NVDA", "TSLA", "AAPL"] {
            agg.record(&mention(Some(sym), t));
        }

        let ranks = agg.rank(10);
        let got: Vec<_> = ranks
            .iter()
            .map(|r| (r.symbol.as_str(), r.mention_count, r.rank))
            .collect();
        assert_eq!(got, vec![("TSLA", 3, 1), ("AAPL", 2, 2), ("NVDA", 1, 3)]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let mut agg = MentionAggregator::new(window());
        let t = now() - Duration::hours(1);
        for sym in ["MSFT", "AMD", "GOOGL", "AMD", "GOOGL", "MSFT"] {
            agg.record(&mention(Some(sym), t));
        }
        let order: Vec<_> = agg.rank(3).into_iter().map(|r| r.symbol).collect();
        assert_eq!(order, vec!["MSFT", "AMD", "GOOGL"]);
    }

    #[test]
    fn respects_top_n() {
        let mut agg = MentionAggregator::new(window());
        let t = now() - Duration::minutes(5);
        for sym in ["A1", "B1", "C1", "D1"] {
            agg.record(&mention(Some(sym), t));
        }
        assert_eq!(agg.rank(2).len(), 2);
        assert!(agg.rank(0).is_empty());
    }

    #[test]
    fn skips_out_of_window_and_untagged_mentions() {
        let mut agg = MentionAggregator::new(window());
        assert!(!agg.record(&mention(Some("TSLA"), now() - Duration::hours(30))));
        assert!(!agg.record(&mention(None, now() - Duration::hours(1))));
        assert!(agg.record(&mention(Some("TSLA"), now() - Duration::hours(1))));

        let stats = agg.stats();
        assert_eq!(stats.counted, 1);
        assert_eq!(stats.outside_window, 1);
        assert_eq!(stats.without_ticker, 1);
        assert_eq!(stats.distinct_symbols, 1);
    }

    #[test]
    fn reset_discards_previous_window() {
        let mut agg = MentionAggregator::new(window());
        agg.record(&mention(Some("TSLA"), now() - Duration::hours(1)));
        agg.reset(AggregationWindow::trailing(now() + Duration::hours(24), Duration::hours(24)));
        assert!(agg.rank(10).is_empty());
        assert_eq!(agg.stats(), AggregateStats::default());
    }

    #[test]
    fn dedupes_posts_by_source_and_id() {
        let post = |source, id: &str| RawPost {
            source,
            id: id.to_string(),
            text: String::new(),
            created_at: now(),
        };
        let posts = vec![
            post(Source::Reddit, "1"),
            post(Source::Reddit, "1"),
            post(Source::Twitter, "1"),
        ];
        assert_eq!(dedupe_posts(posts).len(), 2);
    }

    #[test]
    fn ordering_is_chronological_and_stable() {
        let t0 = now() - Duration::hours(2);
        let t1 = now() - Duration::hours(1);
        let mut mentions = vec![
            mention(Some("LATE"), t1),
            mention(Some("FIRST"), t0),
            mention(Some("SECOND"), t0),
        ];
        order_mentions(&mut mentions);
        let order: Vec<_> = mentions
            .iter()
            .filter_map(|m| m.extracted_ticker.as_deref())
            .collect();
        assert_eq!(order, vec!["FIRST", "SECOND", "LATE"]);
    }
}
