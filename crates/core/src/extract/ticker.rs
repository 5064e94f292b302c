use crate::domain::mention::{Mention, RawPost};
use crate::extract::dictionary::SymbolDictionary;
use anyhow::Context;
use regex::Regex;
use std::collections::HashSet;

// `$` + 1-5 capitals, optional share-class suffix, then a word boundary.
// Prices like `$100` or `$50.00` never match.
const CASHTAG_PATTERN: &str = r"\$([A-Z]{1,5}(?:\.[A-Z])?)\b";
const BARE_PATTERN: &str = r"\b([A-Z]{2,5})\b";

/// Common words that look like tickers when written in capitals.
pub const EXCLUDED_WORDS: &[&str] = &[
    "THE", "AND", "FOR", "ARE", "BUT", "NOT", "YOU", "ALL", "CAN", "HER", "WAS", "ONE", "OUR",
    "OUT", "DAY", "GET", "HAS", "HIM", "HOW", "ITS", "MAY", "NEW", "NOW", "OLD", "SEE", "TWO",
    "WHO", "BOY", "DID", "HIS", "LET", "PUT", "SAY", "SHE", "TOO", "USE", "A", "I",
];

// Only consulted for bare (non-cashtag) words: capitalised slang that collides with listings.
const AMBIGUOUS_BARE_WORDS: &[&str] = &[
    "AI", "ATH", "BE", "CEO", "DD", "EPS", "EV", "FOMO", "GO", "IMO", "IPO", "IT", "MA", "ON",
    "OR", "SO", "USA", "YOLO", "NET", "HD", "GM", "KO", "BA",
];

pub struct TickerExtractor {
    dictionary: SymbolDictionary,
    excluded: HashSet<&'static str>,
    ambiguous_bare: HashSet<&'static str>,
    allow_bare_symbols: bool,
    cashtag: Regex,
    bare: Regex,
}

impl TickerExtractor {
    pub fn new(dictionary: SymbolDictionary) -> anyhow::Result<Self> {
        Ok(Self {
            dictionary,
            excluded: EXCLUDED_WORDS.iter().copied().collect(),
            ambiguous_bare: AMBIGUOUS_BARE_WORDS.iter().copied().collect(),
            allow_bare_symbols: false,
            cashtag: Regex::new(CASHTAG_PATTERN).context("invalid cashtag pattern")?,
            bare: Regex::new(BARE_PATTERN).context("invalid bare symbol pattern")?,
        })
    }

    /// Also count capitalised words without a `$` when they are unambiguous dictionary symbols.
    pub fn with_bare_symbols(mut self, allow: bool) -> Self {
        self.allow_bare_symbols = allow;
        self
    }

    pub fn dictionary(&self) -> &SymbolDictionary {
        &self.dictionary
    }

    /// Distinct tickers in order of first appearance.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut candidates: Vec<(usize, &str, bool)> = self
            .cashtag
            .captures_iter(text)
            .filter_map(|cap| cap.get(1))
            .map(|m| (m.start(), m.as_str(), true))
            .collect();

        if self.allow_bare_symbols {
            for m in self.bare.find_iter(text) {
                if text[..m.start()].ends_with('$') {
                    continue;
                }
                candidates.push((m.start(), m.as_str(), false));
            }
            candidates.sort_by_key(|(pos, _, _)| *pos);
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (_, token, is_cashtag) in candidates {
            if !self.accepts(token, is_cashtag) {
                continue;
            }
            if seen.insert(token) {
                out.push(token.to_string());
            }
        }
        out
    }

    /// One mention per distinct ticker in the post, or a single ticker-less mention.
    pub fn mentions_for(&self, post: &RawPost) -> Vec<Mention> {
        let tickers = self.extract(&post.text);
        if tickers.is_empty() {
            return vec![Mention {
                source: post.source,
                raw_text: post.text.clone(),
                timestamp: post.created_at,
                extracted_ticker: None,
            }];
        }

        tickers
            .into_iter()
            .map(|t| Mention {
                source: post.source,
                raw_text: post.text.clone(),
                timestamp: post.created_at,
                extracted_ticker: Some(t),
            })
            .collect()
    }

    fn accepts(&self, token: &str, is_cashtag: bool) -> bool {
        if !is_valid_symbol(token) || self.excluded.contains(token) {
            return false;
        }
        if !is_cashtag && self.ambiguous_bare.contains(token) {
            return false;
        }
        self.dictionary.contains(token)
    }
}

/// 1-5 ASCII capitals with an optional one-letter class suffix (`BRK.B`).
pub fn is_valid_symbol(s: &str) -> bool {
    let (base, class) = match s.split_once('.') {
        Some((base, class)) => (base, Some(class)),
        None => (s, None),
    };
    let base_ok = (1..=5).contains(&base.len()) && base.bytes().all(|b| b.is_ascii_uppercase());
    let class_ok = class.map_or(true, |c| c.len() == 1 && c.bytes().all(|b| b.is_ascii_uppercase()));
    base_ok && class_ok
}
