use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;

// Widely discussed US listings. Override with SYMBOLS_PATH for a full exchange list.
const BUILTIN_SYMBOLS: &[(&str, &str)] = &[
    ("AAPL", "Apple Inc."),
    ("ABNB", "Airbnb, Inc."),
    ("ADBE", "Adobe Inc."),
    ("AMC", "AMC Entertainment Holdings, Inc."),
    ("AMD", "Advanced Micro Devices, Inc."),
    ("AMZN", "Amazon.com, Inc."),
    ("ARKK", "ARK Innovation ETF"),
    ("ARM", "Arm Holdings plc"),
    ("AVGO", "Broadcom Inc."),
    ("BA", "The Boeing Company"),
    ("BABA", "Alibaba Group Holding Limited"),
    ("BAC", "Bank of America Corporation"),
    ("BRK.B", "Berkshire Hathaway Inc."),
    ("COIN", "Coinbase Global, Inc."),
    ("COST", "Costco Wholesale Corporation"),
    ("CRM", "Salesforce, Inc."),
    ("CRWD", "CrowdStrike Holdings, Inc."),
    ("CVNA", "Carvana Co."),
    ("CVX", "Chevron Corporation"),
    ("DIA", "SPDR Dow Jones Industrial Average ETF"),
    ("DIS", "The Walt Disney Company"),
    ("DKNG", "DraftKings Inc."),
    ("F", "Ford Motor Company"),
    ("GLD", "SPDR Gold Shares"),
    ("GM", "General Motors Company"),
    ("GME", "GameStop Corp."),
    ("GOOG", "Alphabet Inc. Class C"),
    ("GOOGL", "Alphabet Inc. Class A"),
    ("HD", "The Home Depot, Inc."),
    ("HOOD", "Robinhood Markets, Inc."),
    ("INTC", "Intel Corporation"),
    ("IWM", "iShares Russell 2000 ETF"),
    ("JNJ", "Johnson & Johnson"),
    ("JPM", "JPMorgan Chase & Co."),
    ("KO", "The Coca-Cola Company"),
    ("LCID", "Lucid Group, Inc."),
    ("LLY", "Eli Lilly and Company"),
    ("MA", "Mastercard Incorporated"),
    ("MARA", "MARA Holdings, Inc."),
    ("MCD", "McDonald's Corporation"),
    ("META", "Meta Platforms, Inc."),
    ("MRNA", "Moderna, Inc."),
    ("MSFT", "Microsoft Corporation"),
    ("MSTR", "MicroStrategy Incorporated"),
    ("MU", "Micron Technology, Inc."),
    ("NET", "Cloudflare, Inc."),
    ("NFLX", "Netflix, Inc."),
    ("NIO", "NIO Inc."),
    ("NKE", "NIKE, Inc."),
    ("NVDA", "NVIDIA Corporation"),
    ("ORCL", "Oracle Corporation"),
    ("PANW", "Palo Alto Networks, Inc."),
    ("PEP", "PepsiCo, Inc."),
    ("PFE", "Pfizer Inc."),
    ("PLTR", "Palantir Technologies Inc."),
    ("PYPL", "PayPal Holdings, Inc."),
    ("QCOM", "QUALCOMM Incorporated"),
    ("QQQ", "Invesco QQQ Trust"),
    ("RBLX", "Roblox Corporation"),
    ("RIOT", "Riot Platforms, Inc."),
    ("RIVN", "Rivian Automotive, Inc."),
    ("ROKU", "Roku, Inc."),
    ("SBUX", "Starbucks Corporation"),
    ("SHOP", "Shopify Inc."),
    ("SLV", "iShares Silver Trust"),
    ("SMCI", "Super Micro Computer, Inc."),
    ("SNAP", "Snap Inc."),
    ("SNOW", "Snowflake Inc."),
    ("SOFI", "SoFi Technologies, Inc."),
    ("SPY", "SPDR S&P 500 ETF Trust"),
    ("SQQQ", "ProShares UltraPro Short QQQ"),
    ("T", "AT&T Inc."),
    ("TGT", "Target Corporation"),
    ("TLT", "iShares 20+ Year Treasury Bond ETF"),
    ("TQQQ", "ProShares UltraPro QQQ"),
    ("TSLA", "Tesla, Inc."),
    ("TSM", "Taiwan Semiconductor Manufacturing Company"),
    ("UBER", "Uber Technologies, Inc."),
    ("UNH", "UnitedHealth Group Incorporated"),
    ("V", "Visa Inc."),
    ("VOO", "Vanguard S&P 500 ETF"),
    ("VTI", "Vanguard Total Stock Market ETF"),
    ("VZ", "Verizon Communications Inc."),
    ("WMT", "Walmart Inc."),
    ("XOM", "Exxon Mobil Corporation"),
];

/// Known tradable symbols. Tokens not in the dictionary are never reported as tickers.
#[derive(Debug, Clone, Default)]
pub struct SymbolDictionary {
    symbols: HashMap<String, Option<String>>,
}

impl SymbolDictionary {
    pub fn builtin() -> Self {
        let symbols = BUILTIN_SYMBOLS
            .iter()
            .map(|(sym, name)| (sym.to_string(), Some(name.to_string())))
            .collect();
        Self { symbols }
    }

    /// Parses `SYMBOL[,name]` lines. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let mut symbols = HashMap::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (sym, name) = match line.split_once(',') {
                Some((sym, name)) => (sym.trim(), Some(name.trim().to_string())),
                None => (line, None),
            };
            let sym = sym.to_ascii_uppercase();
            anyhow::ensure!(
                super::ticker::is_valid_symbol(&sym),
                "invalid symbol {sym:?} on line {}",
                idx + 1
            );
            symbols.insert(sym, name.filter(|n| !n.is_empty()));
        }

        anyhow::ensure!(!symbols.is_empty(), "symbol dictionary is empty");
        Ok(Self { symbols })
    }

    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read symbol dictionary {}", path.display()))?;
        Self::parse(&text)
            .with_context(|| format!("failed to parse symbol dictionary {}", path.display()))
    }

    /// Loads `SYMBOLS_PATH` when set, otherwise the built-in list.
    pub async fn from_env() -> anyhow::Result<Self> {
        match std::env::var("SYMBOLS_PATH") {
            Ok(path) if !path.trim().is_empty() => Self::load(Path::new(path.trim())).await,
            _ => Ok(Self::builtin()),
        }
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    pub fn name(&self, symbol: &str) -> Option<&str> {
        self.symbols.get(symbol).and_then(|n| n.as_deref())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
