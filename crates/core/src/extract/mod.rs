pub mod dictionary;
pub mod ticker;

pub use dictionary::SymbolDictionary;
pub use ticker::{is_valid_symbol, TickerExtractor};
