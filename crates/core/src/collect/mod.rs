pub mod collector;
pub mod demo;
pub mod reddit;
pub mod source;
pub mod stocktwits;
pub mod twitter;

pub use collector::{Collection, MentionCollector};
pub use source::MentionSource;
