pub mod mention;
pub mod quote;
pub mod rank;
pub mod snapshot;
