//! Session relay: shuttles content between two paired users

pub mod filter;
pub mod shuttle;

pub use filter::WordFilter;
pub use shuttle::SessionRelay;
