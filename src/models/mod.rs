//! Data models for OSDU records

mod record;
mod search;

pub use record::*;
pub use search::*;
