pub mod aggregator;
pub mod comparison;
pub mod fields;
pub mod primary;

pub use aggregator::{Aggregator, AggregatorHandle};
