//! [`FeatureSource`](crate::domain::ports::FeatureSource) adapters.

pub mod csv_source;
pub mod memory_source;

pub use csv_source::{CsvFeatureSource, read_observations, write_observations};
pub use memory_source::InMemoryFeatureSource;
