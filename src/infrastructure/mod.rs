pub mod feature_sources;
pub mod logging;
pub mod synthetic;

pub use feature_sources::{CsvFeatureSource, InMemoryFeatureSource};
