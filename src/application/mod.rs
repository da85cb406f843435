// Sequence model, training and serving
pub mod ml;
