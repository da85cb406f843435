// Yield-prediction domain: features, framing, normalisation, metrics
pub mod ml;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
