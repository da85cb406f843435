//! Recurrent network used for yield forecasting.
//!
//! Forward and backward passes are written out by hand on `ndarray`
//! matrices; every layer operates on a whole batch at once.

pub mod dense;
pub mod lstm;
pub mod model;

pub use model::{ModelVariant, NetworkConfig, SequenceModel, Tape, mse_loss};
