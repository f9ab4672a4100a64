//! Fitted preprocessing steps shared by training and scoring

pub mod encoder;
pub mod scaler;

pub use encoder::{CategoryEncoder, EncoderMap, TYPE_ENCODER};
pub use scaler::StandardScaler;
