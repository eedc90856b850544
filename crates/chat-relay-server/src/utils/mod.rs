pub mod error;
pub mod limiters;
pub mod token_estimator;

pub use token_estimator::{CharRatioEstimator, TokenEstimator};
