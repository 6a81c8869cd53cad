//! Domain types for the VPR pipeline

pub mod bucket;
pub mod candle;

pub use bucket::Bucket;
pub use candle::{Candle, CandleSeries, SeriesError};
