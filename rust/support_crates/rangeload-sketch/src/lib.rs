pub mod config;
pub mod quantile_sketch;

#[cfg(test)]
mod tests;

pub use config::QuantileSketchConfig;
pub use quantile_sketch::QuantileSketch;
