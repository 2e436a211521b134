//! Application layer wiring the image pipeline.

/// Application services.
pub mod services;

pub use services::ImagePipeline;
