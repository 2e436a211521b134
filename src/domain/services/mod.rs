//! Pure domain services.

mod eviction;

pub use eviction::{EvictionPlan, EvictionPolicy};
