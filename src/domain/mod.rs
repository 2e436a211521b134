//! Domain layer with core entities, port definitions and pure services.

/// Entity definitions.
pub mod entities;
/// Port definitions.
pub mod ports;
/// Pure domain services.
pub mod services;

pub use entities::{CachedEntry, ImageOptions, ResourceLocator};
pub use ports::{CacheError, CacheResult, EntryStorePort, ResourceFetcherPort};
