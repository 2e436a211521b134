mod image_cache_port;

pub use image_cache_port::{
    CacheError, CacheResult, EntryStorePort, FetchedResource, ResourceFetcherPort,
};

#[cfg(test)]
pub use image_cache_port::MockResourceFetcherPort;
