//! Local caching module for offline catalog access.
//!
//! This module provides the `CacheManager` for storing the last product
//! list fetched from the server. Data is cached in JSON format and considered
//! stale after 60 minutes.

pub mod manager;

pub use manager::{CacheManager, CachedData};
