use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::Product;
use crate::utils::format_age;

/// Consider cache stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

const PRODUCTS_CACHE: &str = "products";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        format_age(self.age_minutes())
    }

    pub fn is_stale(&self) -> bool {
        self.age_minutes() > CACHE_STALE_MINUTES
    }
}

pub struct CacheManager {
    cache_dir: PathBuf,
}

impl CacheManager {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.json", name))
    }

    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<CachedData<T>>> {
        let path = self.cache_path(name);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", name))?;

        let cached: CachedData<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cache file: {}", name))?;

        debug!(name, age_minutes = cached.age_minutes(), "Cache hit");
        Ok(Some(cached))
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let cached = CachedData::new(data);
        let contents = serde_json::to_string_pretty(&cached)?;
        std::fs::write(self.cache_path(name), contents)
            .with_context(|| format!("Failed to write cache file: {}", name))?;
        Ok(())
    }

    pub fn load_products(&self) -> Result<Option<CachedData<Vec<Product>>>> {
        self.load(PRODUCTS_CACHE)
    }

    pub fn save_products(&self, products: &[Product]) -> Result<()> {
        self.save(PRODUCTS_CACHE, &products)
    }

    /// Remove every cached file.
    pub fn clear(&self) -> Result<()> {
        let path = self.cache_path(PRODUCTS_CACHE);
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}
