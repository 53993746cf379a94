use std::{env, time::Duration};

use crate::errors::{DbError, Result};

// Bytes per page, including the page trailer
pub const DEFAULT_PAGE_SIZE: usize = 4096;
// Number of pages cached when no capacity is given
pub const DEFAULT_PAGES: usize = 50;

// Slot offsets are stored as u16
pub const MIN_PAGE_SIZE: usize = 64;
pub const MAX_PAGE_SIZE: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// Least recently used, ties broken by insertion order.
    Lru,
    /// Backward k-distance, falling back to LRU for pages with fewer than k accesses.
    LruK(usize),
}

/// Construction-time settings of a buffer pool.
///
/// Page size and capacity are fixed for the lifetime of the pool. Changing the
/// page size is only meant for tests, and only before any page is cached.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_pages: usize,
    pub page_size: usize,
    pub replacement: ReplacementPolicy,
    // None relies on waits-for cycle detection alone
    pub lock_wait_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            num_pages: DEFAULT_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            replacement: ReplacementPolicy::Lru,
            lock_wait_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn new(num_pages: usize) -> Self {
        Self {
            num_pages,
            ..Self::default()
        }
    }

    /// Defaults overlaid with `GEODE_POOL_PAGES`, `GEODE_PAGE_SIZE`,
    /// `GEODE_LRU_K` and `GEODE_LOCK_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    // Same overlay as `from_env`, reading variables through `lookup`
    fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(pages) = parse_var(&lookup, "GEODE_POOL_PAGES")? {
            config.num_pages = pages;
        }
        if let Some(size) = parse_var(&lookup, "GEODE_PAGE_SIZE")? {
            config.page_size = size;
        }
        if let Some(k) = parse_var(&lookup, "GEODE_LRU_K")? {
            config.replacement = if k <= 1 {
                ReplacementPolicy::Lru
            } else {
                ReplacementPolicy::LruK(k)
            };
        }
        if let Some(ms) = parse_var(&lookup, "GEODE_LOCK_TIMEOUT_MS")? {
            config.lock_wait_timeout = Some(Duration::from_millis(ms as u64));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_num_pages(mut self, num_pages: usize) -> Self {
        self.num_pages = num_pages;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_replacement(mut self, replacement: ReplacementPolicy) -> Self {
        self.replacement = replacement;
        self
    }

    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_pages == 0 {
            return Err(DbError::InvalidConfig(String::from(
                "pool capacity must be at least one page",
            )));
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(DbError::InvalidConfig(format!(
                "page size {} outside {}..={}",
                self.page_size, MIN_PAGE_SIZE, MAX_PAGE_SIZE
            )));
        }

        if let ReplacementPolicy::LruK(0) = self.replacement {
            return Err(DbError::InvalidConfig(String::from("LRU-K needs k >= 1")));
        }

        Ok(())
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<usize>> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|err| DbError::InvalidConfig(format!("{}={:?}: {}", key, value, err))),
        None => Ok(None),
    }
}
