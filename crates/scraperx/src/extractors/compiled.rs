// ABOUTME: Pre-compiled scope selector cache for repeated record scans.
// ABOUTME: Avoids re-parsing the same scope CSS on every page of a crawl.

//! Scope selector caching.
//!
//! Directives are compiled fresh for every call, but the scope selector of a
//! record scan is plain CSS and is reused across pages and calls, so it is
//! compiled once and cached here.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use scraper::Selector;

/// Most scope selectors kept at once. A full cache is cleared before the next insert.
pub const MAX_CACHED_SELECTORS: usize = 256;

/// Thread-safe cache of valid compiled CSS selectors.
static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Selector>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Gets or compiles a CSS selector, caching it when valid.
///
/// Returns `Some(Selector)` if the selector is valid, `None` if invalid.
/// Invalid selectors are never cached.
pub fn get_or_compile(css: &str) -> Option<Selector> {
    // Fast path: check read lock for cached value
    {
        let cache = SELECTOR_CACHE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = cache.get(css) {
            return Some(cached.clone());
        }
    }

    let compiled = Selector::parse(css).ok()?;
    let mut cache = SELECTOR_CACHE.write().unwrap_or_else(|e| e.into_inner());
    if cache.len() >= MAX_CACHED_SELECTORS && !cache.contains_key(css) {
        cache.clear();
    }
    cache.insert(css.to_string(), compiled.clone());
    Some(compiled)
}
