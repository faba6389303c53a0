// ABOUTME: Named filter registries applied to extracted values, with instance and global scopes.
// ABOUTME: The global registry is process-wide and replaced wholesale; lookups check the instance scope first.

//! Filter registries.
//!
//! A filter is a transform `(value, args) -> value` registered under a name. A
//! selector such as `price|currency:USD` calls the `currency` filter with the
//! extracted value and `["USD"]`.
//!
//! Two scopes exist:
//! - the instance registry set on one [`Scraper`](crate::Scraper);
//! - the default registry, which is either injected when the scraper is built or,
//!   failing that, the process-wide registry set with [`set_global_filters`].
//!
//! The global registry is last-writer-wins. Concurrent crawls that each call
//! [`set_global_filters`] race on which mapping the other observes; each scrape
//! operation takes one snapshot when it starts and uses it throughout.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{Result, ScrapeError};
use crate::extractors::directive::{Directive, FilterCall};
use crate::options::UnknownFilterPolicy;

/// A value transform. Receives the extracted value and the selector's arguments.
pub type Filter = Arc<dyn Fn(Value, &[String]) -> Value + Send + Sync>;

/// A name -> filter table.
#[derive(Clone, Default)]
pub struct FilterRegistry {
    map: HashMap<String, Filter>,
}

impl FilterRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a filter, replacing any previous filter with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, filter: F) -> &mut Self
    where
        F: Fn(Value, &[String]) -> Value + Send + Sync + 'static,
    {
        self.map.insert(name.into(), Arc::new(filter));
        self
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, filter: F) -> Self
    where
        F: Fn(Value, &[String]) -> Value + Send + Sync + 'static,
    {
        self.register(name, filter);
        self
    }

    /// Looks up a filter by name.
    pub fn get(&self, name: &str) -> Option<&Filter> {
        self.map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.map.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered filters.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no filters are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRegistry")
            .field("filters", &self.names())
            .finish()
    }
}

impl FromIterator<(String, Filter)> for FilterRegistry {
    fn from_iter<I: IntoIterator<Item = (String, Filter)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

static GLOBAL_FILTERS: Lazy<RwLock<Arc<FilterRegistry>>> =
    Lazy::new(|| RwLock::new(Arc::new(FilterRegistry::new())));

/// Replaces the process-wide filter registry. The previous mapping is dropped, not merged.
pub fn set_global_filters(registry: FilterRegistry) {
    let mut global = GLOBAL_FILTERS.write().unwrap_or_else(|e| e.into_inner());
    *global = Arc::new(registry);
}

/// Snapshot of the current process-wide filter registry.
pub fn global_filters() -> Arc<FilterRegistry> {
    GLOBAL_FILTERS
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// The filters visible to one scrape operation: instance scope, then defaults.
#[derive(Debug, Clone)]
pub struct ActiveFilters<'a> {
    instance: &'a FilterRegistry,
    defaults: Arc<FilterRegistry>,
    policy: UnknownFilterPolicy,
}

impl<'a> ActiveFilters<'a> {
    pub fn new(
        instance: &'a FilterRegistry,
        defaults: Arc<FilterRegistry>,
        policy: UnknownFilterPolicy,
    ) -> Self {
        Self {
            instance,
            defaults,
            policy,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Filter> {
        self.instance.get(name).or_else(|| self.defaults.get(name))
    }

    /// Checks that the directive's filter, if any, resolves.
    ///
    /// Always passes under [`UnknownFilterPolicy::PassThrough`].
    pub fn validate(&self, directive: &Directive) -> Result<()> {
        let Some(ref call) = directive.filter else {
            return Ok(());
        };
        if self.policy == UnknownFilterPolicy::Error && self.lookup(&call.name).is_none() {
            return Err(ScrapeError::unknown_filter(
                directive.to_string(),
                "Validate",
                Some(anyhow::anyhow!("no filter named '{}'", call.name)),
            ));
        }
        Ok(())
    }

    /// Applies a filter call to a value. Unknown names return the value unchanged.
    pub fn apply(&self, call: &FilterCall, value: Value) -> Value {
        match self.lookup(&call.name) {
            Some(filter) => filter(value, &call.args),
            None => {
                tracing::warn!(filter = %call.name, "unknown filter, passing value through");
                value
            }
        }
    }
}
