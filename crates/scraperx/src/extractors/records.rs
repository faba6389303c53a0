// ABOUTME: Record scanning: one record per scope match, one field per selector in a FieldMap.
// ABOUTME: Drops records whose fields are all null unless the process-wide emptiness filter is turned off.

use std::sync::atomic::{AtomicBool, Ordering};

use scraper::{Html, Selector};
use serde_json::{Map, Value};

use crate::error::{Result, ScrapeError};
use crate::extractors::compiled::get_or_compile;
use crate::extractors::directive::{compile, Directive};
use crate::extractors::filters::ActiveFilters;
use crate::extractors::select::extract;

/// One extracted record: field name -> value (`null` when nothing was found).
pub type Record = Map<String, Value>;

static SKIP_EMPTY_RECORDS: AtomicBool = AtomicBool::new(true);

/// Turns the process-wide emptiness filter on or off (on by default).
///
/// Scrapers built with an explicit `skip_empty_records` setting ignore this.
pub fn set_skip_empty_records(skip: bool) {
    SKIP_EMPTY_RECORDS.store(skip, Ordering::SeqCst);
}

/// Current value of the process-wide emptiness filter.
pub fn skip_empty_records() -> bool {
    SKIP_EMPTY_RECORDS.load(Ordering::SeqCst)
}

/// Output field name -> selector string.
///
/// Keys are unique; inserting an existing key replaces its selector in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, returning the selector it replaced.
    pub fn insert(&mut self, name: impl Into<String>, selector: impl Into<String>) -> Option<String> {
        let name = name.into();
        let selector = selector.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, selector)),
            None => {
                self.entries.push((name, selector));
                None
            }
        }
    }

    /// Builder-style variant of [`insert`](Self::insert).
    pub fn field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.insert(name, selector);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (name, selector) in iter {
            map.insert(name, selector);
        }
        map
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for FieldMap {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

/// A scope selector plus compiled field directives, reusable across pages.
#[derive(Debug, Clone)]
pub struct RecordPlan {
    scope: Option<Selector>,
    fields: Vec<(String, Directive)>,
}

impl RecordPlan {
    /// Compiles the scope and every field selector.
    ///
    /// A blank scope means "the document root is the only record".
    pub fn compile(scope: &str, fields: &FieldMap) -> Result<Self> {
        let scope = scope.trim();
        let scope = if scope.is_empty() {
            None
        } else {
            let selector = get_or_compile(scope).ok_or_else(|| {
                ScrapeError::malformed_selector(
                    scope,
                    "Scope",
                    Some(anyhow::anyhow!("invalid CSS selector")),
                )
            })?;
            Some(selector)
        };

        let fields = fields
            .iter()
            .map(|(name, selector)| Ok((name.to_string(), compile(selector)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { scope, fields })
    }

    /// Checks every field's filter against the active registries.
    pub fn validate(&self, filters: &ActiveFilters<'_>) -> Result<()> {
        self.fields
            .iter()
            .try_for_each(|(_, directive)| filters.validate(directive))
    }

    /// Builds one record per scope match, in document order.
    pub fn scan(&self, doc: &Html, filters: &ActiveFilters<'_>, skip_empty: bool) -> Vec<Record> {
        let contexts: Vec<_> = match &self.scope {
            Some(selector) => doc.select(selector).collect(),
            None => vec![doc.root_element()],
        };

        contexts
            .into_iter()
            .map(|el| {
                self.fields
                    .iter()
                    .map(|(name, directive)| (name.clone(), extract(el, directive, filters)))
                    .collect::<Record>()
            })
            .filter(|record| !(skip_empty && record.values().all(Value::is_null)))
            .collect()
    }
}
