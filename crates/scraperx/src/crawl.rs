// ABOUTME: Pagination crawler: fetch -> scan -> resolve next link, repeated until no link or the page limit.
// ABOUTME: Pages are strictly sequential; a fetch failure aborts the crawl and drops partial results.

//! Pagination crawling.
//!
//! The crawl is a small state machine:
//!
//! ```text
//! Fetched(p) -> Scanned(p) -> LinkResolved(p) -> Fetched(p + 1) ...
//!                                          \-> Done
//! ```
//!
//! `LinkResolved -> Done` happens when the next link is missing/empty, or when the
//! page limit is bounded and `p >= limit`.
//!
//! With [`LinkSource::FirstPage`] (the default) the link selector is always
//! evaluated against the first page. That page never changes, so its link is
//! computed once, while the first page is scanned, and reused on every later cycle.

use std::fmt;

use scraper::Html;
use serde_json::Value;
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::extractors::directive::Directive;
use crate::extractors::filters::ActiveFilters;
use crate::extractors::records::{Record, RecordPlan};
use crate::extractors::select::extract_in_document;
use crate::options::LinkSource;
use crate::resource::{Fetcher, PageText};

/// Page limit value meaning "follow links until they run out".
pub const UNBOUNDED: i64 = -1;

/// How many pages a crawl may visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PageLimit {
    /// Bounded only by link exhaustion. May never end if the site paginates forever.
    #[default]
    Unbounded,
    /// At most this many pages (a value below 1 behaves as 1).
    Pages(usize),
}

impl PageLimit {
    /// Whether a crawl that has scanned `page` pages must stop.
    pub fn reached(&self, page: usize) -> bool {
        match self {
            PageLimit::Unbounded => false,
            PageLimit::Pages(max) => page >= *max,
        }
    }
}

impl From<i64> for PageLimit {
    /// `-1` is unbounded; every other value is a page count, with anything below 1
    /// stopping after the first page.
    fn from(n: i64) -> Self {
        match n {
            UNBOUNDED => PageLimit::Unbounded,
            n if n < 1 => PageLimit::Pages(1),
            n => PageLimit::Pages(usize::try_from(n).unwrap_or(usize::MAX)),
        }
    }
}

impl From<i32> for PageLimit {
    fn from(n: i32) -> Self {
        PageLimit::from(i64::from(n))
    }
}

impl fmt::Display for PageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageLimit::Unbounded => write!(f, "unbounded"),
            PageLimit::Pages(n) => write!(f, "{}", n),
        }
    }
}

/// A next-page link plus the URL of the page it was read from.
#[derive(Debug, Clone)]
struct NextLink {
    href: String,
    base: Option<Url>,
}

/// Everything one crawl call owns.
#[derive(Debug)]
struct CrawlState {
    records: Vec<Record>,
    page: usize,
    first_link: Option<NextLink>,
}

enum Step {
    Fetched(PageText),
    Scanned(Option<NextLink>),
    LinkResolved(Option<NextLink>),
    Done,
}

/// Runs one crawl. Borrowed from the scraper for the duration of the call.
pub struct Crawler<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub filters: ActiveFilters<'a>,
    pub skip_empty: bool,
    pub link_source: LinkSource,
}

impl Crawler<'_> {
    /// Crawls from `start`, following `link` until it runs out or `limit` is hit.
    pub async fn run(
        &self,
        start: PageText,
        link: &Directive,
        plan: &RecordPlan,
        limit: PageLimit,
    ) -> Result<Vec<Record>> {
        let mut state = CrawlState {
            records: Vec::new(),
            page: 1,
            first_link: None,
        };
        let mut step = Step::Fetched(start);

        loop {
            step = match step {
                Step::Fetched(page) => {
                    let (records, link_here) = self.scan_page(&page, link, plan, state.page);
                    tracing::debug!(
                        page = state.page,
                        url = page.url.as_ref().map(Url::as_str).unwrap_or("<html>"),
                        records = records.len(),
                        "scanned page"
                    );
                    state.records.extend(records);
                    Step::Scanned(link_here)
                }
                Step::Scanned(link_here) => {
                    let next = match self.link_source {
                        LinkSource::FirstPage => {
                            if state.page == 1 {
                                state.first_link = link_here;
                            }
                            state.first_link.clone()
                        }
                        LinkSource::CurrentPage => link_here,
                    };
                    Step::LinkResolved(next)
                }
                Step::LinkResolved(None) => {
                    tracing::debug!(page = state.page, "no next link, crawl finished");
                    Step::Done
                }
                Step::LinkResolved(Some(_)) if limit.reached(state.page) => {
                    tracing::debug!(page = state.page, %limit, "page limit reached");
                    Step::Done
                }
                Step::LinkResolved(Some(next)) => {
                    let url = resolve_link(&next)?;
                    tracing::trace!(page = state.page + 1, url = %url, "following next link");
                    let page = self.fetcher.fetch_page(url.as_str()).await?;
                    state.page += 1;
                    Step::Fetched(page)
                }
                Step::Done => return Ok(state.records),
            };
        }
    }

    /// Parses one page, scans its records and reads its next link when needed.
    ///
    /// The parsed document never outlives this call.
    fn scan_page(
        &self,
        page: &PageText,
        link: &Directive,
        plan: &RecordPlan,
        page_no: usize,
    ) -> (Vec<Record>, Option<NextLink>) {
        let doc = Html::parse_document(&page.body);
        let records = plan.scan(&doc, &self.filters, self.skip_empty);

        let wants_link = page_no == 1 || self.link_source == LinkSource::CurrentPage;
        let next = if wants_link {
            link_href(extract_in_document(&doc, link, &self.filters)).map(|href| NextLink {
                href,
                base: page.url.clone(),
            })
        } else {
            None
        };
        (records, next)
    }
}

/// Turns an extracted link value into an href. Null, empty and non-string values end the crawl.
fn link_href(value: Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::String(_) | Value::Null => None,
        other => {
            tracing::warn!(value = %other, "next link is not a string, stopping");
            None
        }
    }
}

/// Resolves a possibly relative href against the page it was read from.
fn resolve_link(next: &NextLink) -> Result<Url> {
    match Url::parse(&next.href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => match next.base {
            Some(ref base) => base.join(&next.href).map_err(|e| {
                ScrapeError::invalid_url(
                    next.href.as_str(),
                    "Crawl",
                    Some(anyhow::anyhow!("cannot resolve against {}: {}", base, e)),
                )
            }),
            None => Err(ScrapeError::invalid_url(
                next.href.as_str(),
                "Crawl",
                Some(anyhow::anyhow!("relative link and no base URL")),
            )),
        },
        Err(e) => Err(ScrapeError::invalid_url(
            next.href.as_str(),
            "Crawl",
            Some(anyhow::anyhow!("invalid URL: {}", e)),
        )),
    }
}
