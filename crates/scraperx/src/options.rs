// ABOUTME: Configuration options for scraperx including policies, Options, and ScraperBuilder.
// ABOUTME: ScraperBuilder provides a fluent API for constructing Scraper instances with custom settings.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::client::Scraper;
use crate::extractors::filters::FilterRegistry;
use crate::resource::Fetcher;

/// What happens when a selector names a filter no registry knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownFilterPolicy {
    /// The extracted value is returned unchanged (a warning is logged).
    #[default]
    PassThrough,
    /// The operation fails with `UnknownFilter` before any page is scanned.
    Error,
}

/// Which document a crawl reads its next-page link from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkSource {
    /// Re-resolve the link selector against the first page on every cycle.
    ///
    /// The first page never changes, so after page 2 the crawl keeps fetching the
    /// same URL until the page limit stops it. With an unbounded limit and a first
    /// page that has a next link, the crawl never ends.
    ///
    /// The link is evaluated once, while the first page is scanned, and reused on
    /// every later cycle. A filter on the link selector therefore runs once per
    /// crawl, which only matters for filters that keep their own state.
    #[default]
    FirstPage,
    /// Resolve the link selector against the page that was just scanned.
    CurrentPage,
}

impl fmt::Display for LinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkSource::FirstPage => "first-page",
            LinkSource::CurrentPage => "current-page",
        };
        write!(f, "{}", s)
    }
}

/// Configuration options for a scraper.
#[derive(Debug, Clone)]
pub struct Options {
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub http_client: Option<reqwest::Client>,
    pub headers: HashMap<String, String>,
    pub fetcher: Option<Arc<dyn Fetcher>>,
    pub filters: FilterRegistry,
    pub default_filters: Option<FilterRegistry>,
    pub skip_empty_records: Option<bool>,
    pub unknown_filters: UnknownFilterPolicy,
    pub link_source: LinkSource,
    pub base_url: Option<Url>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "scraperx/0.1".to_string(),
            allow_private_networks: false,
            http_client: None,
            headers: HashMap::new(),
            fetcher: None,
            filters: FilterRegistry::new(),
            default_filters: None,
            skip_empty_records: None,
            unknown_filters: UnknownFilterPolicy::PassThrough,
            link_source: LinkSource::FirstPage,
            base_url: None,
        }
    }
}

/// Builder for constructing Scraper instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ScraperBuilder {
    opts: Options,
}

impl ScraperBuilder {
    /// Create a new ScraperBuilder with default options.
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    /// Set the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Use a custom HTTP client.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Replace the HTTP fetcher entirely. HTTP settings above are then ignored.
    pub fn fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.opts.fetcher = Some(Arc::new(fetcher));
        self
    }

    /// Set the instance filter registry.
    pub fn filters(mut self, filters: FilterRegistry) -> Self {
        self.opts.filters = filters;
        self
    }

    /// Use this registry instead of the process-wide one as the fallback scope.
    pub fn default_filters(mut self, filters: FilterRegistry) -> Self {
        self.opts.default_filters = Some(filters);
        self
    }

    /// Override the process-wide emptiness filter for this scraper.
    pub fn skip_empty_records(mut self, skip: bool) -> Self {
        self.opts.skip_empty_records = Some(skip);
        self
    }

    /// Set the unknown filter policy.
    pub fn unknown_filters(mut self, policy: UnknownFilterPolicy) -> Self {
        self.opts.unknown_filters = policy;
        self
    }

    /// Set where crawls read the next-page link from.
    pub fn link_source(mut self, source: LinkSource) -> Self {
        self.opts.link_source = source;
        self
    }

    /// Base URL for resolving relative links when crawling from an HTML string.
    pub fn base_url(mut self, url: Url) -> Self {
        self.opts.base_url = Some(url);
        self
    }

    /// Build the Scraper with the configured options.
    pub fn build(self) -> Scraper {
        Scraper::new(self.opts)
    }
}

impl Default for ScraperBuilder {
    fn default() -> Self {
        Self::new()
    }
}
