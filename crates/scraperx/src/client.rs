// ABOUTME: The Scraper struct: single-value find, multi-field record extraction, and paginated crawls.
// ABOUTME: URL variants fetch first through the configured Fetcher; HTML variants work on strings in hand.

use std::sync::Arc;

use scraper::Html;
use serde_json::Value;

use crate::crawl::{Crawler, PageLimit};
use crate::error::Result;
use crate::extractors::directive::{compile, Directive};
use crate::extractors::filters::{global_filters, ActiveFilters, FilterRegistry};
use crate::extractors::records::{skip_empty_records, FieldMap, Record, RecordPlan};
use crate::extractors::select::extract_in_document;
use crate::options::{Options, ScraperBuilder};
use crate::resource::{Fetcher, HttpFetcher, PageText};

/// Extracts values and records from HTML, optionally across several pages.
#[derive(Debug)]
pub struct Scraper {
    opts: Options,
    fetcher: Arc<dyn Fetcher>,
}

impl Scraper {
    /// Create a new ScraperBuilder for configuring the scraper.
    pub fn builder() -> ScraperBuilder {
        ScraperBuilder::new()
    }

    /// Create a new Scraper with the given options.
    pub fn new(opts: Options) -> Self {
        let fetcher = opts
            .fetcher
            .clone()
            .unwrap_or_else(|| Arc::new(HttpFetcher::new(&opts)));
        Self { opts, fetcher }
    }

    /// Replace this scraper's instance filters.
    pub fn set_filters(&mut self, filters: FilterRegistry) {
        self.opts.filters = filters;
    }

    /// The instance filter registry.
    pub fn filters(&self) -> &FilterRegistry {
        &self.opts.filters
    }

    /// Snapshot of the filters this scraper consults, taken once per operation.
    fn active_filters(&self) -> ActiveFilters<'_> {
        let defaults = match self.opts.default_filters {
            Some(ref injected) => Arc::new(injected.clone()),
            None => global_filters(),
        };
        ActiveFilters::new(&self.opts.filters, defaults, self.opts.unknown_filters)
    }

    fn skip_empty(&self) -> bool {
        self.opts.skip_empty_records.unwrap_or_else(skip_empty_records)
    }

    /// Single-value extraction: evaluates `selector` against the whole document.
    pub fn find(&self, html: &str, selector: &str) -> Result<Value> {
        let directive = compile(selector)?;
        let filters = self.active_filters();
        filters.validate(&directive)?;
        Ok(find_in(html, &directive, &filters))
    }

    /// Multi-field extraction: one record per element matching `scope`.
    ///
    /// A blank `scope` treats the whole document as a single record.
    pub fn find_records(&self, html: &str, scope: &str, fields: &FieldMap) -> Result<Vec<Record>> {
        let plan = RecordPlan::compile(scope, fields)?;
        let filters = self.active_filters();
        plan.validate(&filters)?;
        Ok(self.records_in(html, &plan, &filters))
    }

    /// Paginated extraction starting from an HTML string.
    ///
    /// Relative next links are resolved against the builder's `base_url`; without
    /// one, a relative link fails the crawl with `InvalidUrl`.
    pub async fn crawl(
        &self,
        html: &str,
        link_selector: &str,
        scope: &str,
        fields: &FieldMap,
        max_pages: impl Into<PageLimit>,
    ) -> Result<Vec<Record>> {
        let job = self.prepare_crawl(link_selector, scope, fields)?;
        let start = PageText {
            url: self.opts.base_url.clone(),
            body: html.to_string(),
        };
        self.run_crawl(job, start, max_pages.into()).await
    }

    /// Single-value extraction from a fetched page.
    ///
    /// The selector is compiled and validated before the request goes out.
    pub async fn find_url(&self, url: &str, selector: &str) -> Result<Value> {
        let directive = compile(selector)?;
        let filters = self.active_filters();
        filters.validate(&directive)?;
        let html = self.fetch(url).await?;
        Ok(find_in(&html, &directive, &filters))
    }

    /// Multi-field extraction from a fetched page.
    pub async fn find_records_url(
        &self,
        url: &str,
        scope: &str,
        fields: &FieldMap,
    ) -> Result<Vec<Record>> {
        let plan = RecordPlan::compile(scope, fields)?;
        let filters = self.active_filters();
        plan.validate(&filters)?;
        let html = self.fetch(url).await?;
        Ok(self.records_in(&html, &plan, &filters))
    }

    /// Paginated extraction starting from a fetched page.
    ///
    /// Relative links on the first page resolve against the URL the fetch ended
    /// on, after redirects.
    pub async fn crawl_url(
        &self,
        url: &str,
        link_selector: &str,
        scope: &str,
        fields: &FieldMap,
        max_pages: impl Into<PageLimit>,
    ) -> Result<Vec<Record>> {
        let job = self.prepare_crawl(link_selector, scope, fields)?;
        let start = self.fetcher.fetch_page(url).await?;
        self.run_crawl(job, start, max_pages.into()).await
    }

    /// Fetch a page through the configured fetcher.
    pub async fn fetch(&self, url: &str) -> Result<String> {
        self.fetcher.fetch(url).await
    }

    fn records_in(&self, html: &str, plan: &RecordPlan, filters: &ActiveFilters<'_>) -> Vec<Record> {
        let doc = Html::parse_document(html);
        plan.scan(&doc, filters, self.skip_empty())
    }

    /// Compiles and validates everything a crawl needs before any page is touched.
    fn prepare_crawl(
        &self,
        link_selector: &str,
        scope: &str,
        fields: &FieldMap,
    ) -> Result<CrawlJob<'_>> {
        let link = compile(link_selector)?;
        let plan = RecordPlan::compile(scope, fields)?;
        let filters = self.active_filters();
        filters.validate(&link)?;
        plan.validate(&filters)?;
        Ok(CrawlJob {
            link,
            plan,
            filters,
        })
    }

    async fn run_crawl(&self, job: CrawlJob<'_>, start: PageText, limit: PageLimit) -> Result<Vec<Record>> {
        tracing::debug!(
            link = %job.link,
            %limit,
            link_source = %self.opts.link_source,
            "starting crawl"
        );

        let crawler = Crawler {
            fetcher: self.fetcher.as_ref(),
            filters: job.filters,
            skip_empty: self.skip_empty(),
            link_source: self.opts.link_source,
        };
        crawler.run(start, &job.link, &job.plan, limit).await
    }
}

/// A compiled, validated crawl waiting for its first page.
struct CrawlJob<'a> {
    link: Directive,
    plan: RecordPlan,
    filters: ActiveFilters<'a>,
}

fn find_in(html: &str, directive: &Directive, filters: &ActiveFilters<'_>) -> Value {
    let doc = Html::parse_document(html);
    extract_in_document(&doc, directive, filters)
}

impl Default for Scraper {
    fn default() -> Self {
        Self::new(Options::default())
    }
}

/// Single-value extraction with a default scraper.
pub fn find(html: &str, selector: &str) -> Result<Value> {
    Scraper::default().find(html, selector)
}

/// Multi-field extraction with a default scraper.
pub fn find_records(html: &str, scope: &str, fields: &FieldMap) -> Result<Vec<Record>> {
    Scraper::default().find_records(html, scope, fields)
}
