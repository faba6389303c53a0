// ABOUTME: Main library entry point for scraperx, a selector-driven HTML scraper.
// ABOUTME: Re-exports the public API: Scraper, ScraperBuilder, FieldMap, Record, filters and errors.

//! scraperx - extract values and records from HTML with compact selector strings.
//!
//! A selector is `css[@mode][|filter[:arg,...]]`. The mode is `text` (default),
//! `html`, or an attribute name. `&` (or `current`) addresses the element being
//! scanned instead of a descendant.
//!
//! # Example
//!
//! ```no_run
//! use scraperx::{FieldMap, Scraper, ScrapeError};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ScrapeError> {
//!     let scraper = Scraper::builder().build();
//!     let fields = FieldMap::new()
//!         .field("title", "a.title")
//!         .field("link", "a.title@href");
//!     let records = scraper
//!         .crawl_url("https://example.com/news", "a.next@href", ".story", &fields, 3)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&records).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod crawl;
pub mod error;
pub mod extractors;
pub mod options;
pub mod resource;

pub use crate::client::{find, find_records, Scraper};
pub use crate::crawl::{PageLimit, UNBOUNDED};
pub use crate::error::{ErrorCode, Result, ScrapeError};
pub use crate::extractors::builtin::builtin_filters;
pub use crate::extractors::directive::{compile, Directive, Mode, Target};
pub use crate::extractors::filters::{global_filters, set_global_filters, Filter, FilterRegistry};
pub use crate::extractors::records::{set_skip_empty_records, skip_empty_records, FieldMap, Record};
pub use crate::options::{LinkSource, Options, ScraperBuilder, UnknownFilterPolicy};
pub use crate::resource::{Fetcher, HttpFetcher, PageText};
