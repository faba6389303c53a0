// ABOUTME: CLI binary for scraperx.
// ABOUTME: Extracts a value, records, or a paginated crawl from a URL, an HTML file, or stdin.

use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use scraperx::{
    builtin_filters, FieldMap, LinkSource, PageLimit, Scraper, UnknownFilterPolicy, UNBOUNDED,
};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "scraperx")]
#[command(about = "Extract values and records from HTML using selector strings")]
struct Args {
    /// Scope selector for records; with no --field, the selector to extract
    #[arg(short = 's', long = "scope", default_value = "")]
    scope: String,

    /// Record field as name=selector (repeatable)
    #[arg(short = 'f', long = "field", value_parser = parse_field)]
    fields: Vec<(String, String)>,

    /// Next-page link selector; turns the run into a crawl
    #[arg(short = 'n', long = "next")]
    next: Option<String>,

    /// Maximum pages to crawl (-1 for no limit)
    #[arg(short = 'm', long = "max-pages", default_value_t = UNBOUNDED, allow_negative_numbers = true)]
    max_pages: i64,

    /// Base URL for relative links when SOURCE is a file or stdin
    #[arg(long = "base-url")]
    base_url: Option<Url>,

    /// Keep records whose fields are all null
    #[arg(long = "keep-empty")]
    keep_empty: bool,

    /// Fail when a selector names an unknown filter
    #[arg(long = "strict-filters")]
    strict_filters: bool,

    /// Read the next link from each crawled page instead of the first one
    #[arg(long = "follow-current-page")]
    follow_current_page: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,

    /// HTTP timeout in seconds
    #[arg(long = "timeout", default_value_t = 30)]
    timeout: u64,

    /// Pretty-print the JSON output
    #[arg(long = "pretty")]
    pretty: bool,

    /// URL, path to an HTML file, or - for stdin
    source: String,
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, selector)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), selector.to_string()))
        }
        _ => Err(format!("expected name=selector, got {:?}", raw)),
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn read_source(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut html = String::new();
        io::stdin()
            .read_to_string(&mut html)
            .context("reading stdin")?;
        return Ok(html);
    }
    fs::read_to_string(source).with_context(|| format!("reading {}", source))
}

fn build_scraper(args: &Args) -> Scraper {
    let mut builder = Scraper::builder()
        .default_filters(builtin_filters())
        .allow_private_networks(args.allow_private_networks)
        .timeout(Duration::from_secs(args.timeout));
    if args.keep_empty {
        builder = builder.skip_empty_records(false);
    }
    if args.strict_filters {
        builder = builder.unknown_filters(UnknownFilterPolicy::Error);
    }
    if args.follow_current_page {
        builder = builder.link_source(LinkSource::CurrentPage);
    }
    if let Some(ref base) = args.base_url {
        builder = builder.base_url(base.clone());
    }
    builder.build()
}

async fn run(args: Args) -> anyhow::Result<Value> {
    let scraper = build_scraper(&args);
    let fields: FieldMap = args.fields.iter().cloned().collect();
    let remote = is_url(&args.source);

    if let Some(ref next) = args.next {
        if fields.is_empty() {
            bail!("--next needs at least one --field");
        }
        let limit = PageLimit::from(args.max_pages);
        let records = if remote {
            scraper
                .crawl_url(&args.source, next, &args.scope, &fields, limit)
                .await?
        } else {
            let html = read_source(&args.source)?;
            scraper
                .crawl(&html, next, &args.scope, &fields, limit)
                .await?
        };
        return Ok(serde_json::to_value(records)?);
    }

    let html = if remote {
        scraper.fetch(&args.source).await?
    } else {
        read_source(&args.source)?
    };

    if fields.is_empty() {
        if args.scope.trim().is_empty() {
            bail!("nothing to extract: pass --scope or at least one --field");
        }
        return Ok(scraper.find(&html, &args.scope)?);
    }
    Ok(serde_json::to_value(scraper.find_records(
        &html,
        &args.scope,
        &fields,
    )?)?)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let pretty = args.pretty;

    let value = match run(args).await {
        Ok(value) => value,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return ExitCode::from(1);
        }
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    match rendered {
        Ok(out) => {
            println!("{}", out);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(1)
        }
    }
}
