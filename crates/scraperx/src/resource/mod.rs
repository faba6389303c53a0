// ABOUTME: Page fetching: the Fetcher trait and the reqwest-backed HttpFetcher.
// ABOUTME: Handles SSRF protection, content-length limits, status checks, and charset decoding.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ipnet::{Ipv4Net, Ipv6Net};
use once_cell::sync::OnceCell;
use url::Url;

use crate::error::{Result, ScrapeError};
use crate::options::Options;

/// Maximum allowed content length (10 MB).
pub const MAX_CONTENT_LENGTH: usize = 10 * 1024 * 1024;

/// HTML for one page, with the URL it came from when known.
#[derive(Debug, Clone)]
pub struct PageText {
    pub url: Option<Url>,
    pub body: String,
}

/// Source of page HTML for URL-based operations and crawls.
#[async_trait]
pub trait Fetcher: Send + Sync + fmt::Debug {
    /// Fetch the page at `url` and return its body as text.
    async fn fetch(&self, url: &str) -> Result<String>;

    /// Fetch the page at `url` along with the URL its body was served from.
    ///
    /// Fetchers that follow redirects should report the final URL so relative
    /// links on the page resolve against it. The default reports `url` itself.
    async fn fetch_page(&self, url: &str) -> Result<PageText> {
        let body = self.fetch(url).await?;
        Ok(PageText {
            url: Url::parse(url).ok(),
            body,
        })
    }
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, url: &str) -> Result<String> {
        (**self).fetch(url).await
    }

    async fn fetch_page(&self, url: &str) -> Result<PageText> {
        (**self).fetch_page(url).await
    }
}

/// Options for fetching a resource.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

/// Result of a successful fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status: u16,
    pub url: String,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl FetchResult {
    /// Decode the body as UTF-8 text, using charset hints from content-type header.
    pub fn text_utf8(&self, content_type_hint: Option<&str>) -> String {
        let ct = content_type_hint.or(self.content_type.as_deref());
        decode_body(&self.body, ct)
    }
}

/// Fetcher over HTTP(S) using reqwest.
///
/// The reqwest client is built on first use, so scrapers that only ever see HTML
/// strings never construct one.
#[derive(Debug)]
pub struct HttpFetcher {
    client: OnceCell<reqwest::Client>,
    preset: Option<reqwest::Client>,
    timeout: std::time::Duration,
    user_agent: String,
    opts: FetchOptions,
}

impl HttpFetcher {
    pub fn new(opts: &Options) -> Self {
        Self {
            client: OnceCell::new(),
            preset: opts.http_client.clone(),
            timeout: opts.timeout,
            user_agent: opts.user_agent.clone(),
            opts: FetchOptions {
                headers: opts.headers.clone(),
                allow_private_networks: opts.allow_private_networks,
            },
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(|| {
            if let Some(ref client) = self.preset {
                return client.clone();
            }
            build_client(&self.user_agent, self.timeout, self.opts.allow_private_networks)
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        Ok(self.fetch_page(url).await?.body)
    }

    async fn fetch_page(&self, url: &str) -> Result<PageText> {
        let result = fetch(self.client(), url, &self.opts).await?;
        tracing::debug!(
            url = %result.url,
            final_url = %result.final_url,
            status = result.status,
            bytes = result.body.len(),
            "fetched page"
        );
        Ok(PageText {
            url: Url::parse(&result.final_url)
                .or_else(|_| Url::parse(url))
                .ok(),
            body: result.text_utf8(None),
        })
    }
}

fn build_client(
    user_agent: &str,
    timeout: std::time::Duration,
    allow_private: bool,
) -> reqwest::Client {
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if allow_private {
            return attempt.follow();
        }
        let next = attempt.url().clone();
        let Some(host) = next.host_str() else {
            return attempt.follow();
        };
        if let Ok(ip) = host.parse::<IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error("redirect to private IP blocked");
            }
            return attempt.follow();
        }
        // synchronous DNS resolution to avoid async in redirect policy
        let port = next.port_or_known_default().unwrap_or(80);
        match format!("{}:{}", host, port).to_socket_addrs() {
            Ok(mut addrs) => {
                if addrs.any(|sa| is_private_ip(&sa.ip())) {
                    attempt.error("redirect to private IP blocked")
                } else {
                    attempt.follow()
                }
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to build configured HTTP client, using defaults");
            reqwest::Client::new()
        })
}

/// RFC1918 private ranges, loopback, link-local.
const V4_PRIVATE_RANGES: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "127.0.0.0/8",
    "169.254.0.0/16",
];

/// Unique local and link-local.
const V6_PRIVATE_RANGES: &[&str] = &["fc00::/7", "fe80::/10"];

/// Check if an IP address is in a private/reserved range.
pub(crate) fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(ip) => V4_PRIVATE_RANGES
            .iter()
            .filter_map(|net| net.parse::<Ipv4Net>().ok())
            .any(|net| net.contains(ip)),
        IpAddr::V6(ip) => {
            ip.is_loopback()
                || V6_PRIVATE_RANGES
                    .iter()
                    .filter_map(|net| net.parse::<Ipv6Net>().ok())
                    .any(|net| net.contains(ip))
        }
    }
}

/// Rejects hosts that are, or resolve to, private addresses.
async fn check_host(url: &str, target: &Url, reason: &str) -> Result<()> {
    let Some(host) = target.host_str() else {
        return Ok(());
    };
    let host = host.trim_start_matches('[').trim_end_matches(']');

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(ScrapeError::ssrf(url, "Fetch", Some(anyhow::anyhow!("{}", reason))));
        }
        return Ok(());
    }

    let port = target.port_or_known_default().unwrap_or(80);
    let mut addrs = tokio::net::lookup_host((host, port)).await.map_err(|e| {
        ScrapeError::fetch(url, "Fetch", Some(anyhow::anyhow!("DNS lookup failed: {}", e)))
    })?;
    if addrs.any(|sa| is_private_ip(&sa.ip())) {
        return Err(ScrapeError::ssrf(url, "Fetch", Some(anyhow::anyhow!("{}", reason))));
    }
    Ok(())
}

/// Decode body bytes to a String using charset from content-type header or detection.
fn decode_body(body: &[u8], content_type: Option<&str>) -> String {
    if let Some(encoding) = content_type
        .and_then(extract_charset)
        .and_then(|charset| encoding_rs::Encoding::for_label(charset.as_bytes()))
    {
        let (decoded, _, _) = encoding.decode(body);
        return decoded.into_owned();
    }

    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(body, true);
    let encoding = detector.guess(None, true);
    let (decoded, _, _) = encoding.decode(body);
    decoded.into_owned()
}

/// Extract charset value from Content-Type header.
fn extract_charset(content_type: &str) -> Option<String> {
    let lower = content_type.to_lowercase();
    lower.split(';').find_map(|part| {
        part.trim()
            .strip_prefix("charset=")
            .map(|charset| charset.trim_matches('"').trim_matches('\'').to_string())
    })
}

/// Fetch a resource from the given URL.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    opts: &FetchOptions,
) -> Result<FetchResult> {
    if url.is_empty() {
        return Err(ScrapeError::invalid_url(url, "Fetch", None));
    }

    let parsed_url = Url::parse(url).map_err(|e| {
        ScrapeError::invalid_url(url, "Fetch", Some(anyhow::anyhow!("invalid URL: {}", e)))
    })?;

    let scheme = parsed_url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ScrapeError::invalid_url(
            url,
            "Fetch",
            Some(anyhow::anyhow!("scheme must be http or https")),
        ));
    }

    if !opts.allow_private_networks {
        check_host(url, &parsed_url, "private IP addresses are not allowed").await?;
    }

    let mut request = client.get(url);
    for (key, value) in &opts.headers {
        request = request.header(key, value);
    }

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            ScrapeError::timeout(url, "Fetch", Some(anyhow::anyhow!("request timed out: {}", e)))
        } else {
            ScrapeError::fetch(url, "Fetch", Some(anyhow::anyhow!("request failed: {}", e)))
        }
    })?;

    // The redirect policy resolves synchronously; re-check the final hop here.
    if !opts.allow_private_networks {
        let final_url = response.url().clone();
        check_host(url, &final_url, "redirect to private IP address is not allowed").await?;
    }

    let content_length = response.content_length().or_else(|| {
        response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
    });
    if content_length.is_some_and(|len| len as usize > MAX_CONTENT_LENGTH) {
        return Err(ScrapeError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    let status = response.status().as_u16();
    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_lowercase());

    let body = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            ScrapeError::timeout(url, "Fetch", Some(anyhow::anyhow!("body timed out: {}", e)))
        } else {
            ScrapeError::fetch(
                url,
                "Fetch",
                Some(anyhow::anyhow!("failed to read body: {}", e)),
            )
        }
    })?;

    if body.len() > MAX_CONTENT_LENGTH {
        return Err(ScrapeError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("content too large")),
        ));
    }

    if status != 200 {
        return Err(ScrapeError::fetch(
            url,
            "Fetch",
            Some(anyhow::anyhow!("HTTP status {}", status)),
        ));
    }

    Ok(FetchResult {
        status,
        url: url.to_string(),
        final_url,
        content_type,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn create_test_client() -> reqwest::Client {
        reqwest::Client::builder()
            .user_agent("test-agent")
            .build()
            .unwrap()
    }

    fn open_opts() -> FetchOptions {
        FetchOptions {
            allow_private_networks: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_ok_utf8() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/test");
            then.status(200)
                .header("content-type", "text/html; charset=utf-8")
                .body("<p>hello</p>");
        });

        let result = fetch(&create_test_client(), &server.url("/test"), &open_opts()).await;
        mock.assert();

        let result = result.expect("fetch should succeed");
        assert_eq!(result.status, 200);
        assert_eq!(result.text_utf8(None), "<p>hello</p>");
    }

    #[tokio::test]
    async fn test_fetch_non_200_rejected() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/notfound");
            then.status(404).body("not found");
        });

        let result = fetch(&create_test_client(), &server.url("/notfound"), &open_opts()).await;
        mock.assert();

        let err = result.expect_err("should fail on 404");
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_fetch_sends_custom_headers() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/h").header("x-token", "abc");
            then.status(200).body("ok");
        });

        let mut opts = open_opts();
        opts.headers.insert("x-token".to_string(), "abc".to_string());
        fetch(&create_test_client(), &server.url("/h"), &opts)
            .await
            .expect("header should match");
        mock.assert();
    }

    #[tokio::test]
    async fn test_invalid_urls_rejected() {
        let client = create_test_client();
        for url in ["", "not a url", "ftp://example.com/file"] {
            let err = fetch(&client, url, &open_opts()).await.expect_err(url);
            assert!(err.is_invalid_url(), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn test_private_ip_block() {
        let server = MockServer::start();
        let opts = FetchOptions::default();

        let url = format!("http://127.0.0.1:{}/test", server.port());
        let err = fetch(&create_test_client(), &url, &opts)
            .await
            .expect_err("should fail on private IP");
        assert!(err.is_ssrf());
    }

    #[tokio::test]
    async fn test_http_fetcher_uses_options() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/page").header("user-agent", "unit-agent");
            then.status(200)
                .header("content-type", "text/html")
                .body("<h1>Page</h1>");
        });

        let opts = Options {
            user_agent: "unit-agent".to_string(),
            allow_private_networks: true,
            ..Default::default()
        };
        let fetcher = HttpFetcher::new(&opts);
        let body = fetcher.fetch(&server.url("/page")).await.unwrap();
        mock.assert();
        assert_eq!(body, "<h1>Page</h1>");
    }

    #[test]
    fn test_decode_iso_8859_1_with_chardetng() {
        // "café" in ISO-8859-1, no charset header
        let iso_bytes: &[u8] = &[0x63, 0x61, 0x66, 0xe9];
        let decoded = decode_body(iso_bytes, None);
        assert!(decoded.starts_with("caf"));
        assert_eq!(decoded.chars().count(), 4);
    }

    #[test]
    fn test_decode_body_with_charset() {
        let decoded = decode_body(&[0x63, 0x61, 0x66, 0xe9], Some("text/html; charset=ISO-8859-1"));
        assert_eq!(decoded, "café");
    }

    #[test]
    fn test_is_private_ip_v4() {
        assert!(is_private_ip(&"10.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.16.0.1".parse().unwrap()));
        assert!(is_private_ip(&"172.31.255.255".parse().unwrap()));
        assert!(is_private_ip(&"192.168.0.1".parse().unwrap()));
        assert!(is_private_ip(&"127.0.0.1".parse().unwrap()));
        assert!(is_private_ip(&"169.254.0.1".parse().unwrap()));

        assert!(!is_private_ip(&"8.8.8.8".parse().unwrap()));
        assert!(!is_private_ip(&"172.32.0.1".parse().unwrap()));
    }

    #[test]
    fn test_is_private_ip_v6() {
        assert!(is_private_ip(&"::1".parse().unwrap()));
        assert!(is_private_ip(&"fd00::1".parse().unwrap()));
        assert!(is_private_ip(&"fe80::1".parse().unwrap()));
        assert!(!is_private_ip(&"2001:4860:4860::8888".parse().unwrap()));
    }

    #[test]
    fn test_extract_charset() {
        assert_eq!(
            extract_charset("text/html; charset=utf-8"),
            Some("utf-8".to_string())
        );
        assert_eq!(
            extract_charset("text/html; charset=\"ISO-8859-1\""),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(extract_charset("text/html"), None);
    }
}
