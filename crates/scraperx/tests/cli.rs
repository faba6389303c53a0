// ABOUTME: Integration tests for the scraperx CLI binary.
// ABOUTME: Covers file and stdin sources, field parsing, crawling over HTTP, and error exits.

use assert_cmd::Command;
use httpmock::prelude::*;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

fn scraperx_cmd() -> Command {
    Command::cargo_bin("scraperx").unwrap()
}

const LISTING: &str = r#"<!DOCTYPE html>
<html>
<head><title>Listing</title></head>
<body>
<ul>
  <li class="item"><a href="/a">  Alpha </a></li>
  <li class="item"><a href="/b">Beta</a></li>
  <li class="item"></li>
</ul>
</body>
</html>"#;

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn records_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = temp_dir.path().join("listing.html");
    fs::write(&html_path, LISTING).unwrap();

    let output = scraperx_cmd()
        .arg("--scope")
        .arg(".item")
        .arg("-f")
        .arg("name=a|trim")
        .arg("-f")
        .arg("href=a@href")
        .arg(&html_path)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!([
            { "name": "Alpha", "href": "/a" },
            { "name": "Beta", "href": "/b" }
        ])
    );
}

#[test]
fn keep_empty_retains_all_null_records() {
    let temp_dir = TempDir::new().unwrap();
    let html_path = temp_dir.path().join("listing.html");
    fs::write(&html_path, LISTING).unwrap();

    let output = scraperx_cmd()
        .args(["-s", ".item", "-f", "href=a@href", "--keep-empty"])
        .arg(&html_path)
        .output()
        .unwrap();

    assert!(output.status.success());
    let records = stdout_json(&output);
    assert_eq!(records.as_array().map(Vec::len), Some(3));
    assert_eq!(records[2], json!({ "href": null }));
}

#[test]
fn single_value_from_stdin() {
    scraperx_cmd()
        .args(["--scope", "title|upper", "-"])
        .write_stdin(LISTING)
        .assert()
        .success()
        .stdout(predicate::str::diff("\"LISTING\"\n"));
}

#[test]
fn strict_filters_fail_on_unknown_filter() {
    scraperx_cmd()
        .args(["--scope", "title|nope", "--strict-filters", "-"])
        .write_stdin(LISTING)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown filter"));
}

#[test]
fn malformed_field_is_rejected() {
    scraperx_cmd()
        .args(["-s", ".item", "-f", "no-equals-sign", "-"])
        .write_stdin(LISTING)
        .assert()
        .failure()
        .stderr(predicate::str::contains("name=selector"));
}

#[test]
fn nothing_to_extract_is_an_error() {
    scraperx_cmd()
        .arg("-")
        .write_stdin(LISTING)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to extract"));
}

#[test]
fn missing_file_reports_error() {
    scraperx_cmd()
        .args(["-s", "title", "/definitely/not/here.html"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("reading /definitely/not/here.html"));
}

#[test]
fn crawl_over_http_follows_current_page_links() {
    let server = MockServer::start();

    let page1 = server.mock(|when, then| {
        when.method(GET).path("/list/1");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(r#"<html><body><p class="row">one</p><a class="next" href="/list/2">next</a></body></html>"#);
    });
    let page2 = server.mock(|when, then| {
        when.method(GET).path("/list/2");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(r#"<html><body><p class="row">two</p></body></html>"#);
    });

    let output = scraperx_cmd()
        .arg("--allow-private-networks")
        .arg("--follow-current-page")
        .args(["-s", ".row", "-f", "text=&", "-n", "a.next@href"])
        .arg(server.url("/list/1"))
        .output()
        .unwrap();

    page1.assert();
    page2.assert();
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!([{ "text": "one" }, { "text": "two" }])
    );
}

#[test]
fn crawl_respects_max_pages() {
    let server = MockServer::start();

    let page1 = server.mock(|when, then| {
        when.method(GET).path("/p1");
        then.status(200)
            .body(r#"<p class="row">one</p><a class="next" href="/p2">next</a>"#);
    });
    let page2 = server.mock(|when, then| {
        when.method(GET).path("/p2");
        then.status(200).body(r#"<p class="row">two</p>"#);
    });

    let output = scraperx_cmd()
        .arg("--allow-private-networks")
        .args(["-s", ".row", "-f", "text=&", "-n", "a.next@href", "-m", "1"])
        .arg(server.url("/p1"))
        .output()
        .unwrap();

    page1.assert();
    assert_eq!(page2.calls(), 0, "page 2 must not be fetched with --max-pages 1");
    assert_eq!(stdout_json(&output), json!([{ "text": "one" }]));
}

#[test]
fn private_network_blocked_by_default() {
    let server = MockServer::start();
    let url = format!("http://127.0.0.1:{}/page", server.port());

    scraperx_cmd()
        .args(["-s", "title"])
        .arg(&url)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SSRF blocked"));
}

#[test]
fn pretty_output_is_indented() {
    scraperx_cmd()
        .args(["-s", ".item", "-f", "href=a@href", "--pretty", "-"])
        .write_stdin(LISTING)
        .assert()
        .success()
        .stdout(predicate::str::contains("\n  {\n    \"href\": \"/a\""));
}
