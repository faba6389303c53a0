// ABOUTME: Field extraction: resolves a directive's target node, reads text/html/attribute, applies its filter.
// ABOUTME: Works against a single element (record scope) or a whole parsed document (single-value mode).

//! Directive evaluation.
//!
//! Key behaviors:
//! - `&` reads the context element itself; any other sub-selector reads the first
//!   matching *descendant* of the context.
//! - No matching node yields `null` and the filter is not called.
//! - Text mode returns the raw concatenated text, without trimming.
//! - An absent attribute yields `null`, which is still handed to the filter.

use scraper::{ElementRef, Html};
use serde_json::Value;

use crate::extractors::directive::{Directive, Mode, Target};
use crate::extractors::filters::ActiveFilters;

/// Evaluates a directive against an element.
pub fn extract(context: ElementRef<'_>, directive: &Directive, filters: &ActiveFilters<'_>) -> Value {
    let node = match &directive.target {
        Target::Current => Some(context),
        Target::Css { selector, .. } => context.select(selector).next(),
    };
    finish(node, directive, filters)
}

/// Evaluates a directive against a whole document.
///
/// `&` reads the root `<html>` element. CSS sub-selectors may match any element in
/// the document, the root included.
pub fn extract_in_document(
    doc: &Html,
    directive: &Directive,
    filters: &ActiveFilters<'_>,
) -> Value {
    let node = match &directive.target {
        Target::Current => Some(doc.root_element()),
        Target::Css { selector, .. } => doc.select(selector).next(),
    };
    finish(node, directive, filters)
}

fn finish(
    node: Option<ElementRef<'_>>,
    directive: &Directive,
    filters: &ActiveFilters<'_>,
) -> Value {
    let Some(node) = node else {
        return Value::Null;
    };
    let raw = read_mode(node, &directive.mode);
    match &directive.filter {
        Some(call) => filters.apply(call, raw),
        None => raw,
    }
}

fn read_mode(node: ElementRef<'_>, mode: &Mode) -> Value {
    match mode {
        Mode::Text => Value::String(node.text().collect()),
        Mode::Html => Value::String(node.html()),
        Mode::Attr(name) => node
            .value()
            .attr(name)
            .map_or(Value::Null, |v| Value::String(v.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use scraper::Selector;
    use serde_json::json;

    use crate::extractors::directive::compile;
    use crate::extractors::filters::FilterRegistry;
    use crate::options::UnknownFilterPolicy;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head><title>Test Page</title></head>
        <body>
            <div class="card" data-id="7">
                Card <b>one</b>
                <a class="link" href="/one"> first </a>
                <div class="card" data-id="8"><span>nested</span></div>
            </div>
            <img class="hero" src="/images/hero.jpg">
        </body>
        </html>
    "#;

    fn eval_doc(selector: &str, registry: &FilterRegistry) -> Value {
        let doc = Html::parse_document(SAMPLE_HTML);
        let filters = ActiveFilters::new(
            registry,
            Arc::new(FilterRegistry::new()),
            UnknownFilterPolicy::PassThrough,
        );
        extract_in_document(&doc, &compile(selector).unwrap(), &filters)
    }

    fn eval_card(selector: &str) -> Value {
        let doc = Html::parse_document(SAMPLE_HTML);
        let card = doc
            .select(&Selector::parse("div.card").unwrap())
            .next()
            .unwrap();
        let registry = FilterRegistry::new();
        let filters = ActiveFilters::new(
            &registry,
            Arc::new(FilterRegistry::new()),
            UnknownFilterPolicy::PassThrough,
        );
        extract(card, &compile(selector).unwrap(), &filters)
    }

    #[test]
    fn test_text_mode_returns_raw_text() {
        assert_eq!(eval_card("a.link"), json!(" first "));
    }

    #[test]
    fn test_attribute_mode() {
        assert_eq!(eval_card("a.link@href"), json!("/one"));
        assert_eq!(eval_card("a.link@title"), Value::Null);
    }

    #[test]
    fn test_html_mode_includes_own_tag() {
        assert_eq!(eval_card("b@html"), json!("<b>one</b>"));
    }

    #[test]
    fn test_self_reference_reads_context_not_descendant() {
        // The nested card also matches div.card, but & must stay on the outer one.
        assert_eq!(eval_card("&@data-id"), json!("7"));
        let html = eval_card("&@html");
        let html = html.as_str().unwrap();
        assert!(html.starts_with("<div"));
        assert!(html.contains(r#"data-id="7""#));
        assert!(html.contains("nested"));
    }

    #[test]
    fn test_css_target_only_matches_descendants() {
        assert_eq!(eval_card("div.card@data-id"), json!("8"));
    }

    #[test]
    fn test_missing_node_yields_null_without_calling_filter() {
        let registry = FilterRegistry::new().with("always", |_, _| json!("called"));
        assert_eq!(eval_doc("section.none|always", &registry), Value::Null);
        assert_eq!(eval_doc("img.hero@alt|always", &registry), json!("called"));
    }

    #[test]
    fn test_document_level_extraction() {
        let registry = FilterRegistry::new();
        assert_eq!(eval_doc("title", &registry), json!("Test Page"));
        assert_eq!(eval_doc("html@lang", &registry), json!("en"));
        assert_eq!(eval_doc("&@lang", &registry), json!("en"));
        assert_eq!(eval_doc("img.hero@src", &registry), json!("/images/hero.jpg"));
    }

    #[test]
    fn test_filter_called_with_value_and_args() {
        let registry = FilterRegistry::new().with("currency", |v, args| {
            json!({ "amount": v, "currency": args[0] })
        });
        let doc = Html::parse_document("<p class=price>12.50</p>");
        let filters = ActiveFilters::new(
            &registry,
            Arc::new(FilterRegistry::new()),
            UnknownFilterPolicy::PassThrough,
        );
        let value = extract_in_document(&doc, &compile(".price|currency:USD").unwrap(), &filters);
        assert_eq!(value, json!({ "amount": "12.50", "currency": "USD" }));
    }
}
