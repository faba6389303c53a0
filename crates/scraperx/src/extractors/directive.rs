// ABOUTME: Compiler for the selector DSL `sub-selector@mode|filter:arg1,arg2`.
// ABOUTME: Produces an immutable Directive with a pre-parsed CSS target, extraction mode and filter call.

//! Selector DSL compiler.
//!
//! A selector string describes how one field is pulled out of an element:
//!
//! ```text
//! selector := base ("|" filter)?
//! base     := sub-selector ("@" mode)?
//! filter   := name (":" args)?
//! ```
//!
//! - The sub-selector is a CSS selector evaluated against the descendants of the
//!   context element, or [`SELF_TOKEN`] (`&`) to use the context element itself.
//! - The mode is `text` (default), `html`, or any other string, which names an
//!   attribute.
//! - The filter arguments are comma separated. One layer of matching quotes around
//!   the whole argument list is stripped before splitting.
//!
//! `|` and `@` only act as separators outside `[...]` attribute blocks and quoted
//! strings. `\|` and `\@` stand for the literal characters anywhere.

use std::fmt;
use std::str::FromStr;

use scraper::Selector;

use crate::error::{Result, ScrapeError};

/// Sub-selector token meaning "the context element itself".
pub const SELF_TOKEN: &str = "&";

/// Legacy spelling of [`SELF_TOKEN`].
pub const SELF_ALIAS: &str = "current";

const FILTER_SEPARATOR: char = '|';
const MODE_SEPARATOR: char = '@';
const ARGS_SEPARATOR: char = ':';
const ARG_DELIMITER: char = ',';

/// Which node a directive reads from.
#[derive(Debug, Clone)]
pub enum Target {
    /// The context element.
    Current,
    /// The first descendant matching a CSS selector.
    Css { source: String, selector: Selector },
}

impl Target {
    /// The sub-selector text as written (the self token for `Current`).
    pub fn as_str(&self) -> &str {
        match self {
            Target::Current => SELF_TOKEN,
            Target::Css { source, .. } => source,
        }
    }

    pub fn is_current(&self) -> bool {
        matches!(self, Target::Current)
    }
}

impl PartialEq for Target {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Target {}

/// What to read from the target node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Mode {
    /// Concatenated text content.
    #[default]
    Text,
    /// Outer HTML, including the node's own tag.
    Html,
    /// Value of the named attribute.
    Attr(String),
}

impl Mode {
    pub const TEXT: &'static str = "text";
    pub const HTML: &'static str = "html";
}

impl From<&str> for Mode {
    fn from(s: &str) -> Self {
        match s {
            Mode::TEXT => Mode::Text,
            Mode::HTML => Mode::Html,
            other => Mode::Attr(other.to_string()),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Text => f.write_str(Mode::TEXT),
            Mode::Html => f.write_str(Mode::HTML),
            Mode::Attr(name) => f.write_str(name),
        }
    }
}

/// A named filter and the string arguments passed after the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCall {
    pub name: String,
    pub args: Vec<String>,
}

/// The compiled form of one selector string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub target: Target,
    pub mode: Mode,
    pub filter: Option<FilterCall>,
}

impl Directive {
    /// The sub-selector text (or the self token).
    pub fn sub_selector(&self) -> &str {
        self.target.as_str()
    }
}

impl FromStr for Directive {
    type Err = ScrapeError;

    fn from_str(s: &str) -> Result<Self> {
        compile(s)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape(self.target.as_str()))?;
        if self.mode != Mode::Text {
            write!(f, "{}{}", MODE_SEPARATOR, escape(&self.mode.to_string()))?;
        }
        if let Some(ref call) = self.filter {
            write!(f, "{}{}", FILTER_SEPARATOR, escape(&call.name))?;
            if !call.args.is_empty() {
                let args: Vec<String> = call.args.iter().map(|a| escape(a)).collect();
                write!(f, "{}{}", ARGS_SEPARATOR, quote_args(&args.join(",")))?;
            }
        }
        Ok(())
    }
}

/// Compiles a selector string into a [`Directive`].
///
/// Fails with a `MalformedSelector` error when the string is empty, has an empty
/// sub-selector, mode or filter name, carries more than one filter clause, or when
/// the sub-selector is not valid CSS.
pub fn compile(selector: &str) -> Result<Directive> {
    let malformed = |reason: String| {
        ScrapeError::malformed_selector(selector, "Compile", Some(anyhow::anyhow!(reason)))
    };

    if selector.trim().is_empty() {
        return Err(malformed("empty selector".to_string()));
    }

    let pipes = separator_indices(selector, FILTER_SEPARATOR);
    if pipes.len() > 1 {
        return Err(malformed("more than one filter clause".to_string()));
    }
    let (base, filter_src) = match pipes.first() {
        Some(&i) => (&selector[..i], Some(&selector[i + 1..])),
        None => (selector, None),
    };

    let (sub, mode_src) = match separator_indices(base, MODE_SEPARATOR).first() {
        Some(&i) => (&base[..i], Some(&base[i + 1..])),
        None => (base, None),
    };

    let sub = unescape(sub.trim());
    if sub.is_empty() {
        return Err(malformed("empty sub-selector".to_string()));
    }

    let mode = match mode_src {
        Some(raw) => {
            let raw = unescape(raw.trim());
            if raw.is_empty() {
                return Err(malformed("empty mode after '@'".to_string()));
            }
            Mode::from(raw.as_str())
        }
        None => Mode::default(),
    };

    let target = if sub == SELF_TOKEN || sub == SELF_ALIAS {
        Target::Current
    } else {
        let parsed = Selector::parse(&sub)
            .map_err(|e| malformed(format!("invalid CSS selector '{}': {}", sub, e)))?;
        Target::Css {
            source: sub,
            selector: parsed,
        }
    };

    let filter = match filter_src {
        Some(raw) => Some(parse_filter(raw).map_err(malformed)?),
        None => None,
    };

    Ok(Directive {
        target,
        mode,
        filter,
    })
}

fn parse_filter(raw: &str) -> std::result::Result<FilterCall, String> {
    let (name, args_src) = match raw.split_once(ARGS_SEPARATOR) {
        Some((name, args)) => (name, Some(args)),
        None => (raw, None),
    };

    let name = unescape(name.trim());
    if name.is_empty() {
        return Err("empty filter name".to_string());
    }

    let args = match args_src {
        Some(src) => {
            let src = strip_quotes(src.trim());
            if src.trim().is_empty() {
                Vec::new()
            } else {
                src.split(ARG_DELIMITER)
                    .map(|arg| unescape(arg.trim()))
                    .collect()
            }
        }
        None => Vec::new(),
    };

    Ok(FilterCall { name, args })
}

/// Byte offsets of `sep` occurrences that are outside brackets and quotes and not escaped.
fn separator_indices(input: &str, sep: char) -> Vec<usize> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match (c, quote) {
            ('\\', _) => escaped = true,
            (c, Some(q)) if c == q => quote = None,
            (_, Some(_)) => {}
            ('"' | '\'', None) => quote = Some(c),
            ('[', None) => depth += 1,
            (']', None) => depth = depth.saturating_sub(1),
            (c, None) if c == sep && depth == 0 => found.push(i),
            _ => {}
        }
    }
    found
}

/// Strips one layer of matching `"` or `'` around the whole string.
fn strip_quotes(s: &str) -> &str {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            return &s[1..s.len() - 1];
        }
    }
    s
}

/// Wraps an argument list that would otherwise lose its own outer quotes on recompile.
fn quote_args(joined: &str) -> String {
    if strip_quotes(joined).len() == joined.len() {
        return joined.to_string();
    }
    let q = if joined.starts_with('"') { '\'' } else { '"' };
    format!("{q}{joined}{q}")
}

fn unescape(s: &str) -> String {
    s.replace("\\|", "|").replace("\\@", "@")
}

fn escape(s: &str) -> String {
    s.replace('|', "\\|").replace('@', "\\@")
}
