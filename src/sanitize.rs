//! HTML sanitizing for message bodies
//!
//! Sanitizing runs in two passes and the order is observable:
//!
//! 1. Every tag-shaped substring (`<`, optional `/`, a name starting with an
//!    ASCII letter, optional attributes, `>`) is looked up in [`ALLOWED_TAGS`].
//!    Allowed tags are kept verbatim, attributes included. Anything else is
//!    deleted; the text between an opening and closing tag stays.
//! 2. `&`, `<`, `>`, `"` and `'` are escaped across the whole result,
//!    including the tags kept by the first pass.
//!
//! The net effect is that no live tag ever survives: allowed tags come out
//! as escaped text, disallowed ones disappear. Downstream readers depend on
//! these exact bytes, so the passes must not be merged.

use std::fmt;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Tag names that survive the first pass
pub const ALLOWED_TAGS: &[&str] = &[
    "p", "a", "h1", "h2", "h3", "h4", "h5", "h6", "img", "div", "span", "br", "ul", "ol", "li",
    "strong", "em",
];

// The name is the longest alphanumeric run; it must not be followed by `_`.
static TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</?([A-Za-z][A-Za-z0-9]*)(?:[^A-Za-z0-9_>][^>]*)?>").expect("valid tag pattern")
});

/// The only entities the escaper produces
const ENTITIES: &[(char, &str)] = &[
    ('&', "&amp;"),
    ('<', "&lt;"),
    ('>', "&gt;"),
    ('"', "&quot;"),
    ('\'', "&#039;"),
];

/// Body text that went through [`sanitize`]. It can only be built there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedBody(String);

impl SanitizedBody {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SanitizedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SanitizedBody {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Sanitize untrusted HTML. Total, deterministic and idempotent.
pub fn sanitize(html: &str) -> SanitizedBody {
    let filtered = filter_tags(html);
    SanitizedBody(escape(&filtered))
}

pub fn is_allowed_tag(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ALLOWED_TAGS.contains(&name.as_str())
}

fn filter_tags(html: &str) -> String {
    TAG.replace_all(html, |caps: &Captures<'_>| {
        if is_allowed_tag(&caps[1]) {
            caps[0].to_owned()
        } else {
            String::new()
        }
    })
    .into_owned()
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for (i, c) in text.char_indices() {
        match c {
            // an `&` that already opens one of our entities is kept, so a
            // second pass over sanitized text changes nothing
            '&' if starts_with_entity(&text[i..]) => out.push('&'),
            _ => match ENTITIES.iter().find(|(raw, _)| *raw == c) {
                Some((_, entity)) => out.push_str(entity),
                None => out.push(c),
            },
        }
    }
    out
}

fn starts_with_entity(s: &str) -> bool {
    ENTITIES.iter().any(|(_, entity)| s.starts_with(entity))
}

/// Replace CR and LF with spaces so a value cannot open a new header line
/// or SMTP command.
pub fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
