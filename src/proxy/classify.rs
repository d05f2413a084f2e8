//! Content classification for response bodies.
//!
//! Two pure predicates decide how the forwarder treats a response:
//! whether the body streams straight through, and whether a buffered body
//! is markup that should stay out of the body log.

/// Content-type fragments whose bodies are streamed without buffering.
const TEXTUAL_TYPES: [&str; 4] = [
    "text/html",
    "text/css",
    "application/javascript",
    "text/javascript",
];

/// Whether a response with this content type is streamed unbuffered.
///
/// Matching is a case-insensitive substring test, so parameters such as
/// `; charset=utf-8` do not matter.
pub fn is_textual(content_type: &str) -> bool {
    let content_type = content_type.to_ascii_lowercase();
    TEXTUAL_TYPES.iter().any(|t| content_type.contains(t))
}

/// Whether a buffered body is an XML document or contains inline SVG.
pub fn is_xml_or_svg(body: &[u8]) -> bool {
    let lower = trim_space(body).to_ascii_lowercase();
    lower.starts_with(b"<?xml") || contains(&lower, b"<svg")
}

/// Trim Unicode whitespace (`\v`, NBSP and NEL included) from both ends.
///
/// Bytes that are not valid UTF-8 stop the trim.
fn trim_space(mut body: &[u8]) -> &[u8] {
    while let Some(c) = first_char(body).filter(|c| c.is_whitespace()) {
        body = &body[c.len_utf8()..];
    }
    while let Some(c) = last_char(body).filter(|c| c.is_whitespace()) {
        body = &body[..body.len() - c.len_utf8()];
    }
    body
}

fn first_char(body: &[u8]) -> Option<char> {
    (1..=body.len().min(4))
        .find_map(|n| std::str::from_utf8(&body[..n]).ok())
        .and_then(|s| s.chars().next())
}

fn last_char(body: &[u8]) -> Option<char> {
    (1..=body.len().min(4))
        .find_map(|n| std::str::from_utf8(&body[body.len() - n..]).ok())
        .and_then(|s| s.chars().next_back())
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Classification of one upstream response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentClassification {
    /// Body is streamed to the client as it arrives.
    pub is_textual: bool,
    /// Set once a non-textual body has been buffered.
    pub is_xml_or_svg: Option<bool>,
}

impl ContentClassification {
    pub fn from_content_type(content_type: &str) -> Self {
        Self {
            is_textual: is_textual(content_type),
            is_xml_or_svg: None,
        }
    }

    /// Record the body check for a buffered response.
    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.is_xml_or_svg = Some(is_xml_or_svg(body));
        self
    }

    /// A buffered body that is not markup gets captured for the body log.
    pub fn should_capture(&self) -> bool {
        !self.is_textual && self.is_xml_or_svg == Some(false)
    }
}
