//! Structural checks for generated markup.
//!
//! Generated apps must be complete single-file HTML documents. The checks here
//! are tag-presence tests only; no semantic HTML validation is attempted.

use once_cell::sync::Lazy;
use regex::Regex;

static HTML_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<html[^>]*>").unwrap());
static HTML_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</html>").unwrap());
static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head[^>]*>").unwrap());
static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head>").unwrap());
static BODY_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<body[^>]*>").unwrap());
static BODY_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</body>").unwrap());

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)```html?\n?").unwrap());
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```\n?").unwrap());
static DOCTYPE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!doctype\s+html>").unwrap());

const DOCTYPE_LITERAL: &str = "<!doctype html>";

/// A structural element every generated document must contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredElement {
    Doctype,
    HtmlOpen,
    HtmlClose,
    HeadOpen,
    HeadClose,
    BodyOpen,
    BodyClose,
}

impl RequiredElement {
    /// All elements, in the order they are reported.
    pub const ALL: [RequiredElement; 7] = [
        RequiredElement::Doctype,
        RequiredElement::HtmlOpen,
        RequiredElement::HtmlClose,
        RequiredElement::HeadOpen,
        RequiredElement::HeadClose,
        RequiredElement::BodyOpen,
        RequiredElement::BodyClose,
    ];

    /// Short machine-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            RequiredElement::Doctype => "doctype",
            RequiredElement::HtmlOpen => "<html>",
            RequiredElement::HtmlClose => "</html>",
            RequiredElement::HeadOpen => "<head>",
            RequiredElement::HeadClose => "</head>",
            RequiredElement::BodyOpen => "<body>",
            RequiredElement::BodyClose => "</body>",
        }
    }

    /// Human-readable line used in the aggregated error message.
    pub fn message(&self) -> &'static str {
        match self {
            RequiredElement::Doctype => {
                "Missing DOCTYPE declaration. HTML must start with <!DOCTYPE html>"
            }
            RequiredElement::HtmlOpen => "Missing <html> opening tag",
            RequiredElement::HtmlClose => "Missing </html> closing tag",
            RequiredElement::HeadOpen => "Missing <head> opening tag",
            RequiredElement::HeadClose => "Missing </head> closing tag",
            RequiredElement::BodyOpen => "Missing <body> opening tag",
            RequiredElement::BodyClose => "Missing </body> closing tag",
        }
    }

    fn is_present(&self, text: &str) -> bool {
        match self {
            RequiredElement::Doctype => text.to_lowercase().contains(DOCTYPE_LITERAL),
            RequiredElement::HtmlOpen => HTML_OPEN.is_match(text),
            RequiredElement::HtmlClose => HTML_CLOSE.is_match(text),
            RequiredElement::HeadOpen => HEAD_OPEN.is_match(text),
            RequiredElement::HeadClose => HEAD_CLOSE.is_match(text),
            RequiredElement::BodyOpen => BODY_OPEN.is_match(text),
            RequiredElement::BodyClose => BODY_CLOSE.is_match(text),
        }
    }
}

/// Markup failed one or more structural checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupError {
    missing: Vec<RequiredElement>,
}

impl MarkupError {
    /// Every element that was missing, in report order.
    pub fn missing(&self) -> &[RequiredElement] {
        &self.missing
    }
}

impl std::fmt::Display for MarkupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines: Vec<&str> = self.missing.iter().map(|m| m.message()).collect();
        write!(f, "HTML Validation Failed:\n{}", lines.join("\n"))
    }
}

impl std::error::Error for MarkupError {}

/// Check that `text` contains every required structural element.
///
/// All checks run independently, so the error lists every omission at once.
pub fn validate_markup(text: &str) -> Result<(), MarkupError> {
    let missing: Vec<RequiredElement> = RequiredElement::ALL
        .iter()
        .copied()
        .filter(|element| !element.is_present(text))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(MarkupError { missing })
    }
}

/// Pull the HTML document out of a raw chat reply.
///
/// Strips markdown code fences and drops any preamble before the doctype.
pub fn extract_markup(reply: &str) -> String {
    let without_open = FENCE_OPEN.replace_all(reply, "");
    let without_fences = FENCE_CLOSE.replace_all(&without_open, "");
    let code = without_fences.trim();

    match DOCTYPE_START.find(code) {
        Some(m) if m.start() > 0 => code[m.start()..].to_string(),
        _ => code.to_string(),
    }
}
