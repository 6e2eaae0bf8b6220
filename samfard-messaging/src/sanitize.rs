use once_cell::sync::Lazy;
use regex::Regex;

static MARKUP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("markup regex"));

/// Strips markup and control characters and collapses whitespace before a
/// message body is scanned or persisted.
pub fn sanitize(raw: &str) -> String {
    let without_markup = MARKUP_RE.replace_all(raw, " ");
    let without_control: String = without_markup
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    without_control.split_whitespace().collect::<Vec<_>>().join(" ")
}
