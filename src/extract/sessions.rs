//! Session discovery from the archive's landing page.
//!
//! Sessions are listed as `times[]` checkboxes whose labels carry Japanese
//! era years (令和/平成/昭和) or plain Gregorian years; both are mapped to
//! Gregorian for partitioning.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};

use crate::fetch::{FetchClient, FetchError, FetchRequest};
use crate::session::SessionMeta;

/// Era name to year offset: era year 1 is `offset + 1`.
const ERA_OFFSETS: [(&str, i32); 3] = [("令和", 2018), ("平成", 1988), ("昭和", 1925)];

#[allow(clippy::expect_used)]
static DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("static pattern compiles"));

#[allow(clippy::expect_used)]
static YEAR_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}").expect("static pattern compiles"));

/// Converts a session label to a Gregorian year.
///
/// Era labels ("令和7年春期") use the era offset table; otherwise the
/// first four-digit run is taken as a Gregorian year. Returns None when
/// neither form is present.
#[must_use]
pub fn era_to_gregorian(label: &str) -> Option<i32> {
    for (era, offset) in ERA_OFFSETS {
        if label.contains(era) {
            if let Some(digits) = DIGITS.find(label) {
                if let Ok(year) = digits.as_str().parse::<i32>() {
                    return Some(offset + year);
                }
            }
        }
    }
    YEAR_DIGITS
        .find(label)
        .and_then(|digits| digits.as_str().parse().ok())
}

/// Parses the landing page's session checkboxes into [`SessionMeta`]s.
///
/// Entries without a value, without a readable label, or whose label does
/// not resolve to a year are skipped. Duplicate labels keep their first
/// occurrence.
#[must_use]
pub fn parse_sessions(html: &str, base_url: &str) -> Vec<SessionMeta> {
    #[allow(clippy::expect_used)]
    static CHECKBOXES: LazyLock<Selector> = LazyLock::new(|| {
        Selector::parse(r#"input[name="times[]"]"#).expect("static selector parses")
    });

    let document = Html::parse_document(html);
    let mut sessions: Vec<SessionMeta> = Vec::new();

    for input in document.select(&CHECKBOXES) {
        let Some(code) = input.value().attr("value").filter(|v| !v.is_empty()) else {
            continue;
        };
        let Some(label) = checkbox_label(&input) else {
            continue;
        };
        let Some(year) = era_to_gregorian(&label) else {
            debug!(label, "skipping session with unparseable year");
            continue;
        };
        if sessions.iter().any(|s| s.label == label) {
            continue;
        }
        sessions.push(SessionMeta {
            label,
            year,
            times_code: code.to_string(),
            base_url: base_url.to_string(),
        });
    }

    sessions
}

/// Fetches the landing page and enumerates the available sessions.
///
/// # Errors
///
/// Returns [`FetchError`] when the landing page cannot be fetched.
#[instrument(skip(client))]
pub async fn discover_sessions(
    client: &FetchClient,
    base_url: &str,
) -> Result<Vec<SessionMeta>, FetchError> {
    let content = client.fetch(FetchRequest::get(base_url)).await?;
    let sessions = parse_sessions(content.as_text().unwrap_or_default(), base_url);
    debug!(count = sessions.len(), "discovered sessions");
    Ok(sessions)
}

/// Reads a checkbox's label: its wrapping `<label>`'s text when present,
/// else the text node immediately following the input.
fn checkbox_label(input: &ElementRef) -> Option<String> {
    if let Some(parent) = input.parent().and_then(ElementRef::wrap) {
        if parent.value().name() == "label" {
            let text = collapse(parent.text());
            if !text.is_empty() {
                return Some(text);
            }
        }
    }

    let following = input
        .next_siblings()
        .find_map(|node| node.value().as_text().map(|text| text.trim().to_string()))
        .filter(|text| !text.is_empty())?;
    Some(following)
}

fn collapse<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Era Conversion Tests ====================

    #[test]
    fn test_reiwa_era_label() {
        assert_eq!(era_to_gregorian("令和7年春期"), Some(2025));
        assert_eq!(era_to_gregorian("令和元年?"), None); // 元 carries no digits
    }

    #[test]
    fn test_heisei_and_showa_era_labels() {
        assert_eq!(era_to_gregorian("平成31年春期"), Some(2019));
        assert_eq!(era_to_gregorian("昭和63年秋期"), Some(1988));
    }

    #[test]
    fn test_plain_gregorian_label() {
        assert_eq!(era_to_gregorian("2024春"), Some(2024));
    }

    #[test]
    fn test_unparseable_label() {
        assert_eq!(era_to_gregorian("春期"), None);
        assert_eq!(era_to_gregorian(""), None);
    }

    // ==================== Landing Page Parse Tests ====================

    const LANDING: &str = r#"<html><body><form>
        <label><input type="checkbox" name="times[]" value="07">令和7年春期</label>
        <label><input type="checkbox" name="times[]" value="06">令和6年春期</label>
        <input type="checkbox" name="times[]" value="xx">不明な回
        <input type="checkbox" name="times[]" value="">空
    </form></body></html>"#;

    #[test]
    fn test_parse_sessions_reads_labels_and_codes() {
        let sessions = parse_sessions(LANDING, "https://example.com/a.php");
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].label, "令和7年春期");
        assert_eq!(sessions[0].year, 2025);
        assert_eq!(sessions[0].times_code, "07");
        assert_eq!(sessions[1].times_code, "06");
        assert_eq!(sessions[0].base_url, "https://example.com/a.php");
    }

    #[test]
    fn test_parse_sessions_reads_sibling_text_label() {
        let html = r#"<form><input type="checkbox" name="times[]" value="05"> 令和5年秋期 </form>"#;
        let sessions = parse_sessions(html, "https://example.com");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].label, "令和5年秋期");
        assert_eq!(sessions[0].year, 2023);
    }

    #[test]
    fn test_parse_sessions_skips_duplicate_labels() {
        let html = r#"<form>
            <label><input name="times[]" value="07">令和7年春期</label>
            <label><input name="times[]" value="99">令和7年春期</label>
        </form>"#;
        let sessions = parse_sessions(html, "https://example.com");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].times_code, "07");
    }

    #[test]
    fn test_parse_sessions_empty_page() {
        assert!(parse_sessions("<html></html>", "https://example.com").is_empty());
    }
}
