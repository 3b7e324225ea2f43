//! Small, synchronous extraction helpers shared by the strategies.
//!
//! Parsed documents are not `Send`, so every helper parses, extracts and
//! drops the DOM before returning.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("integer regex"));

static CHAPTER_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:chapter|chap|ch|episode|ep)\.?\s*#?\s*(\d+)").expect("chapter regex")
});

fn parse_selector(selector: &str) -> anyhow::Result<Selector> {
    Selector::parse(selector).map_err(|err| anyhow::anyhow!("invalid selector {selector:?}: {err}"))
}

/// Counts elements for each selector in order; the first non-zero count wins.
pub fn count_first_matching(html: &str, selectors: &[String]) -> anyhow::Result<u32> {
    let doc = Html::parse_document(html);
    for selector in selectors {
        let parsed = parse_selector(selector)?;
        let count = doc.select(&parsed).count();
        if count > 0 {
            return Ok(u32::try_from(count).unwrap_or(u32::MAX));
        }
    }
    Ok(0)
}

/// Trimmed text of the first element matched by any selector, in order.
pub fn first_text(html: &str, selectors: &[String]) -> anyhow::Result<Option<String>> {
    let doc = Html::parse_document(html);
    for selector in selectors {
        let parsed = parse_selector(selector)?;
        for element in doc.select(&parsed) {
            let text = element.text().collect::<Vec<_>>().join(" ");
            let text = collapse_whitespace(&text);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }
    Ok(None)
}

/// Value of `attr` on the first element matched by any selector, in order.
pub fn first_attr(html: &str, selectors: &[String], attr: &str) -> anyhow::Result<Option<String>> {
    let doc = Html::parse_document(html);
    for selector in selectors {
        let parsed = parse_selector(selector)?;
        let found = doc
            .select(&parsed)
            .filter_map(|element| element.value().attr(attr))
            .map(str::trim)
            .find(|value| !value.is_empty());
        if let Some(value) = found {
            return Ok(Some(value.to_owned()));
        }
    }
    Ok(None)
}

pub fn integers(text: &str) -> impl Iterator<Item = u64> + '_ {
    INTEGER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
}

/// Largest integer embedded in any of `texts` that is strictly below `ceiling`.
pub fn max_below_ceiling<S: AsRef<str>>(texts: &[S], ceiling: u32) -> u32 {
    texts
        .iter()
        .flat_map(|text| integers(text.as_ref()))
        .filter(|n| *n < u64::from(ceiling))
        .max()
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0)
}

/// Chapter number from a "latest chapter" label such as
/// `"Chapter 1234: The End"` or `"Vol. 3 Ch. 87"`.
///
/// An explicit chapter keyword wins; otherwise the last integer in the label.
pub fn chapter_number_from_label(label: &str) -> Option<u32> {
    if let Some(caps) = CHAPTER_NUMBER.captures(label)
        && let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok())
    {
        return Some(n);
    }
    INTEGER
        .find_iter(label)
        .last()
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Parses a count badge such as `"(1,234)"` or `"87 Chapters"`.
pub fn parse_count_badge(text: &str) -> Option<u32> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ',' | '.' | '\u{a0}'))
        .collect();
    integers(&cleaned)
        .next()
        .and_then(|n| u32::try_from(n).ok())
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
