//! SEO analysis for generated and edited articles.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub const RECOMMENDED_DENSITY: &str = "1-2%";
pub const FALLBACK_META_TITLE: &str = "Логистика из Азии в Россию";

static SLUG_STRIP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9а-яё\-\s]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static DASHES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").unwrap());

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordDensity {
    pub total_words: usize,
    /// Percent of total words, per keyword as given.
    pub densities: BTreeMap<String, f64>,
    pub recommended: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Readability {
    /// Flesch reading ease; `None` for text without words.
    pub flesch: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingStructure {
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
    pub ok: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaTags {
    pub title: String,
    pub description: String,
    pub keywords: String,
}

/// Related article appended by [`add_internal_links`].
#[derive(Debug, Clone)]
pub struct RelatedLink {
    pub title: String,
    pub url: String,
}

/// Occurrences of each keyword (case-insensitive substring) over total words.
pub fn keyword_density(content: &str, keywords: &[String]) -> KeywordDensity {
    let total_words = content.split_whitespace().count().max(1);
    let lower = content.to_lowercase();
    let densities = keywords
        .iter()
        .map(|kw| {
            let needle = kw.to_lowercase();
            let count = if needle.is_empty() {
                0
            } else {
                lower.matches(needle.as_str()).count()
            };
            (kw.clone(), round_to(count as f64 / total_words as f64 * 100.0, 3))
        })
        .collect();
    KeywordDensity {
        total_words,
        densities,
        recommended: RECOMMENDED_DENSITY.to_string(),
    }
}

/// Flesch reading ease with a vowel-group syllable count (Latin and Cyrillic).
pub fn readability(content: &str) -> Readability {
    let words: Vec<&str> = content
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return Readability { flesch: None };
    }
    let sentences = content
        .split(['.', '!', '?', '\n'])
        .filter(|s| s.chars().any(char::is_alphabetic))
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|w| syllable_count(w)).sum();

    let words_n = words.len() as f64;
    let score = 206.835
        - 1.015 * (words_n / sentences as f64)
        - 84.6 * (syllables as f64 / words_n);
    Readability {
        flesch: Some(round_to(score, 2)),
    }
}

fn syllable_count(word: &str) -> usize {
    const VOWELS: &str = "aeiouyаеёиоуыэюя";
    let mut groups = 0;
    let mut in_vowel = false;
    for c in word.to_lowercase().chars() {
        let vowel = VOWELS.contains(c);
        if vowel && !in_vowel {
            groups += 1;
        }
        in_vowel = vowel;
    }
    groups.max(1)
}

/// Markdown (`#`, `##`, `###`) or HTML (`<h1>`…) headings. A sound article
/// has at least one H1 and two H2s.
pub fn heading_structure(content: &str) -> HeadingStructure {
    let (mut h1, mut h2, mut h3) = (0, 0, 0);
    for line in content.lines() {
        let line = line.trim();
        let lower = line.to_lowercase();
        if line.starts_with("# ") || lower.starts_with("<h1") {
            h1 += 1;
        } else if line.starts_with("## ") || lower.starts_with("<h2") {
            h2 += 1;
        } else if line.starts_with("### ") || lower.starts_with("<h3") {
            h3 += 1;
        }
    }
    HeadingStructure {
        h1,
        h2,
        h3,
        ok: h1 >= 1 && h2 >= 2,
    }
}

/// H2 heading texts, in order.
pub fn outline(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|l| l.trim().strip_prefix("## "))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect()
}

/// schema.org `Article` markup.
pub fn schema_markup(
    headline: &str,
    outline: &[String],
    keywords: &[String],
    published_at: Option<DateTime<Utc>>,
) -> serde_json::Value {
    serde_json::json!({
        "@context": "https://schema.org",
        "@type": "Article",
        "headline": headline,
        "datePublished": published_at.map(|t| t.to_rfc3339()),
        "articleSection": outline,
        "keywords": keywords.join(", "),
    })
}

/// First line of `content` without heading markers, at most `max` chars.
pub fn first_line(content: &str, max: usize) -> String {
    let line = content.lines().next().unwrap_or_default();
    let line = line.trim().trim_start_matches('#').trim();
    take_chars(line, max).trim().to_string()
}

pub fn meta_tags(content: &str, keywords: &[String]) -> MetaTags {
    let title = first_line(content, 60);
    MetaTags {
        title: if title.is_empty() {
            FALLBACK_META_TITLE.to_string()
        } else {
            title
        },
        description: take_chars(content, 160).trim().to_string(),
        keywords: keywords
            .iter()
            .take(10)
            .cloned()
            .collect::<Vec<_>>()
            .join(", "),
    }
}

const LINKS_HEADER: &str = "\n\nПолезные материалы:\n";

/// Append up to five related links. Content that already carries a links
/// block is returned unchanged.
pub fn add_internal_links(content: &str, related: &[RelatedLink]) -> String {
    if related.is_empty() || content.contains(LINKS_HEADER.trim()) {
        return content.to_string();
    }
    let links: Vec<String> = related
        .iter()
        .take(5)
        .map(|r| format!("- {} — {}", r.title, r.url))
        .collect();
    format!("{}{}{}", content, LINKS_HEADER, links.join("\n"))
}

/// URL slug: lowercase Latin/Cyrillic letters, digits and dashes.
pub fn slugify(text: &str) -> String {
    let lower = text.trim().to_lowercase();
    let stripped = SLUG_STRIP_RE.replace_all(&lower, "");
    let dashed = WHITESPACE_RE.replace_all(stripped.trim(), "-");
    let collapsed = DASHES_RE.replace_all(&dashed, "-");
    let slug = take_chars(collapsed.trim_matches('-'), 255)
        .trim_end_matches('-')
        .to_string();
    if slug.is_empty() {
        format!("article-{}", Utc::now().timestamp())
    } else {
        slug
    }
}

pub(crate) fn take_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
