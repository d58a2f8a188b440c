// src/matching/normalize.rs - Postcode, name and city canonicalization
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Tokens shorter than this never count towards fuzzy overlap ("al", "ul", "e").
pub const MIN_MEANINGFUL_TOKEN_LEN: usize = 3;

const INWARD_CODE_LEN: usize = 3;

static POSTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]?[0-9][A-Z]{2}$").expect("postcode grammar regex")
});

static EMBEDDED_POSTCODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b([A-Z]{1,2}[0-9][A-Z0-9]?\s*[0-9][A-Z]{2})\b")
        .expect("embedded postcode regex")
});

/// Spelling variants collapsed before generic-word removal.
const SYNONYMS: [(&str, &str); 10] = [
    ("center", "centre"),
    ("masjed", "masjid"),
    ("musjid", "masjid"),
    ("mosques", "mosque"),
    ("jame", "jamia"),
    ("jami", "jamia"),
    ("jamme", "jamia"),
    ("jamiah", "jamia"),
    ("jamiya", "jamia"),
    ("educational", "education"),
];

/// Generic words and phrases stripped from names, longest first.
const GENERIC_PHRASES: [&[&str]; 9] = [
    &["and", "islamic", "centre"],
    &["islamic", "cultural", "centre"],
    &["islamic", "centre"],
    &["community", "centre"],
    &["education", "centre"],
    &["cultural", "centre"],
    &["mosque"],
    &["masjid"],
    &["the"],
];

/// Council names that differ from the town people search for.
const CITY_FIXES: [(&str, &str); 7] = [
    ("Midlesbrough", "Middlesbrough"),
    ("Glasgow City", "Glasgow"),
    ("Aberdeen City", "Aberdeen"),
    ("Bournemouth, Christchurch and Poole", "Bournemouth"),
    ("Oadby and Wigston", "Oadby"),
    ("Blackburn with Darwen", "Blackburn"),
    ("Kingston upon Hull", "Hull"),
];

/// Comparison key for a postcode: no whitespace, uppercase.
pub fn normalize_postcode(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

pub fn is_valid_postcode(raw: &str) -> bool {
    POSTCODE_RE.is_match(&normalize_postcode(raw))
}

/// Display form `OUTWARD INWARD`, or `None` when the grammar does not match.
pub fn format_postcode(raw: &str) -> Option<String> {
    let normalized = normalize_postcode(raw);
    if !POSTCODE_RE.is_match(&normalized) {
        return None;
    }
    let split = normalized.len() - INWARD_CODE_LEN;
    Some(format!("{} {}", &normalized[..split], &normalized[split..]))
}

/// Outward code of an already normalized postcode ("BD30DT" -> "BD3").
pub fn outward_code(normalized: &str) -> Option<&str> {
    if normalized.len() <= INWARD_CODE_LEN || !normalized.is_ascii() {
        return None;
    }
    Some(&normalized[..normalized.len() - INWARD_CODE_LEN])
}

/// First postcode-shaped substring of free text, in display form.
pub fn extract_postcode(text: &str) -> Option<String> {
    EMBEDDED_POSTCODE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| format_postcode(m.as_str()))
}

/// Canonical name used on both sides of every name comparison.
///
/// Idempotent: generic-phrase removal repeats until nothing changes, so a
/// phrase that only becomes adjacent after an earlier removal is caught too.
pub fn normalize_name(raw: &str) -> String {
    let lowered = raw.to_lowercase().replace('&', " and ");
    let spaced: String = lowered
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '`'))
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut tokens: Vec<&str> = spaced.split_whitespace().map(canonical_token).collect();
    while strip_generic_phrases(&mut tokens) {}
    tokens.join(" ")
}

fn canonical_token(token: &str) -> &str {
    SYNONYMS
        .iter()
        .find(|(variant, _)| *variant == token)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(token)
}

/// One left-to-right removal pass. Returns whether anything was removed.
fn strip_generic_phrases(tokens: &mut Vec<&str>) -> bool {
    let mut removed = false;
    let mut i = 0;
    while i < tokens.len() {
        let hit = GENERIC_PHRASES
            .iter()
            .find(|phrase| tokens[i..].starts_with(phrase));
        match hit {
            Some(phrase) => {
                tokens.drain(i..i + phrase.len());
                removed = true;
            }
            None => i += 1,
        }
    }
    removed
}

/// Tokens long enough to count as shared evidence in fuzzy matching.
pub fn meaningful_tokens(normalized_name: &str) -> HashSet<&str> {
    normalized_name
        .split_whitespace()
        .filter(|t| t.chars().count() >= MIN_MEANINGFUL_TOKEN_LEN)
        .collect()
}

/// Administrative district -> town name shown in the directory.
pub fn clean_city(raw: &str) -> String {
    let mut city = raw.trim();
    if let Some(stripped) = city.strip_prefix("City of ") {
        city = stripped.trim();
    }
    if let Some(stripped) = city.strip_suffix(", City of") {
        city = stripped.trim();
    }
    CITY_FIXES
        .iter()
        .find(|(council, _)| *council == city)
        .map(|(_, town)| town.to_string())
        .unwrap_or_else(|| city.to_string())
}
