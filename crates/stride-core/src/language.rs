//! Language code normalization and Accept-Language negotiation.
//!
//! Feedback versions are keyed by normalized codes: `en`, `zhTW`, `zhCN`,
//! `ja`, `ko`, `es`, `fr`, `de`, and any other primary subtag lower-cased.

/// Languages with localized fallback text and prompt instructions.
pub const SUPPORTED_LANGUAGES: &[&str] = &["en", "zhTW", "zhCN", "ja", "ko", "es", "fr", "de"];

/// Default storage language for `feedbackText`.
pub const DEFAULT_CANONICAL_LANGUAGE: &str = "en";

/// Normalize a BCP-47-ish tag (`zh-TW`, `en_US`, `zh-Hant`) to a storage key.
///
/// An empty or wildcard tag normalizes to `canonical`.
pub fn normalize_language(code: &str, canonical: &str) -> String {
    let trimmed = code.trim();
    if trimmed.is_empty() || trimmed == "*" {
        return canonical.to_string();
    }
    let lower = trimmed.replace('_', "-").to_lowercase();
    let mut parts = lower.split('-');
    let primary = parts.next().unwrap_or_default();
    let rest: Vec<&str> = parts.collect();

    if primary == "zh" || lower == "zhtw" || lower == "zhcn" {
        let traditional = lower == "zhtw"
            || rest
                .iter()
                .any(|p| matches!(*p, "tw" | "hk" | "mo" | "hant"));
        return if traditional { "zhTW" } else { "zhCN" }.to_string();
    }
    primary.to_string()
}

/// Human-readable name used in prompts ("respond in ...").
pub fn language_name(code: &str) -> &'static str {
    match code {
        "zhTW" => "Traditional Chinese (繁體中文)",
        "zhCN" => "Simplified Chinese (简体中文)",
        "ja" => "Japanese (日本語)",
        "ko" => "Korean (한국어)",
        "es" => "Spanish (Español)",
        "fr" => "French (Français)",
        "de" => "German (Deutsch)",
        _ => "English",
    }
}

/// Pick the caller's language from an `Accept-Language` header value.
///
/// Entries are ranked by their `q` weight (default 1.0, ties keep header
/// order); the first supported language wins. Falls back to `canonical`.
pub fn negotiate_language(accept_language: Option<&str>, canonical: &str) -> String {
    let Some(header) = accept_language else {
        return canonical.to_string();
    };

    let mut ranked: Vec<(f32, usize, String)> = header
        .split(',')
        .enumerate()
        .filter_map(|(idx, entry)| {
            let mut pieces = entry.split(';');
            let tag = pieces.next()?.trim();
            if tag.is_empty() {
                return None;
            }
            let q = pieces
                .filter_map(|p| p.trim().strip_prefix("q="))
                .find_map(|v| v.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            if q <= 0.0 {
                return None;
            }
            Some((q, idx, normalize_language(tag, canonical)))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));

    ranked
        .into_iter()
        .map(|(_, _, code)| code)
        .find(|code| SUPPORTED_LANGUAGES.contains(&code.as_str()))
        .unwrap_or_else(|| canonical.to_string())
}
