//! crates/ctxt_core/src/slug.rs
//!
//! Human-readable slug derivation for stored conversions. Slugs prefer the
//! extracted title, fall back to the URL path, and finally to a content hash
//! of the URL. Uniqueness against the persisted slug set is handled by the
//! pipeline in [`convert`](crate::convert); this module is pure.

use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Base slugs stop here so a collision suffix still fits the column.
const BASE_MAX: usize = 80;
/// Hard ceiling, matching the slug column width.
pub const SLUG_MAX: usize = 100;

fn title_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9\s-]").expect("valid title pattern"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace pattern"))
}

fn hyphen_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-+").expect("valid hyphen pattern"))
}

fn path_strip_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9-]").expect("valid path pattern"))
}

/// Derives the base slug for a conversion. Deterministic for identical
/// `(title, url)` inputs.
pub fn generate(url: &Url, title: Option<&str>) -> String {
    let slug = match title {
        Some(title) if title.trim().len() > 10 => {
            let lowered = title.to_lowercase();
            let stripped = title_strip_re().replace_all(&lowered, "");
            let hyphenated = whitespace_re().replace_all(stripped.trim(), "-");
            let collapsed = hyphen_run_re().replace_all(&hyphenated, "-");
            truncate_ascii(&collapsed, BASE_MAX).trim_matches('-').to_string()
        }
        _ => {
            let path = url.path().trim_matches('/').replace('/', "-").to_lowercase();
            let stripped = path_strip_re().replace_all(&path, "");
            truncate_ascii(&stripped, BASE_MAX).trim_matches('-').to_string()
        }
    };

    if slug.len() < 3 {
        let digest = Sha256::digest(url.as_str().as_bytes());
        format!("conversion-{}", &hex::encode(digest)[..8])
    } else {
        slug
    }
}

/// Appends `-{counter}` to a base slug, truncating the base so the result
/// never exceeds [`SLUG_MAX`].
pub fn with_suffix(base: &str, counter: u32) -> String {
    let suffix = format!("-{counter}");
    if base.len() + suffix.len() > SLUG_MAX {
        format!("{}{}", &base[..SLUG_MAX - suffix.len()], suffix)
    } else {
        format!("{base}{suffix}")
    }
}

// Inputs are reduced to ascii by the strip patterns above, so a byte cut is
// always on a char boundary.
fn truncate_ascii(s: &str, max: usize) -> &str {
    if s.len() > max {
        &s[..max]
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn title_slug_is_normalized() {
        let slug = generate(
            &url("https://example.com/post"),
            Some("Rust's Async Story -- A Deep   Dive!"),
        );
        assert_eq!(slug, "rusts-async-story-a-deep-dive");
    }

    #[test]
    fn short_titles_fall_back_to_the_path() {
        let slug = generate(&url("https://example.com/blog/2024/intro-to-wasm"), Some("Intro"));
        assert_eq!(slug, "blog-2024-intro-to-wasm");
    }

    #[test]
    fn empty_path_falls_back_to_url_hash() {
        let slug = generate(&url("https://example.com/"), None);
        assert!(slug.starts_with("conversion-"));
        assert_eq!(slug.len(), "conversion-".len() + 8);
    }

    #[test]
    fn generation_is_deterministic() {
        let u = url("https://example.com/article");
        let title = Some("A Perfectly Ordinary Title");
        assert_eq!(generate(&u, title), generate(&u, title));
    }

    #[test]
    fn long_titles_are_truncated_to_base_length() {
        let title = "word ".repeat(40);
        let slug = generate(&url("https://example.com/x"), Some(&title));
        assert!(slug.len() <= 80, "was {}", slug.len());
        assert!(!slug.ends_with('-'));
    }

    #[test]
    fn suffix_never_exceeds_the_column() {
        let base = "a".repeat(80);
        for counter in 1..=150 {
            let slug = with_suffix(&base, counter);
            assert!(slug.len() <= SLUG_MAX, "counter {counter} gave {}", slug.len());
            assert!(slug.ends_with(&format!("-{counter}")));
        }
    }

    #[test]
    fn suffix_appends_when_there_is_room() {
        assert_eq!(with_suffix("short", 3), "short-3");
    }
}
