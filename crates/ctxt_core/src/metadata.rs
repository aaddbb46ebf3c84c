//! crates/ctxt_core/src/metadata.rs
//!
//! Deterministic metadata derivation from extracted markdown: title, word
//! count, reading time, domain and meta description. Token counting lives
//! behind the [`TokenEstimator`](crate::ports::TokenEstimator) port because
//! it needs a model tokenizer.

use std::sync::OnceLock;

use regex::Regex;
use url::Url;

/// Markdown punctuation stripped before word counting and description
/// extraction.
fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[#*`_\[\]()]+").expect("valid punctuation pattern"))
}

/// First `# ` heading within the first 10 lines, if any.
pub fn extract_title(markdown: &str) -> Option<String> {
    markdown.lines().take(10).find_map(|line| {
        let line = line.trim();
        line.strip_prefix("# ").map(|rest| rest.trim().to_string())
    })
}

pub fn count_words(text: &str) -> u32 {
    let clean = punctuation_re().replace_all(text, "");
    clean.split_whitespace().count() as u32
}

/// Reading time in minutes at an average 200 words per minute. Never zero.
pub fn reading_time(word_count: u32) -> u32 {
    ((word_count as f64 / 200.0).round() as u32).max(1)
}

/// Host component of the source URL with a leading `www.` stripped.
pub fn domain_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or("unknown");
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

const DESCRIPTION_FALLBACK: &str = "Clean markdown conversion from webpage";
const DESCRIPTION_MAX: usize = 197;

/// Meta description: the first substantial line of cleaned content that is
/// not just the title repeated, truncated to fit the 200-char column.
pub fn describe(content: &str, title: Option<&str>) -> String {
    let clean = punctuation_re().replace_all(content, "");

    let mut description = clean
        .lines()
        .map(str::trim)
        .find(|line| {
            line.len() > 50 && title.map_or(true, |t| !t.is_empty() && !line.starts_with(t))
        })
        .unwrap_or(DESCRIPTION_FALLBACK)
        .to_string();

    if description.len() > DESCRIPTION_MAX {
        let mut cut = DESCRIPTION_MAX - 3;
        while !description.is_char_boundary(cut) {
            cut -= 1;
        }
        description.truncate(cut);
        description.push_str("...");
    }

    description
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_from_first_heading() {
        let md = "Some preamble\n# Hello World\ncontent";
        assert_eq!(extract_title(md).as_deref(), Some("Hello World"));
    }

    #[test]
    fn title_ignored_after_ten_lines() {
        let md = format!("{}# Too Late\n", "filler\n".repeat(10));
        assert_eq!(extract_title(&md), None);
    }

    #[test]
    fn subheadings_are_not_titles() {
        assert_eq!(extract_title("## Section\ntext"), None);
    }

    #[test]
    fn word_count_strips_markdown_punctuation() {
        assert_eq!(count_words("# Hello *world* [link](url)"), 3);
        assert_eq!(count_words(""), 0);
    }

    #[test]
    fn reading_time_is_never_zero() {
        assert_eq!(reading_time(0), 1);
        assert_eq!(reading_time(100), 1);
        assert_eq!(reading_time(400), 2);
        assert_eq!(reading_time(1000), 5);
    }

    #[test]
    fn domain_strips_www() {
        let url = Url::parse("https://www.example.com/article").unwrap();
        assert_eq!(domain_of(&url), "example.com");
        let bare = Url::parse("https://blog.example.org/x").unwrap();
        assert_eq!(domain_of(&bare), "blog.example.org");
    }

    #[test]
    fn description_picks_first_substantial_line() {
        let content = "# Title\nshort\nThis is a sufficiently long paragraph that should become the description text.\nmore";
        let desc = describe(content, Some("Title"));
        assert!(desc.starts_with("This is a sufficiently long paragraph"));
    }

    #[test]
    fn description_skips_title_repetition() {
        let content =
            "The Article Title repeated here with plenty of extra words to cross fifty chars\nA different long line that also crosses the fifty character threshold easily.";
        let desc = describe(content, Some("The Article Title"));
        assert!(desc.starts_with("A different long line"));
    }

    #[test]
    fn description_falls_back_when_nothing_qualifies() {
        assert_eq!(describe("short\nlines\nonly", None), DESCRIPTION_FALLBACK);
    }

    #[test]
    fn description_truncates_to_fit_column() {
        let long_line = "x".repeat(300);
        let desc = describe(&long_line, None);
        assert_eq!(desc.len(), DESCRIPTION_MAX);
        assert!(desc.ends_with("..."));
    }
}
