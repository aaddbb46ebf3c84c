//! crates/ctxt_core/src/botdetect.rs
//!
//! Client classification from the declared User-Agent string: is the caller
//! an automated crawler, which kind, and should it receive the raw-text
//! representation of a stored conversion instead of the rendered page.

use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Crawler category buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BotCategory {
    SearchEngine,
    SeoTool,
    AiCrawler,
    SocialMedia,
    Archiver,
    SecurityScanner,
    GenericBot,
}

impl BotCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            BotCategory::SearchEngine => "search_engine",
            BotCategory::SeoTool => "seo_tool",
            BotCategory::AiCrawler => "ai_crawler",
            BotCategory::SocialMedia => "social_media",
            BotCategory::Archiver => "archiver",
            BotCategory::SecurityScanner => "security_scanner",
            BotCategory::GenericBot => "generic_bot",
        }
    }
}

/// The outcome of one classification. Ephemeral, computed fresh per request.
#[derive(Debug, Clone)]
pub struct ClientClassification {
    pub is_bot: bool,
    /// Canonical bot name (curated table) or the matched generic token.
    pub name: Option<String>,
    /// `None` for humans, and for bot-like requests whose identity string
    /// was too degenerate to categorize.
    pub category: Option<BotCategory>,
    pub confidence: f32,
    pub user_agent: Option<String>,
}

impl ClientClassification {
    /// Whether the raw-text representation should be served.
    ///
    /// Search engines, SEO tools, AI crawlers and archivers get plain text,
    /// as do degenerate identities we could not categorize. Social-media
    /// previewers and security scanners are bots but still receive the
    /// rendered form; that asymmetry is policy.
    pub fn should_serve_plain_text(&self) -> bool {
        if !self.is_bot {
            return false;
        }
        match self.category {
            None => true,
            Some(category) => matches!(
                category,
                BotCategory::SearchEngine
                    | BotCategory::SeoTool
                    | BotCategory::AiCrawler
                    | BotCategory::Archiver
            ),
        }
    }
}

/// Identity strings that carry no usable information. Treated as bots so
/// unknown callers get the cheap plain-text path.
const DEGENERATE_AGENTS: &[&str] = &["-", "null", "none"];

/// Curated table of known crawlers: canonical name to the literal substrings
/// expected in the identity string. First match wins. Substrings are stored
/// lowercase; matching is done against the lowercased User-Agent.
const KNOWN_BOTS: &[(&str, &[&str])] = &[
    // Search engines
    ("Googlebot", &["googlebot/", "googleother"]),
    ("BingBot", &["bingbot/", "bingpreview/"]),
    // OpenAI
    ("GPTBot", &["gptbot/"]),
    ("ChatGPT-User", &["chatgpt-user/"]),
    ("OAI-SearchBot", &["oai-searchbot/"]),
    // Anthropic
    ("ClaudeBot", &["claudebot/"]),
    ("Claude-SearchBot", &["claude-searchbot/"]),
    ("Anthropic-AI", &["anthropic-ai"]),
    ("Claude-Web", &["claude-web"]),
    // Other AI companies
    ("Google-Extended", &["google-extended/"]),
    ("Google-CloudVertexBot", &["google-cloudvertexbot/"]),
    ("PerplexityBot", &["perplexitybot/"]),
    ("Cohere-AI", &["cohere-ai", "cohere-training-data-crawler"]),
    ("Meta-ExternalAgent", &["meta-externalagent"]),
    ("ByteSpider", &["bytespider/"]),
    ("PetalBot", &["petalbot/"]),
    ("Amazonbot", &["amazonbot/"]),
    ("YouBot", &["youbot/"]),
    ("Diffbot", &["diffbot/"]),
    ("AppleBot-Extended", &["applebot-extended/"]),
    // SEO tools
    ("AhrefsBot", &["ahrefsbot/"]),
    ("SemrushBot", &["semrushbot/"]),
    ("MJ12Bot", &["mj12bot/"]),
    ("DotBot", &["dotbot/"]),
    // Social previewers
    ("FacebookExternalHit", &["facebookexternalhit"]),
    ("Twitterbot", &["twitterbot"]),
    ("LinkedInBot", &["linkedinbot"]),
    ("Slackbot", &["slackbot"]),
    ("WhatsApp", &["whatsapp/"]),
    ("TelegramBot", &["telegrambot"]),
    ("Discordbot", &["discordbot"]),
    // Archivers
    ("InternetArchive", &["ia_archiver", "archive.org_bot"]),
    ("Wayback", &["wayback"]),
];

/// Broad bot-indicating tokens for the generic fallback match.
const GENERIC_PATTERNS: &[&str] = &[
    r"googlebot",
    r"bingbot",
    r"slurp",
    r"duckduckbot",
    r"baiduspider",
    r"yandexbot",
    r"facebookexternalhit",
    r"ahrefsbot",
    r"semrushbot",
    r"majestic",
    r"mj12bot",
    r"dotbot",
    r"screaming frog",
    r"spyfu",
    r"serpstatbot",
    r"gptbot",
    r"chatgpt-user",
    r"oai-searchbot",
    r"claudebot",
    r"claude-searchbot",
    r"perplexitybot",
    r"anthropic-ai",
    r"claude-web",
    r"openai",
    r"cohere-ai",
    r"cohere-training-data-crawler",
    r"google-extended",
    r"google-cloudvertexbot",
    r"meta-externalagent",
    r"bytespider",
    r"petalbot",
    r"amazonbot",
    r"youbot",
    r"diffbot",
    r"applebot-extended",
    r"bot\b",
    r"crawler",
    r"spider",
    r"scraper",
    r"curl",
    r"wget",
    r"python",
    r"requests",
    r"urllib",
    r"twitterbot",
    r"linkedinbot",
    r"whatsapp",
    r"telegrambot",
    r"slackbot",
    r"discordbot",
    r"archive\.org",
    r"wayback",
    r"ia_archiver",
    r"nessus",
    r"nikto",
    r"sqlmap",
    r"nmap",
];

pub struct BotDetector {
    pattern: Regex,
}

impl Default for BotDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl BotDetector {
    pub fn new() -> Self {
        let combined = GENERIC_PATTERNS.join("|");
        let pattern = RegexBuilder::new(&combined)
            .case_insensitive(true)
            .build()
            .expect("valid bot pattern alternation");
        Self { pattern }
    }

    pub fn classify(&self, user_agent: Option<&str>) -> ClientClassification {
        let Some(raw) = user_agent else {
            return Self::degenerate(None);
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() || DEGENERATE_AGENTS.contains(&trimmed.to_lowercase().as_str()) {
            return Self::degenerate(Some(raw));
        }

        let lowered = raw.to_lowercase();

        for (name, needles) in KNOWN_BOTS {
            if needles.iter().any(|needle| lowered.contains(needle)) {
                return ClientClassification {
                    is_bot: true,
                    name: Some((*name).to_string()),
                    category: Some(bucket(name)),
                    confidence: 0.95,
                    user_agent: Some(raw.to_string()),
                };
            }
        }

        if let Some(found) = self.pattern.find(&lowered) {
            let token = found.as_str();
            return ClientClassification {
                is_bot: true,
                name: Some(token.to_string()),
                category: Some(bucket(token)),
                confidence: 0.8,
                user_agent: Some(raw.to_string()),
            };
        }

        ClientClassification {
            is_bot: false,
            name: None,
            category: None,
            confidence: 0.0,
            user_agent: Some(raw.to_string()),
        }
    }

    fn degenerate(user_agent: Option<&str>) -> ClientClassification {
        ClientClassification {
            is_bot: true,
            name: None,
            category: None,
            confidence: 1.0,
            user_agent: user_agent.map(|s| s.to_string()),
        }
    }
}

/// Keyword-bucket classification of a bot identifier (canonical name or
/// matched token) into a category.
fn bucket(identifier: &str) -> BotCategory {
    let id = identifier.to_lowercase();
    let has = |terms: &[&str]| terms.iter().any(|t| id.contains(t));

    if has(&["google-extended", "google-cloudvertex"]) {
        // Checked before the search-engine bucket would swallow "google".
        BotCategory::AiCrawler
    } else if has(&["google", "bing", "yahoo", "slurp", "duckduck", "baidu", "yandex"]) {
        BotCategory::SearchEngine
    } else if has(&[
        "ahrefs", "semrush", "majestic", "mj12", "dotbot", "screaming frog", "spyfu", "serpstat",
    ]) {
        BotCategory::SeoTool
    } else if has(&[
        "gpt",
        "chatgpt",
        "oai-search",
        "claude",
        "perplexity",
        "openai",
        "anthropic",
        "cohere",
        "meta-external",
        "bytespider",
        "petalbot",
        "amazonbot",
        "youbot",
        "diffbot",
        "applebot-extended",
    ]) {
        BotCategory::AiCrawler
    } else if has(&[
        "facebook", "twitter", "linkedin", "whatsapp", "telegram", "slack", "discord",
    ]) {
        BotCategory::SocialMedia
    } else if has(&["archive", "wayback", "ia_archiver"]) {
        BotCategory::Archiver
    } else if has(&["nessus", "nikto", "sqlmap", "nmap"]) {
        BotCategory::SecurityScanner
    } else {
        BotCategory::GenericBot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BotDetector {
        BotDetector::new()
    }

    #[test]
    fn googlebot_is_a_search_engine_and_gets_plain_text() {
        let c = detector().classify(Some("Mozilla/5.0 (compatible; Googlebot/2.1)"));
        assert!(c.is_bot);
        assert_eq!(c.category, Some(BotCategory::SearchEngine));
        assert_eq!(c.confidence, 0.95);
        assert!(c.should_serve_plain_text());
    }

    #[test]
    fn empty_agent_is_treated_as_a_bot() {
        let c = detector().classify(Some(""));
        assert!(c.is_bot);
        assert_eq!(c.category, None);
        assert_eq!(c.confidence, 1.0);
        assert!(c.should_serve_plain_text());
    }

    #[test]
    fn absent_and_degenerate_agents_are_bots() {
        for ua in [None, Some("-"), Some("null"), Some("none"), Some("  ")] {
            let c = detector().classify(ua);
            assert!(c.is_bot, "{ua:?} should classify as bot");
            assert!(c.should_serve_plain_text());
        }
    }

    #[test]
    fn a_desktop_browser_is_human() {
        let c = detector().classify(Some(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120",
        ));
        assert!(!c.is_bot);
        assert_eq!(c.confidence, 0.0);
        assert!(!c.should_serve_plain_text());
    }

    #[test]
    fn facebook_previewer_is_a_bot_but_gets_the_rendered_page() {
        let c = detector().classify(Some("facebookexternalhit/1.1"));
        assert!(c.is_bot);
        assert_eq!(c.category, Some(BotCategory::SocialMedia));
        assert!(!c.should_serve_plain_text());
    }

    #[test]
    fn ai_crawlers_get_plain_text() {
        for ua in ["GPTBot/1.0", "ClaudeBot/1.0; +https://anthropic.com", "PerplexityBot/1.0"] {
            let c = detector().classify(Some(ua));
            assert_eq!(c.category, Some(BotCategory::AiCrawler), "{ua}");
            assert_eq!(c.confidence, 0.95);
            assert!(c.should_serve_plain_text(), "{ua}");
        }
    }

    #[test]
    fn seo_tools_get_plain_text() {
        let c = detector().classify(Some("Mozilla/5.0 (compatible; AhrefsBot/7.0)"));
        assert_eq!(c.category, Some(BotCategory::SeoTool));
        assert!(c.should_serve_plain_text());
    }

    #[test]
    fn security_scanners_do_not_get_plain_text() {
        let c = detector().classify(Some("sqlmap/1.7-dev"));
        assert!(c.is_bot);
        assert_eq!(c.category, Some(BotCategory::SecurityScanner));
        assert!(!c.should_serve_plain_text());
    }

    #[test]
    fn generic_tokens_fall_back_to_pattern_matching() {
        let c = detector().classify(Some("curl/8.4.0"));
        assert!(c.is_bot);
        assert_eq!(c.confidence, 0.8);
        assert_eq!(c.category, Some(BotCategory::GenericBot));
        assert!(!c.should_serve_plain_text());
    }

    #[test]
    fn wayback_machine_is_an_archiver() {
        let c = detector().classify(Some("Mozilla/5.0 (compatible; archive.org_bot)"));
        assert_eq!(c.category, Some(BotCategory::Archiver));
        assert!(c.should_serve_plain_text());
    }
}
