//! Heuristic evaluator: pure, synchronous spam sub-checks.
//!
//! Each sub-check returns a score contribution and (when triggered) a
//! reason code; the aggregate is compared against the configured spam
//! threshold by the decision engine. No I/O here; the pattern-store
//! fallback lives in the engine so this module stays trivially testable.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ProtectionConfig;
use crate::context::SubmissionContext;
use crate::verdict::ReasonCode;

/// Weighted keyword table. Case-insensitive substring matches.
const SPAM_KEYWORDS: &[(&str, u32)] = &[
    ("casino", 20),
    ("viagra", 25),
    ("cialis", 25),
    ("poker", 15),
    ("loan", 10),
    ("buy now", 15),
    ("click here", 10),
    ("make money", 20),
    ("work from home", 15),
    ("guaranteed", 10),
];

/// Email domains/providers frequently used by throwaway accounts.
const SUSPICIOUS_EMAIL_PARTS: &[&str] = &[".tk", ".ml", ".ga", ".cf", "tempmail", "10minute"];

/// TLDs that dominate author-URL spam.
const SUSPICIOUS_URL_TLDS: &[&str] = &[".tk", ".ml", ".ga", ".cf", ".download", ".click"];

/// Points added per embedded link beyond this count.
const LINK_FREE_ALLOWANCE: usize = 2;
const LINK_POINTS: u32 = 10;

const AUTHOR_POINTS: u32 = 30;
const URL_POINTS: u32 = 40;

/// Score contribution of the timing check (not part of the aggregate;
/// the engine treats a timing hit as a rejection on its own).
pub const TIMING_SCORE: u32 = 60;

static LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://").expect("link regex"));
static SHOUTING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!]{3,}|[?]{3,}").expect("punctuation regex"));

/// Number of embedded http(s) links in a text.
pub fn link_count(content: &str) -> usize {
    LINK_RE.find_iter(content).count()
}

/// Any non-empty honeypot value is authoritative bot evidence.
pub fn honeypot_triggered(ctx: &SubmissionContext) -> bool {
    !ctx.honeypot.trim().is_empty()
}

/// Humans need time to read and fill a form; a missing load timestamp
/// counts as too fast (bots strip the field).
pub fn submitted_too_fast(ctx: &SubmissionContext, min_seconds: u64) -> bool {
    match ctx.fill_time_secs() {
        Some(spent) => spent < min_seconds,
        None => true,
    }
}

/// Result of one content scoring pass.
#[derive(Debug, Clone, Default)]
pub struct ContentScore {
    pub points: u32,
    /// Which signals fired, as indicator labels reused by the learner
    /// and the classifier prompt.
    pub indicators: Vec<String>,
}

/// Score the free-text content against the keyword table plus link,
/// shouting, and punctuation signals.
pub fn score_content(content: &str) -> ContentScore {
    let mut out = ContentScore::default();
    let lower = content.to_lowercase();

    for (keyword, points) in SPAM_KEYWORDS {
        if lower.contains(keyword) {
            out.points += points;
            out.indicators.push(format!("keyword:{keyword}"));
        }
    }

    let links = link_count(content);
    if links > LINK_FREE_ALLOWANCE {
        out.points += (links - LINK_FREE_ALLOWANCE) as u32 * LINK_POINTS;
        out.indicators.push(format!("links:{links}"));
    }

    // Long, entirely uppercase content reads as shouting.
    if content.chars().count() > 20
        && content.chars().any(|c| c.is_alphabetic())
        && content == content.to_uppercase()
    {
        out.points += 15;
        out.indicators.push("all_caps".to_string());
    }

    if SHOUTING_RE.is_match(content) {
        out.points += 10;
        out.indicators.push("excessive_punctuation".to_string());
    }

    out
}

/// Empty/one-char names, URLs in the name field, and disposable email
/// domains mark a suspicious author.
pub fn suspicious_author(ctx: &SubmissionContext) -> bool {
    let name = ctx.author_name.trim();
    if name.chars().count() < 2 {
        return true;
    }
    if LINK_RE.is_match(name) {
        return true;
    }
    if !ctx.author_email.is_empty() {
        let email = ctx.author_email.to_lowercase();
        if SUSPICIOUS_EMAIL_PARTS.iter().any(|p| email.contains(p)) {
            return true;
        }
    }
    false
}

/// Author URLs with deep subdomain chains or throwaway TLDs.
pub fn suspicious_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }
    if url.matches('.').count() > 3 {
        return true;
    }
    let lower = url.to_lowercase();
    SUSPICIOUS_URL_TLDS.iter().any(|tld| lower.contains(tld))
}

/// Aggregate heuristic result for the content/author/URL layer.
#[derive(Debug, Clone, Default)]
pub struct HeuristicReport {
    pub score: u32,
    pub reasons: Vec<ReasonCode>,
    pub indicators: Vec<String>,
}

impl HeuristicReport {
    pub fn is_spam(&self, cfg: &ProtectionConfig) -> bool {
        self.score >= cfg.spam_threshold
    }
}

/// Run the non-authoritative sub-checks and sum their contributions.
pub fn evaluate(ctx: &SubmissionContext) -> HeuristicReport {
    let mut report = HeuristicReport::default();

    let content = score_content(&ctx.content);
    report.score += content.points;
    report.indicators = content.indicators;
    if content.points > 0 {
        report.reasons.push(ReasonCode::ContentAnalysis);
    }

    if suspicious_author(ctx) {
        report.score += AUTHOR_POINTS;
        report.reasons.push(ReasonCode::AuthorAnalysis);
        report.indicators.push("suspicious_author".to_string());
    }

    if suspicious_url(&ctx.author_url) {
        report.score += URL_POINTS;
        report.reasons.push(ReasonCode::UrlAnalysis);
        report.indicators.push("suspicious_url".to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntryKind;

    fn ctx() -> SubmissionContext {
        SubmissionContext {
            content: "A perfectly normal message about the article.".into(),
            author_name: "Jamie".into(),
            author_email: "jamie@example.com".into(),
            author_url: String::new(),
            source_ip: "192.0.2.1".into(),
            user_agent: "Mozilla/5.0 Chrome/124.0".into(),
            form_loaded_at: Some(1_700_000_000),
            submitted_at: 1_700_000_030,
            entry_kind: EntryKind::Comment,
            honeypot: String::new(),
        }
    }

    #[test]
    fn honeypot_fires_on_any_content() {
        let mut c = ctx();
        assert!(!honeypot_triggered(&c));
        c.honeypot = "http://spam.example".into();
        assert!(honeypot_triggered(&c));
        c.honeypot = "   ".into();
        assert!(!honeypot_triggered(&c));
    }

    #[test]
    fn missing_timestamp_counts_as_too_fast() {
        let mut c = ctx();
        assert!(!submitted_too_fast(&c, 3));
        c.form_loaded_at = None;
        assert!(submitted_too_fast(&c, 3));
        c.form_loaded_at = Some(c.submitted_at - 1);
        assert!(submitted_too_fast(&c, 3));
    }

    #[test]
    fn keyword_and_link_scoring() {
        let s = score_content(
            "Buy cheap viagra now!!! http://a.co http://b.co http://c.co http://d.co",
        );
        // viagra 25 + 2 links over allowance x10 + !!! 10
        assert_eq!(s.points, 55);
        assert!(s.indicators.iter().any(|i| i == "keyword:viagra"));
        assert!(s.indicators.iter().any(|i| i == "links:4"));
    }

    #[test]
    fn shouting_detection_requires_length_and_letters() {
        assert_eq!(score_content("OK!").points, 0);
        let s = score_content("THIS IS AN AMAZING OFFER YOU MUST SEE");
        assert_eq!(s.points, 15);
        // Digits-only long content is not shouting.
        assert_eq!(score_content("1234567890 1234567890 123").points, 0);
    }

    #[test]
    fn author_suspicion_cases() {
        let mut c = ctx();
        assert!(!suspicious_author(&c));

        c.author_name = "x".into();
        assert!(suspicious_author(&c));

        c.author_name = "http://spam.example".into();
        assert!(suspicious_author(&c));

        c.author_name = "Jamie".into();
        c.author_email = "throwaway@mailbox.tk".into();
        assert!(suspicious_author(&c));
    }

    #[test]
    fn url_suspicion_cases() {
        assert!(!suspicious_url(""));
        assert!(!suspicious_url("https://example.com/blog"));
        assert!(suspicious_url("http://a.b.c.d.example.com"));
        assert!(suspicious_url("http://win.click/prize"));
    }

    #[test]
    fn low_point_content_hit_still_joins_the_reason_trail() {
        let mut c = ctx();
        // casino 20 + single-char author 30 = 50: the content scorer
        // triggered even though it did not cross the threshold alone.
        c.content = "casino nights every weekend".into();
        c.author_name = "x".into();

        let report = evaluate(&c);
        assert_eq!(report.score, 50);
        assert!(report.reasons.contains(&ReasonCode::ContentAnalysis));
        assert!(report.reasons.contains(&ReasonCode::AuthorAnalysis));
    }

    #[test]
    fn clean_context_scores_near_zero() {
        let report = evaluate(&ctx());
        assert!(report.score < 10, "unexpected score {}", report.score);
        assert!(report.reasons.is_empty());
    }
}
