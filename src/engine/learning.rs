// Kilo Engine — Learning Intent Detector
// Ordered regex table (most specific first) that turns "learn how to use
// Canva" into a capability phrase with a confidence. High confidence runs
// the research flow directly; the middle band produces a clarification
// question carrying a hidden HTML-comment marker, and this module also
// interprets the user's next-turn reply to that marker.

use regex::Regex;
use std::sync::LazyLock;

// ── Intent detection ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LearningIntent {
    /// Cleaned, title-cased capability phrase ("Canva", "Tell Time").
    pub capability: String,
    pub confidence: f64,
}

struct IntentPattern {
    regex: Regex,
    confidence: f64,
}

// Order is deliberate: the generic "connect to X" (0.9) sits after
// "can you … connect to X" (0.7) so the polite form wins at the lower
// confidence, and the catch-all "learn to X" comes last.
static INTENT_PATTERNS: LazyLock<Vec<IntentPattern>> = LazyLock::new(|| {
    let table: Vec<(&str, f64)> = vec![
        (r"(?i)\blearn\s+how\s+to\s+use\s+(.+)", 0.95),
        (r"(?i)\bintegrate\s+with\s+(.+)", 0.9),
        (r"(?i)\badd\s+(.+?)\s+integration\b", 0.9),
        (r"(?i)\bset\s+up\s+(.+)", 0.85),
        (r"(?i)\bi\s+want\s+you\s+to\s+use\s+(.+)", 0.75),
        (r"(?i)\bcan\s+you\s+(?:use|connect\s+to)\s+(.+)", 0.7),
        (r"(?i)\bconnect\s+to\s+(.+)", 0.9),
        (r"(?i)\blearn\s+(?:how\s+)?to\s+(.+)", 0.6),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, confidence)| {
            Regex::new(pattern).ok().map(|regex| IntentPattern { regex, confidence })
        })
        .collect()
});

static TRAILING_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:api|integration|service|platform|tool)\s*$").expect("noise regex")
});

/// Detect a learning intent in raw message text. First pattern wins.
pub fn detect_learning_intent(message: &str) -> Option<LearningIntent> {
    for pattern in INTENT_PATTERNS.iter() {
        if let Some(caps) = pattern.regex.captures(message) {
            if let Some(capability) = clean_capability(&caps[1]) {
                return Some(LearningIntent {
                    capability,
                    confidence: pattern.confidence,
                });
            }
        }
    }
    None
}

/// Strip punctuation, articles, and the trailing api/integration/service/
/// platform/tool word, then title-case. None when the remaining phrase is
/// empty or longer than 100 chars.
fn clean_capability(raw: &str) -> Option<String> {
    let mut phrase = raw.trim().trim_end_matches(['.', '!', '?', ',']).to_string();
    phrase = TRAILING_NOISE.replace(&phrase, "").to_string();
    let phrase = phrase
        .trim()
        .trim_start_matches("the ")
        .trim_start_matches("The ")
        .trim();
    if phrase.is_empty() || phrase.chars().count() > 100 {
        return None;
    }
    Some(title_case(phrase))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Service-name heuristics ─────────────────────────────────────────────

const VERB_STARTERS: &[&str] = &[
    "send", "get", "make", "create", "track", "manage", "check", "tell",
    "find", "look", "help", "write", "read", "do", "be", "go", "schedule",
    "remind", "play",
];

/// A capability phrase that starts with a verb or runs past four words is
/// a task description, not a service name — it needs the open-ended
/// clarification wording.
pub fn looks_like_service_name(name: &str) -> bool {
    let words: Vec<&str> = name.split_whitespace().collect();
    if words.is_empty() || words.len() > 4 {
        return false;
    }
    let first = words[0].to_lowercase();
    !VERB_STARTERS.contains(&first.as_str())
}

/// Well-known brands the affirmative-reply path can resolve a vague
/// capability against.
const KNOWN_SERVICES: &[&str] = &[
    "stripe", "slack", "github", "notion", "spotify", "twilio", "canva",
    "trello", "discord", "shopify", "gmail", "dropbox", "zoom", "figma",
    "airtable", "hubspot", "salesforce", "mailchimp",
];

// ── Clarification marker ────────────────────────────────────────────────

const MARKER_PREFIX: &str = "<!-- learning-clarification:";
const MARKER_SUFFIX: &str = " -->";

pub fn clarification_marker(capability: &str) -> String {
    format!("{}{}{}", MARKER_PREFIX, capability, MARKER_SUFFIX)
}

/// Pull the capability out of a previous assistant message, if it carried
/// a clarification marker.
pub fn extract_clarification_capability(text: &str) -> Option<String> {
    let start = text.find(MARKER_PREFIX)? + MARKER_PREFIX.len();
    let end = text[start..].find(MARKER_SUFFIX)? + start;
    let capability = text[start..end].trim();
    if capability.is_empty() {
        None
    } else {
        Some(capability.to_string())
    }
}

/// Build the user-facing clarification question, marker included. The
/// wording branches on whether the capability reads like a service name.
pub fn clarification_response(capability: &str) -> String {
    let question = if looks_like_service_name(capability) {
        format!(
            "It sounds like you'd like me to work with {}. Shall I research its API and set it up?",
            capability
        )
    } else {
        format!(
            "I can learn a new integration for that. Which API or service should I look into for \"{}\"?",
            capability.to_lowercase()
        )
    };
    format!("{}\n{}", clarification_marker(capability), question)
}

// ── Reply interpretation ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ClarificationReply {
    /// The user declined; fall through to general conversation.
    Aborted,
    /// Proceed with the learning flow using this search query.
    Proceed { search_query: String },
}

const NEGATIVE_TOKENS: &[&str] = &["no", "nope", "never mind", "nevermind", "cancel", "stop", "forget"];

const AFFIRMATIVE_TOKENS: &[&str] =
    &["yes", "yeah", "yep", "sure", "ok", "okay", "please", "go ahead", "do it", "sounds good"];

/// Interpret the user's reply to a clarification question.
pub fn interpret_clarification_reply(capability: &str, reply: &str) -> ClarificationReply {
    let lower = reply.trim().to_lowercase();
    let stripped: String = lower
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();

    if NEGATIVE_TOKENS.iter().any(|t| {
        stripped == *t || stripped.starts_with(&format!("{} ", t)) || stripped.contains(&format!(" {}", t))
    }) {
        return ClarificationReply::Aborted;
    }

    // A reply that names an API or service is the search query, verbatim.
    if lower.contains("api") || lower.contains("service") {
        return ClarificationReply::Proceed { search_query: reply.trim().to_string() };
    }

    // Bare affirmative: search for the capability itself, or a known
    // brand the capability mentions.
    if AFFIRMATIVE_TOKENS.iter().any(|t| stripped == *t || stripped.starts_with(&format!("{} ", t))) {
        let capability_lower = capability.to_lowercase();
        let query = KNOWN_SERVICES
            .iter()
            .find(|s| capability_lower.contains(*s))
            .map(|s| format!("{} API", title_case(s)))
            .unwrap_or_else(|| format!("{} API", capability));
        return ClarificationReply::Proceed { search_query: query };
    }

    // Short non-negative replies are taken as the service name.
    if stripped.split_whitespace().count() < 8 && !stripped.is_empty() {
        return ClarificationReply::Proceed {
            search_query: format!("{} API", reply.trim()),
        };
    }

    ClarificationReply::Aborted
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_learn_wins_with_095() {
        let intent = detect_learning_intent("Learn how to use Canva").unwrap();
        assert_eq!(intent.capability, "Canva");
        assert!((intent.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn integrate_and_set_up() {
        let intent = detect_learning_intent("please integrate with stripe").unwrap();
        assert_eq!(intent.capability, "Stripe");
        assert!((intent.confidence - 0.9).abs() < 1e-9);

        let intent = detect_learning_intent("set up the Notion api").unwrap();
        assert_eq!(intent.capability, "Notion");
        assert!((intent.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn add_integration_captures_middle() {
        let intent = detect_learning_intent("add slack integration please").unwrap();
        assert_eq!(intent.capability, "Slack");
        assert!((intent.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn polite_connect_beats_generic_connect() {
        let polite = detect_learning_intent("can you connect to spotify?").unwrap();
        assert!((polite.confidence - 0.7).abs() < 1e-9);

        let generic = detect_learning_intent("connect to spotify").unwrap();
        assert!((generic.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn catch_all_learn_to() {
        let intent = detect_learning_intent("learn to schedule tweets").unwrap();
        assert!((intent.confidence - 0.6).abs() < 1e-9);
        assert_eq!(intent.capability, "Schedule Tweets");
    }

    #[test]
    fn trailing_noise_stripped() {
        let intent = detect_learning_intent("learn how to use the Trello API").unwrap();
        assert_eq!(intent.capability, "Trello");
    }

    #[test]
    fn no_intent_in_plain_chat() {
        assert!(detect_learning_intent("what's for dinner tonight?").is_none());
        assert!(detect_learning_intent("track my expenses").is_none());
    }

    #[test]
    fn over_long_capability_rejected() {
        let msg = format!("learn how to use {}", "x".repeat(150));
        assert!(detect_learning_intent(&msg).is_none());
    }

    #[test]
    fn service_name_heuristic() {
        assert!(looks_like_service_name("Stripe"));
        assert!(looks_like_service_name("Google Sheets"));
        assert!(!looks_like_service_name("Send Me Daily Weather Updates"));
        assert!(!looks_like_service_name("Track My Sleep"));
    }

    #[test]
    fn marker_roundtrip() {
        let response = clarification_response("Tell Time");
        let capability = extract_clarification_capability(&response).unwrap();
        assert_eq!(capability, "Tell Time");
        assert!(response.contains("<!-- learning-clarification:Tell Time -->"));
    }

    #[test]
    fn affirmative_reply_uses_capability() {
        let outcome = interpret_clarification_reply("Tell Time", "Yes");
        assert_eq!(
            outcome,
            ClarificationReply::Proceed { search_query: "Tell Time API".into() }
        );
    }

    #[test]
    fn affirmative_reply_resolves_known_brand() {
        let outcome = interpret_clarification_reply("canva designs", "sure");
        assert_eq!(
            outcome,
            ClarificationReply::Proceed { search_query: "Canva API".into() }
        );
    }

    #[test]
    fn negative_replies_abort() {
        for reply in ["No thanks", "nope", "never mind", "cancel that", "stop"] {
            assert_eq!(
                interpret_clarification_reply("Tell Time", reply),
                ClarificationReply::Aborted,
                "'{}' should abort",
                reply
            );
        }
    }

    #[test]
    fn reply_naming_api_is_verbatim_query() {
        let outcome = interpret_clarification_reply("Tell Time", "use the WorldTime API");
        assert_eq!(
            outcome,
            ClarificationReply::Proceed { search_query: "use the WorldTime API".into() }
        );
    }

    #[test]
    fn short_reply_becomes_service_query() {
        let outcome = interpret_clarification_reply("Tell Time", "worldtimeapi maybe");
        match outcome {
            ClarificationReply::Proceed { search_query } => {
                assert_eq!(search_query, "worldtimeapi maybe API");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
