// Kilo Engine — Memory Extractor
// Pulls durable user facts out of a message with a fixed regex family.
// Runs on every message regardless of which branch answered it; the
// orchestrator emits a memory_write side effect when anything is found.

use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::types::{FactSource, MemoryFact};

struct FactPattern {
    regex: Regex,
    key: &'static str,
    confidence: f64,
}

// Proper-noun captures (name, location, employer) intentionally stop at
// the first lowercase word, so "my name is Maya and I live in…" yields
// just "Maya".
static FACT_PATTERNS: LazyLock<Vec<FactPattern>> = LazyLock::new(|| {
    const PROPER: &str = r"([A-Z][A-Za-z'-]+(?:\s+[A-Z][A-Za-z'-]+){0,3})";
    let table: Vec<(String, &str, f64)> = vec![
        (format!(r"(?i:\bmy\s+name\s+is)\s+{}", PROPER), "name", 0.95),
        (format!(r"(?i:\bcall\s+me)\s+{}", PROPER), "name", 0.85),
        (format!(r"(?i:\bi\s+live\s+in)\s+{}", PROPER), "location", 0.9),
        (format!(r"(?i:\bi(?:'m| am)\s+based\s+in)\s+{}", PROPER), "location", 0.85),
        (format!(r"(?i:\bi\s+work\s+(?:at|for))\s+{}", PROPER), "employer", 0.85),
        (
            r"(?i)\bmy\s+birthday\s+is\s+(?:on\s+)?([A-Za-z0-9]+(?:[ ,/-]+[A-Za-z0-9]+){0,3})"
                .to_string(),
            "birthday",
            0.9,
        ),
        (
            r"(?i)\bi\s+work\s+as\s+(?:a|an)\s+([a-zA-Z]+(?:[ /-][a-zA-Z]+){0,3})".to_string(),
            "occupation",
            0.8,
        ),
        (
            r"(?i)\bmy\s+timezone\s+is\s+([A-Za-z_/+0-9:-]{2,40})".to_string(),
            "timezone",
            0.9,
        ),
        (
            r"(?i)\bmy\s+favou?rite\s+([a-z]+(?: [a-z]+)?)\s+is\s+([A-Za-z0-9][A-Za-z0-9 '-]{0,50})"
                .to_string(),
            "favorite",
            0.8,
        ),
        (
            r"(?i)\bi\s+(?:really\s+)?(?:like|love|enjoy)\s+([a-z][a-z0-9 '-]{2,50})".to_string(),
            "likes",
            0.6,
        ),
        (
            r"(?i)\bi\s+prefer\s+([a-z][a-z0-9 '-]{2,50})".to_string(),
            "preference",
            0.65,
        ),
        (
            r"(?i)\bi(?:'m| am)\s+allergic\s+to\s+([a-z][a-z '-]{2,40})".to_string(),
            "allergy",
            0.9,
        ),
    ];
    table
        .into_iter()
        .filter_map(|(pattern, key, confidence)| {
            Regex::new(&pattern).ok().map(|regex| FactPattern { regex, key, confidence })
        })
        .collect()
});

/// Extract memory facts from a raw user message. Every fact carries
/// `user_stated` provenance — inference is the LLM's job, not this
/// scanner's.
pub fn extract_facts(message: &str) -> Vec<MemoryFact> {
    let now = Utc::now();
    let mut facts: Vec<MemoryFact> = Vec::new();

    for pattern in FACT_PATTERNS.iter() {
        for caps in pattern.regex.captures_iter(message) {
            let (key, value) = if pattern.key == "favorite" {
                // Two capture groups: the category and the thing.
                let category = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
                (format!("favorite_{}", category.replace(' ', "_")), value.to_string())
            } else {
                let value = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                (pattern.key.to_string(), value.to_string())
            };
            if value.is_empty() {
                continue;
            }
            // First occurrence of a key wins within one message.
            if facts.iter().any(|f| f.key == key) {
                continue;
            }
            facts.push(MemoryFact {
                key,
                value: trim_sentence_tail(&value),
                source: FactSource::UserStated,
                confidence: pattern.confidence,
                created_at: now,
            });
        }
    }
    facts
}

/// Drop a trailing clause fragment: cut at the first period and trim
/// trailing punctuation.
fn trim_sentence_tail(value: &str) -> String {
    let cut = value.split('.').next().unwrap_or(value);
    cut.trim_end_matches([',', '!', '?', ' ']).to_string()
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_name_and_location() {
        let facts = extract_facts("Hi! My name is Maya and I live in Lisbon");
        let name = facts.iter().find(|f| f.key == "name").unwrap();
        assert_eq!(name.value, "Maya");
        let location = facts.iter().find(|f| f.key == "location").unwrap();
        assert_eq!(location.value, "Lisbon");
    }

    #[test]
    fn extracts_multi_word_proper_nouns() {
        let facts = extract_facts("I work at Acme Corp these days");
        let employer = facts.iter().find(|f| f.key == "employer").unwrap();
        assert_eq!(employer.value, "Acme Corp");
    }

    #[test]
    fn extracts_favorite_with_category_key() {
        let facts = extract_facts("my favorite color is teal");
        let fav = facts.iter().find(|f| f.key == "favorite_color").unwrap();
        assert_eq!(fav.value, "teal");
        assert_eq!(fav.source, FactSource::UserStated);
    }

    #[test]
    fn no_facts_from_plain_requests() {
        assert!(extract_facts("what time is it in Tokyo?").is_empty());
        assert!(extract_facts("track my expenses").is_empty());
    }

    #[test]
    fn confidence_within_unit_interval() {
        let facts = extract_facts("My name is Ada. I work at Acme Corp. I love hiking");
        assert!(facts.len() >= 3);
        for fact in facts {
            assert!(fact.confidence > 0.0 && fact.confidence <= 1.0);
        }
    }

    #[test]
    fn duplicate_keys_keep_first() {
        let facts = extract_facts("My name is Ada. Call me Grace");
        let names: Vec<_> = facts.iter().filter(|f| f.key == "name").collect();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0].value, "Ada");
    }

    #[test]
    fn likes_capture_stops_at_sentence_end() {
        let facts = extract_facts("I love hiking. Unrelated sentence follows");
        let likes = facts.iter().find(|f| f.key == "likes").unwrap();
        assert_eq!(likes.value, "hiking");
    }
}
