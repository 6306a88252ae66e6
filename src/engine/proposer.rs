// Kilo Engine — Skill Proposer
// Consulted only when no skill matched. Scans the message for
// repeatability signals (temporal, tracking, templating, aggregation);
// with at least one signal it extracts a coarse intent from a small
// regex family and shapes a structured proposal. Recently dismissed
// proposals with similar names are suppressed.

use chrono::{DateTime, Duration, Utc};
use log::info;
use regex::Regex;
use std::sync::LazyLock;

use crate::atoms::constants::{DISMISSAL_NAME_SIMILARITY, DISMISSAL_WINDOW_DAYS};
use crate::atoms::types::{ProposalDismissal, ProposedField, ProposedSkillOutline};
use crate::engine::validate::{jaccard, overlap_tokens};

// ── Repeatability signals ───────────────────────────────────────────────

const TEMPORAL_SIGNALS: &[&str] = &[
    "every day", "daily", "every week", "weekly", "every month", "monthly",
    "each morning", "every morning", "every evening", "every night",
    "every monday", "every tuesday", "every wednesday", "every thursday",
    "every friday", "every saturday", "every sunday", "routinely",
];

const TRACKING_SIGNALS: &[&str] =
    &["keep track", "track my", "track the", "tracking", "monitor my", "count my"];

const TEMPLATING_SIGNALS: &[&str] =
    &["as usual", "like last time", "same as", "every time", "template", "again and again"];

const AGGREGATION_SIGNALS: &[&str] = &[
    "log my", "record my", "total", "sum up", "average", "how many times", "history of",
];

/// Count how many signal categories the message touches (0–4).
fn repeatability_signals(message: &str) -> u32 {
    let lower = message.to_lowercase();
    [
        TEMPORAL_SIGNALS,
        TRACKING_SIGNALS,
        TEMPLATING_SIGNALS,
        AGGREGATION_SIGNALS,
    ]
    .iter()
    .filter(|signals| signals.iter().any(|s| lower.contains(s)))
    .count() as u32
}

// ── Timing map ──────────────────────────────────────────────────────────

/// Fixed phrase → cron map for reminder/digest schedules.
fn schedule_for(when: &str) -> Option<String> {
    let when = when.trim().to_lowercase();
    let table: &[(&str, &str)] = &[
        ("morning", "0 9 * * *"),
        ("noon", "0 12 * * *"),
        ("afternoon", "0 15 * * *"),
        ("evening", "0 18 * * *"),
        ("night", "0 21 * * *"),
        ("day", "0 9 * * *"),
        ("daily", "0 9 * * *"),
        ("hour", "0 * * * *"),
        ("week", "0 9 * * 1"),
        ("weekly", "0 9 * * 1"),
        ("monday", "0 9 * * 1"),
        ("tuesday", "0 9 * * 2"),
        ("wednesday", "0 9 * * 3"),
        ("thursday", "0 9 * * 4"),
        ("friday", "0 9 * * 5"),
        ("saturday", "0 9 * * 6"),
        ("sunday", "0 9 * * 0"),
        ("month", "0 9 1 * *"),
        ("monthly", "0 9 1 * *"),
    ];
    table
        .iter()
        .find(|(phrase, _)| when.contains(phrase))
        .map(|(_, cron)| cron.to_string())
}

// ── Intent extraction ───────────────────────────────────────────────────

// Subject captures are lazy and bounded by a temporal/punctuation tail,
// so "track my water intake every day" yields "water intake".
const SUBJECT_TAIL: &str = r"(?:\s+(?:every|each|daily|weekly|at|please)\b|[.!?,]|$)";

static TRACK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:keep\s+track\s+of(?:\s+my)?|track\s+(?:my|the))\s+([a-z][a-z0-9 '-]{{2,40}}?){}",
        SUBJECT_TAIL
    ))
    .expect("track regex")
});

static REMIND_TO_WHEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bremind\s+me\s+to\s+(.+?)\s+(?:at|every|each)\s+([a-z0-9: ]{2,30})")
        .expect("remind-to-when regex")
});

static REMIND_WHEN_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:at|every|each)\s+([a-z0-9: ]{2,20}?)\s*,?\s+remind\s+me\s+to\s+(.+)")
        .expect("remind-when-to regex")
});

static DIGEST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bevery\s+([a-z]{3,12})\s*,?\s+(?:send|tell|give)\s+me\s+(?:a\s+|the\s+)?(.+)")
        .expect("digest regex")
});

static LOG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:log|record)\s+my\s+([a-z][a-z0-9 '-]{{2,40}}?){}",
        SUBJECT_TAIL
    ))
    .expect("log regex")
});

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

fn clean_subject(raw: &str) -> String {
    raw.trim()
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_string()
}

/// Extract the proposal shape from the message. Ordered: trackers, then
/// reminders (either clause order), then digests, then logs.
fn extract_outline(message: &str) -> Option<ProposedSkillOutline> {
    if let Some(caps) = TRACK_RE.captures(message) {
        let subject = clean_subject(&caps[1]);
        return Some(ProposedSkillOutline {
            name: format!("{} Tracker", title_case(&subject)),
            description: format!("Track {} over time", subject),
            trigger_patterns: vec![
                format!("track my {}", subject),
                format!("show my {}", subject),
            ],
            fields: vec![ProposedField { name: "description".into(), required: true }],
            schedule: None,
            confidence: 0.0,
        });
    }

    let reminder = REMIND_TO_WHEN_RE
        .captures(message)
        .map(|c| (clean_subject(&c[1]), c[2].to_string()))
        .or_else(|| {
            REMIND_WHEN_TO_RE
                .captures(message)
                .map(|c| (clean_subject(&c[2]), c[1].to_string()))
        });
    if let Some((task, when)) = reminder {
        return Some(ProposedSkillOutline {
            name: format!("{} Reminder", title_case(&task)),
            description: format!("Remind you to {}", task),
            trigger_patterns: vec![
                format!("remind me to {}", task),
                format!("{} reminder", task),
            ],
            fields: vec![],
            schedule: schedule_for(&when),
            confidence: 0.0,
        });
    }

    if let Some(caps) = DIGEST_RE.captures(message) {
        let when = caps[1].to_string();
        let content = clean_subject(&caps[2]);
        return Some(ProposedSkillOutline {
            name: title_case(&format!("{} {}", when, content)),
            description: format!("Send {} every {}", content, when),
            trigger_patterns: vec![
                format!("send me {}", content),
                format!("{} update", content),
            ],
            fields: vec![],
            schedule: schedule_for(&when),
            confidence: 0.0,
        });
    }

    if let Some(caps) = LOG_RE.captures(message) {
        let subject = clean_subject(&caps[1]);
        return Some(ProposedSkillOutline {
            name: format!("{} Log", title_case(&subject)),
            description: format!("Log {} entries", subject),
            trigger_patterns: vec![
                format!("log my {}", subject),
                format!("show my {} log", subject),
            ],
            fields: vec![
                ProposedField { name: "entry".into(), required: true },
                ProposedField { name: "date".into(), required: false },
            ],
            schedule: None,
            confidence: 0.0,
        });
    }

    None
}

// ── Proposer ────────────────────────────────────────────────────────────

/// Produce a proposal for an unmatched message, or None when the message
/// carries no repeatability signal, no extractable intent, or a
/// recently-dismissed twin.
pub fn propose(
    message: &str,
    dismissals: &[ProposalDismissal],
    now: DateTime<Utc>,
) -> Option<ProposedSkillOutline> {
    let signals = repeatability_signals(message);
    if signals == 0 {
        return None;
    }

    let mut outline = extract_outline(message)?;
    outline.confidence = (0.3 * signals as f64).min(0.9);

    if is_suppressed(&outline.name, dismissals, now) {
        info!("[proposer] suppressed '{}' — similar proposal dismissed recently", outline.name);
        return None;
    }
    Some(outline)
}

fn is_suppressed(name: &str, dismissals: &[ProposalDismissal], now: DateTime<Utc>) -> bool {
    let name_tokens = overlap_tokens(name);
    let window = Duration::days(DISMISSAL_WINDOW_DAYS);
    dismissals.iter().any(|d| {
        now.signed_duration_since(d.dismissed_at) <= window
            && jaccard(&name_tokens, &overlap_tokens(&d.proposal_name))
                >= DISMISSAL_NAME_SIMILARITY
    })
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracker_proposal() {
        let outline = propose("Can you keep track of my water intake every day?", &[], Utc::now())
            .unwrap();
        assert_eq!(outline.name, "Water Intake Tracker");
        assert_eq!(outline.fields.len(), 1);
        assert_eq!(outline.fields[0].name, "description");
        assert!(outline.fields[0].required);
    }

    #[test]
    fn reminder_with_trailing_time() {
        let outline =
            propose("remind me to stretch every morning", &[], Utc::now()).unwrap();
        assert_eq!(outline.name, "Stretch Reminder");
        assert_eq!(outline.schedule.as_deref(), Some("0 9 * * *"));
    }

    #[test]
    fn reminder_with_leading_time() {
        let outline =
            propose("every evening remind me to water the plants", &[], Utc::now()).unwrap();
        assert!(outline.name.ends_with("Reminder"));
        assert_eq!(outline.schedule.as_deref(), Some("0 18 * * *"));
    }

    #[test]
    fn digest_proposal() {
        let outline =
            propose("every friday send me a sales summary", &[], Utc::now()).unwrap();
        assert_eq!(outline.name, "Friday Sales Summary");
        assert_eq!(outline.schedule.as_deref(), Some("0 9 * * 5"));
    }

    #[test]
    fn log_proposal_fields() {
        let outline = propose("please log my workouts every day", &[], Utc::now()).unwrap();
        assert_eq!(outline.name, "Workouts Log");
        let names: Vec<&str> = outline.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["entry", "date"]);
        assert!(outline.fields[0].required);
        assert!(!outline.fields[1].required);
    }

    #[test]
    fn no_signals_no_proposal() {
        assert!(propose("what's the capital of France?", &[], Utc::now()).is_none());
    }

    #[test]
    fn signals_without_intent_no_proposal() {
        // Temporal signal but nothing the regex family can shape.
        assert!(propose("I shower every morning", &[], Utc::now()).is_none());
    }

    #[test]
    fn confidence_scales_with_signals() {
        let one = propose("keep track of my reading", &[], Utc::now()).unwrap();
        assert!((one.confidence - 0.3).abs() < 1e-9);

        let two = propose("keep track of my reading every day", &[], Utc::now()).unwrap();
        assert!((two.confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn recent_dismissal_suppresses() {
        let dismissals = vec![ProposalDismissal {
            proposal_name: "Water Intake Tracker".into(),
            dismissed_at: Utc::now() - Duration::days(2),
        }];
        assert!(propose("keep track of my water intake", &dismissals, Utc::now()).is_none());
    }

    #[test]
    fn old_dismissal_does_not_suppress() {
        let dismissals = vec![ProposalDismissal {
            proposal_name: "Water Intake Tracker".into(),
            dismissed_at: Utc::now() - Duration::days(30),
        }];
        assert!(propose("keep track of my water intake", &dismissals, Utc::now()).is_some());
    }

    #[test]
    fn unrelated_dismissal_does_not_suppress() {
        let dismissals = vec![ProposalDismissal {
            proposal_name: "Sleep Reminder".into(),
            dismissed_at: Utc::now() - Duration::days(1),
        }];
        assert!(propose("keep track of my water intake", &dismissals, Utc::now()).is_some());
    }
}
