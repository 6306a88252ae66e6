// Kilo Engine — Built-in: Time & Date
// Resolves an IANA zone from a closed city/abbreviation table, then
// formats the current moment in that zone. "what day" questions get the
// date form; everything else gets the clock form.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use super::{BuiltinResponse, TIME_SKILL_ID};

/// Closed lookup table: lowercase city/abbreviation → (IANA zone, label).
/// Longest names first so "new york" wins before "york"-style collisions.
const ZONES: &[(&str, &str, &str)] = &[
    ("los angeles", "America/Los_Angeles", "Los Angeles"),
    ("san francisco", "America/Los_Angeles", "San Francisco"),
    ("mexico city", "America/Mexico_City", "Mexico City"),
    ("buenos aires", "America/Argentina/Buenos_Aires", "Buenos Aires"),
    ("sao paulo", "America/Sao_Paulo", "São Paulo"),
    ("hong kong", "Asia/Hong_Kong", "Hong Kong"),
    ("kuala lumpur", "Asia/Kuala_Lumpur", "Kuala Lumpur"),
    ("new york", "America/New_York", "New York"),
    ("new delhi", "Asia/Kolkata", "New Delhi"),
    ("tokyo", "Asia/Tokyo", "Tokyo"),
    ("london", "Europe/London", "London"),
    ("paris", "Europe/Paris", "Paris"),
    ("berlin", "Europe/Berlin", "Berlin"),
    ("madrid", "Europe/Madrid", "Madrid"),
    ("rome", "Europe/Rome", "Rome"),
    ("amsterdam", "Europe/Amsterdam", "Amsterdam"),
    ("zurich", "Europe/Zurich", "Zurich"),
    ("lisbon", "Europe/Lisbon", "Lisbon"),
    ("dublin", "Europe/Dublin", "Dublin"),
    ("stockholm", "Europe/Stockholm", "Stockholm"),
    ("moscow", "Europe/Moscow", "Moscow"),
    ("istanbul", "Europe/Istanbul", "Istanbul"),
    ("dubai", "Asia/Dubai", "Dubai"),
    ("mumbai", "Asia/Kolkata", "Mumbai"),
    ("delhi", "Asia/Kolkata", "Delhi"),
    ("bangalore", "Asia/Kolkata", "Bangalore"),
    ("singapore", "Asia/Singapore", "Singapore"),
    ("bangkok", "Asia/Bangkok", "Bangkok"),
    ("jakarta", "Asia/Jakarta", "Jakarta"),
    ("manila", "Asia/Manila", "Manila"),
    ("beijing", "Asia/Shanghai", "Beijing"),
    ("shanghai", "Asia/Shanghai", "Shanghai"),
    ("seoul", "Asia/Seoul", "Seoul"),
    ("sydney", "Australia/Sydney", "Sydney"),
    ("melbourne", "Australia/Melbourne", "Melbourne"),
    ("auckland", "Pacific/Auckland", "Auckland"),
    ("honolulu", "Pacific/Honolulu", "Honolulu"),
    ("anchorage", "America/Anchorage", "Anchorage"),
    ("chicago", "America/Chicago", "Chicago"),
    ("denver", "America/Denver", "Denver"),
    ("seattle", "America/Los_Angeles", "Seattle"),
    ("toronto", "America/Toronto", "Toronto"),
    ("vancouver", "America/Vancouver", "Vancouver"),
    ("cairo", "Africa/Cairo", "Cairo"),
    ("lagos", "Africa/Lagos", "Lagos"),
    ("johannesburg", "Africa/Johannesburg", "Johannesburg"),
    // Abbreviations
    ("utc", "UTC", "UTC"),
    ("gmt", "Etc/GMT", "GMT"),
    ("est", "America/New_York", "Eastern Time"),
    ("edt", "America/New_York", "Eastern Time"),
    ("cst", "America/Chicago", "Central Time"),
    ("mst", "America/Denver", "Mountain Time"),
    ("pst", "America/Los_Angeles", "Pacific Time"),
    ("pdt", "America/Los_Angeles", "Pacific Time"),
    ("jst", "Asia/Tokyo", "Japan Time"),
    ("ist", "Asia/Kolkata", "India Time"),
    ("cet", "Europe/Paris", "Central European Time"),
    ("bst", "Europe/London", "British Time"),
];

/// Find a zone mention in free text. Falls back to UTC.
fn resolve_zone(message: &str) -> (&'static str, &'static str) {
    let lower = message.to_lowercase();
    for (needle, zone, label) in ZONES {
        // Abbreviations need word boundaries; city names are long enough
        // for plain substring matching.
        let hit = if needle.len() <= 3 {
            lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|w| w == *needle)
        } else {
            lower.contains(needle)
        };
        if hit {
            return (zone, label);
        }
    }
    ("UTC", "UTC")
}

fn is_date_question(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("what day") || lower.contains("date") || lower.contains("today")
}

pub fn handle(message: &str, now: DateTime<Utc>) -> BuiltinResponse {
    let (zone_name, label) = resolve_zone(message);
    let tz: Tz = zone_name.parse().unwrap_or(chrono_tz::UTC);
    let local = now.with_timezone(&tz);

    let content = if is_date_question(message) {
        format!(
            "It's **{}** in {} ({}).",
            local.format("%A, %B %-d, %Y"),
            label,
            zone_name
        )
    } else {
        format!(
            "It's **{}** in {} ({}, {}).",
            local.format("%-I:%M %p"),
            label,
            zone_name,
            local.format("%Z")
        )
    };

    BuiltinResponse {
        content,
        skill_id: TIME_SKILL_ID.to_string(),
        suggested_actions: vec![
            format!("What day is it in {}?", label),
            "What time is it in UTC?".to_string(),
        ],
    }
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pinned() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn tokyo_time() {
        let resp = handle("what time is it in Tokyo?", pinned());
        assert!(resp.content.contains("Asia/Tokyo") || resp.content.contains("JST"));
        // 12:00 UTC = 21:00 JST
        assert!(resp.content.contains("9:00 PM"), "{}", resp.content);
        assert_eq!(resp.skill_id, "builtin-time");
        let bold = regex::Regex::new(r"It's \*\*.+\*\*").unwrap();
        assert!(bold.is_match(&resp.content));
    }

    #[test]
    fn date_question_gets_date_form() {
        let resp = handle("what day is it in London?", pinned());
        assert!(resp.content.contains("Monday"), "{}", resp.content);
        assert!(resp.content.contains("June 15, 2026"));
        assert!(resp.content.contains("Europe/London"));
    }

    #[test]
    fn unknown_city_defaults_to_utc() {
        let resp = handle("what time is it?", pinned());
        assert!(resp.content.contains("UTC"));
        assert!(resp.content.contains("12:00 PM"));
    }

    #[test]
    fn abbreviation_requires_word_boundary() {
        // "best" must not resolve to BST.
        let (zone, _) = resolve_zone("what time is best for lunch in tokyo");
        assert_eq!(zone, "Asia/Tokyo");

        let (zone, _) = resolve_zone("what time is it in pst");
        assert_eq!(zone, "America/Los_Angeles");
    }

    #[test]
    fn multi_word_cities_resolve() {
        let (zone, _) = resolve_zone("time in new york please");
        assert_eq!(zone, "America/New_York");
    }

    #[test]
    fn suggested_actions_present() {
        let resp = handle("what time is it in Paris?", pinned());
        assert!(!resp.suggested_actions.is_empty());
        assert!(resp.suggested_actions.len() <= 2);
    }
}
