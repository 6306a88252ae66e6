// Kilo Engine — Built-in: Date Math
// Holiday names, weekday-relative phrases, numeric offsets, and explicit
// dates, all computed as day deltas on midnight-normalized dates. The
// "days between X and Y" form returns the absolute delta; "days until"
// rolls past targets into next year and says so.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, Utc, Weekday};
use regex::Regex;
use std::sync::LazyLock;

use super::{BuiltinResponse, DATE_MATH_SKILL_ID};

// ── Date vocabulary ─────────────────────────────────────────────────────

const MONTHS: &[(&str, u32)] = &[
    ("january", 1), ("february", 2), ("march", 3), ("april", 4),
    ("may", 5), ("june", 6), ("july", 7), ("august", 8),
    ("september", 9), ("october", 10), ("november", 11), ("december", 12),
];

const WEEKDAYS: &[(&str, Weekday)] = &[
    ("monday", Weekday::Mon),
    ("tuesday", Weekday::Tue),
    ("wednesday", Weekday::Wed),
    ("thursday", Weekday::Thu),
    ("friday", Weekday::Fri),
    ("saturday", Weekday::Sat),
    ("sunday", Weekday::Sun),
];

/// Fixed-date holidays as (needle, month, day). Thanksgiving is movable
/// and handled separately.
const HOLIDAYS: &[(&str, u32, u32)] = &[
    ("christmas eve", 12, 24),
    ("christmas", 12, 25),
    ("new year's eve", 12, 31),
    ("new years eve", 12, 31),
    ("new year's day", 1, 1),
    ("new years day", 1, 1),
    ("new year", 1, 1),
    ("valentine", 2, 14),
    ("halloween", 10, 31),
    ("independence day", 7, 4),
    ("fourth of july", 7, 4),
    ("4th of july", 7, 4),
    ("st patrick", 3, 17),
    ("april fools", 4, 1),
];

fn holiday_date(text: &str, year: i32) -> Option<(NaiveDate, String)> {
    let lower = text.to_lowercase();
    if lower.contains("thanksgiving") {
        // Fourth Thursday of November.
        let date = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Thu, 4)?;
        return Some((date, "Thanksgiving".to_string()));
    }
    for (needle, month, day) in HOLIDAYS {
        if lower.contains(needle) {
            let date = NaiveDate::from_ymd_opt(year, *month, *day)?;
            let label = title_case(needle);
            return Some((date, label));
        }
    }
    None
}

static EXPLICIT_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?",
    )
    .expect("explicit-date regex")
});

fn explicit_date(text: &str, default_year: i32) -> Option<(NaiveDate, bool)> {
    let caps = EXPLICIT_DATE.captures(text)?;
    let month = MONTHS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(&caps[1]))
        .map(|(_, m)| *m)?;
    let day: u32 = caps[2].parse().ok()?;
    let (year, explicit_year) = match caps.get(3) {
        Some(y) => (y.as_str().parse().ok()?, true),
        None => (default_year, false),
    };
    NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, explicit_year))
}

/// Resolve a phrase to a date: holiday name first, then explicit date.
/// Returns (date, label, year_was_pinned).
fn resolve_target(text: &str, year: i32) -> Option<(NaiveDate, String, bool)> {
    if let Some((date, label)) = holiday_date(text, year) {
        return Some((date, label, false));
    }
    let (date, pinned) = explicit_date(text, year)?;
    Some((date, date.format("%B %-d").to_string(), pinned))
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

// ── Request patterns ────────────────────────────────────────────────────

static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bdays\s+between\s+(.+?)\s+and\s+(.+)").expect("between regex")
});

static UNTIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:days|long)\s+(?:until|till|to)\s+(.+)").expect("until regex")
});

static OFFSET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(day|week|month|year)s?\s+(ago|from\s+now)").expect("offset regex")
});

static NEXT_WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bnext\s+(monday|tuesday|wednesday|thursday|friday|saturday|sunday)")
        .expect("next-weekday regex")
});

// ── Handler ─────────────────────────────────────────────────────────────

pub fn handle(message: &str, now: DateTime<Utc>) -> BuiltinResponse {
    let today = now.date_naive();
    let content = answer(message, today)
        .unwrap_or_else(|| {
            "I can count days for you — try \"how many days until Christmas?\" or \"what was 30 days ago?\".".to_string()
        });

    BuiltinResponse {
        content,
        skill_id: DATE_MATH_SKILL_ID.to_string(),
        suggested_actions: vec![
            "How many days until New Year?".to_string(),
            "What date is next Friday?".to_string(),
        ],
    }
}

fn answer(message: &str, today: NaiveDate) -> Option<String> {
    // "days between X and Y" — absolute delta.
    if let Some(caps) = BETWEEN_RE.captures(message) {
        let (from, from_label, _) = resolve_target(&caps[1], today.year())?;
        let (to, to_label, _) = resolve_target(&caps[2], today.year())?;
        let delta = (to - from).num_days().abs();
        return Some(format!(
            "There are **{} days** between {} ({}) and {} ({}).",
            delta,
            from_label,
            from.format("%B %-d, %Y"),
            to_label,
            to.format("%B %-d, %Y"),
        ));
    }

    // "days until X" — roll past targets into next year.
    if let Some(caps) = UNTIL_RE.captures(message) {
        let target_text = &caps[1];
        let (date, label, year_pinned) = resolve_target(target_text, today.year())?;
        let delta = (date - today).num_days();
        if delta >= 0 {
            return Some(format!(
                "There are **{} days** until {} ({}).",
                delta,
                label,
                date.format("%B %-d, %Y"),
            ));
        }
        if year_pinned {
            return Some(format!(
                "{} ({}) was **{} days ago**.",
                label,
                date.format("%B %-d, %Y"),
                -delta,
            ));
        }
        let (next, _, _) = resolve_target(target_text, today.year() + 1)?;
        return Some(format!(
            "This year's {} was **{} days ago** — **{} days** until {} ({}).",
            label,
            -delta,
            (next - today).num_days(),
            label,
            next.format("%B %-d, %Y"),
        ));
    }

    // "next Friday".
    if let Some(caps) = NEXT_WEEKDAY_RE.captures(message) {
        let weekday = WEEKDAYS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&caps[1]))
            .map(|(_, w)| *w)?;
        let mut ahead = (weekday.num_days_from_monday() as i64
            - today.weekday().num_days_from_monday() as i64)
            .rem_euclid(7);
        if ahead == 0 {
            ahead = 7;
        }
        let date = today + Days::new(ahead as u64);
        return Some(format!(
            "Next {} is **{}** (in {} days).",
            title_case(&caps[1].to_lowercase()),
            date.format("%B %-d, %Y"),
            ahead,
        ));
    }

    // "N days|weeks|months|years ago|from now".
    if let Some(caps) = OFFSET_RE.captures(message) {
        let amount: u64 = caps[1].parse().ok()?;
        let unit = caps[2].to_lowercase();
        let backwards = caps[3].to_lowercase().starts_with("ago");
        let date = match unit.as_str() {
            "day" => shift_days(today, amount, backwards)?,
            "week" => shift_days(today, amount * 7, backwards)?,
            "month" => shift_months(today, amount as u32, backwards)?,
            "year" => shift_months(today, amount as u32 * 12, backwards)?,
            _ => return None,
        };
        let direction = if backwards { "ago" } else { "from now" };
        return Some(format!(
            "**{}** — {} {}{} {}.",
            date.format("%A, %B %-d, %Y"),
            amount,
            unit,
            if amount == 1 { "" } else { "s" },
            direction,
        ));
    }

    if message.to_lowercase().contains("tomorrow") {
        let date = today + Days::new(1);
        return Some(format!("Tomorrow is **{}**.", date.format("%A, %B %-d, %Y")));
    }
    if message.to_lowercase().contains("yesterday") {
        let date = today - Days::new(1);
        return Some(format!("Yesterday was **{}**.", date.format("%A, %B %-d, %Y")));
    }

    // Bare explicit date: report its weekday and distance.
    if let Some((date, label, _)) = resolve_target(message, today.year()) {
        let delta = (date - today).num_days();
        let relation = match delta {
            0 => "that's today".to_string(),
            d if d > 0 => format!("in {} days", d),
            d => format!("{} days ago", -d),
        };
        return Some(format!(
            "{} ({}) falls on a **{}** — {}.",
            label,
            date.format("%B %-d, %Y"),
            date.format("%A"),
            relation,
        ));
    }

    None
}

fn shift_days(date: NaiveDate, days: u64, backwards: bool) -> Option<NaiveDate> {
    if backwards {
        date.checked_sub_days(Days::new(days))
    } else {
        date.checked_add_days(Days::new(days))
    }
}

fn shift_months(date: NaiveDate, months: u32, backwards: bool) -> Option<NaiveDate> {
    if backwards {
        date.checked_sub_months(Months::new(months))
    } else {
        date.checked_add_months(Months::new(months))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────
