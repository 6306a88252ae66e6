// Kilo Engine — Built-in: Random
// UUIDv4, unbiased integers via rejection sampling, and passwords drawn
// from OS randomness. Everything here uses cryptographic random bytes —
// no PRNG state to seed or leak.

use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

use super::{BuiltinResponse, RANDOM_SKILL_ID};

const PASSWORD_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789!@#$%^&*-_=+";
const PASSWORD_MIN_LEN: usize = 8;
const PASSWORD_MAX_LEN: usize = 128;
const PASSWORD_DEFAULT_LEN: usize = 16;

static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:between|from)\s+(-?\d+)\s+(?:and|to)\s+(-?\d+)").expect("range regex")
});

static LENGTH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)[\s-]*(?:char|character|digit|letter)").expect("length regex"));

pub fn handle(message: &str) -> BuiltinResponse {
    let lower = message.to_lowercase();

    let content = if lower.contains("password") {
        let length = LENGTH_RE
            .captures(&lower)
            .and_then(|c| c[1].parse::<usize>().ok())
            .unwrap_or(PASSWORD_DEFAULT_LEN)
            .clamp(PASSWORD_MIN_LEN, PASSWORD_MAX_LEN);
        match generate_password(length) {
            Some(password) => format!("Here's a {}-character password: `{}`", length, password),
            None => "I couldn't reach the system's random source.".to_string(),
        }
    } else if lower.contains("uuid") || lower.contains("guid") {
        format!("Here's a UUID: **{}**", Uuid::new_v4())
    } else {
        let (min, max) = RANGE_RE
            .captures(&lower)
            .and_then(|c| {
                let min = c[1].parse::<i64>().ok()?;
                let max = c[2].parse::<i64>().ok()?;
                Some((min.min(max), min.max(max)))
            })
            .unwrap_or((1, 100));
        match random_int(min, max) {
            Some(n) => format!("Your random number between {} and {}: **{}**", min, max, n),
            None => "I couldn't reach the system's random source.".to_string(),
        }
    };

    BuiltinResponse {
        content,
        skill_id: RANDOM_SKILL_ID.to_string(),
        suggested_actions: vec![
            "Generate a 24-character password".to_string(),
            "Pick a random number between 1 and 10".to_string(),
        ],
    }
}

/// Cryptographically unbiased integer in [min, max] via rejection
/// sampling over u64.
pub fn random_int(min: i64, max: i64) -> Option<i64> {
    if min == max {
        return Some(min);
    }
    let span = (max as i128 - min as i128 + 1) as u128;
    let zone = u64::MAX as u128 - (u64::MAX as u128 + 1) % span;

    loop {
        let mut buf = [0u8; 8];
        getrandom::getrandom(&mut buf).ok()?;
        let sample = u64::from_le_bytes(buf) as u128;
        if sample <= zone {
            return Some((min as i128 + (sample % span) as i128) as i64);
        }
    }
}

/// Password from the fixed charset, one rejection-sampled byte per char.
fn generate_password(length: usize) -> Option<String> {
    let charset_len = PASSWORD_CHARSET.len() as u16;
    let zone = (256 / charset_len) * charset_len;
    let mut out = String::with_capacity(length);

    while out.len() < length {
        let mut buf = [0u8; 32];
        getrandom::getrandom(&mut buf).ok()?;
        for byte in buf {
            if (byte as u16) < zone {
                out.push(PASSWORD_CHARSET[(byte as u16 % charset_len) as usize] as char);
                if out.len() == length {
                    break;
                }
            }
        }
    }
    Some(out)
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_response() {
        let resp = handle("generate a uuid for me");
        assert_eq!(resp.skill_id, "builtin-random");
        // A v4 UUID between the asterisks.
        let uuid_str = resp.content.split("**").nth(1).unwrap();
        let parsed = Uuid::parse_str(uuid_str).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn number_respects_range() {
        let resp = handle("pick a random number between 5 and 10");
        let n: i64 = resp.content.split("**").nth(1).unwrap().parse().unwrap();
        assert!((5..=10).contains(&n));
    }

    #[test]
    fn reversed_range_normalized() {
        let resp = handle("random number from 10 to 5");
        let n: i64 = resp.content.split("**").nth(1).unwrap().parse().unwrap();
        assert!((5..=10).contains(&n));
    }

    #[test]
    fn default_range_without_bounds() {
        let resp = handle("give me a random number");
        let n: i64 = resp.content.split("**").nth(1).unwrap().parse().unwrap();
        assert!((1..=100).contains(&n));
    }

    #[test]
    fn random_int_covers_bounds() {
        let mut saw_min = false;
        let mut saw_max = false;
        for _ in 0..200 {
            let n = random_int(1, 3).unwrap();
            assert!((1..=3).contains(&n));
            saw_min |= n == 1;
            saw_max |= n == 3;
        }
        assert!(saw_min && saw_max);
    }

    #[test]
    fn password_length_clamped() {
        let resp = handle("generate a 4-character password");
        assert!(resp.content.contains("8-character"));

        let resp = handle("generate a 300 character password");
        assert!(resp.content.contains("128-character"));

        let resp = handle("generate a password");
        assert!(resp.content.contains("16-character"));
    }

    #[test]
    fn password_uses_charset_only() {
        let resp = handle("generate a 32-character password");
        let password = resp.content.split('`').nth(1).unwrap();
        assert_eq!(password.len(), 32);
        assert!(password.bytes().all(|b| PASSWORD_CHARSET.contains(&b)));
    }

    #[test]
    fn passwords_are_distinct() {
        let a = generate_password(24).unwrap();
        let b = generate_password(24).unwrap();
        assert_ne!(a, b);
    }
}
