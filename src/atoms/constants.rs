// ── Kilo Atoms: Constants ───────────────────────────────────────────────
// Hard ceilings, size caps, and fixed token sets shared across the engine.

use std::time::Duration;

// ── Identity ────────────────────────────────────────────────────────────

/// Prefix on every built-in skill identifier. Built-in ids are not UUIDs
/// and must never be persisted as a foreign key to the skills table.
pub const BUILTIN_SKILL_PREFIX: &str = "builtin-";

/// Environment variable carrying the 64-hex-char vault master key.
pub const CREDENTIAL_KEY_ENV: &str = "KILO_CREDENTIAL_KEY";

// Remaining environment variables the host wires at startup. The engine
// never reads these itself (config loading lives in the host); the names
// are pinned here so every deployment agrees.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const CACHE_URL_ENV: &str = "CACHE_URL";
pub const PRIMARY_LLM_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const FALLBACK_LLM_KEY_ENV: &str = "OPENAI_API_KEY";
pub const SEARCH_API_KEY_ENV: &str = "SEARCH_API_KEY";

// ── Skill validation limits ─────────────────────────────────────────────

pub const MAX_SKILL_NAME_CHARS: usize = 100;
pub const MAX_TRIGGER_PATTERN_CHARS: usize = 200;
pub const MAX_BEHAVIOR_PROMPT_CHARS: usize = 5000;
pub const MAX_INPUT_SCHEMA_PROPERTIES: usize = 30;
pub const MIN_TRIGGER_PATTERNS: usize = 2;
/// Scheduled skills may not fire more often than this.
pub const MIN_SCHEDULE_INTERVAL_MINUTES: u32 = 15;
/// Trigger-pattern Jaccard similarity at or above this is a conflict.
pub const TRIGGER_OVERLAP_THRESHOLD: f64 = 0.7;

/// Per-tier skill caps: free, pro, unlimited.
pub const SKILL_LIMIT_FREE: usize = 5;
pub const SKILL_LIMIT_PRO: usize = 25;

// ── Matching ────────────────────────────────────────────────────────────

/// Minimum fast-match score to consider a skill at all.
pub const MATCH_FLOOR: f64 = 0.4;
/// Fast-match score at or above which the match is definitive.
pub const MATCH_DEFINITIVE: f64 = 0.7;
/// Pattern recall is computed over at most this many content tokens, so
/// a single unmatched clause in a paragraph-length trigger cannot be
/// washed out by sheer message overlap.
pub const MAX_PATTERN_SCORING_TOKENS: usize = 12;

/// Tokens dropped before any trigger/message comparison.
pub const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being",
    "to", "of", "in", "on", "at", "by", "for", "with", "about", "as",
    "and", "or", "but", "not", "no", "do", "does", "did", "can", "could",
    "will", "would", "should", "shall", "may", "might", "must", "me",
    "my", "i", "you", "your", "it", "its", "this", "that", "these",
    "those", "what", "which", "who", "how", "when", "where", "please",
];

// ── Cache ───────────────────────────────────────────────────────────────

/// Every cache operation is abandoned after this long; callers fall
/// through to the source of truth.
pub const CACHE_OP_TIMEOUT: Duration = Duration::from_millis(100);
pub const CACHE_DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const CACHE_PRICING_TTL: Duration = Duration::from_secs(24 * 60 * 60);

// ── Outbound HTTP (tool executor) ───────────────────────────────────────

pub const HTTP_DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
/// Response bodies are truncated to exactly this many bytes.
pub const HTTP_BODY_CAP_BYTES: usize = 512 * 1024;
pub const HTTP_USER_AGENT: &str = "kilo-engine/0.1";

// ── Sandboxed SQL ───────────────────────────────────────────────────────

pub const SQL_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const SQL_ROW_CAP: usize = 1000;

// ── LLM gateway ─────────────────────────────────────────────────────────

pub const LLM_TIMEOUT: Duration = Duration::from_secs(30);
pub const LLM_THINKING_TIMEOUT: Duration = Duration::from_secs(60);
pub const LLM_DEFAULT_MAX_TOKENS: u32 = 2048;
/// Thinking blocks are concatenated and truncated to this many chars.
pub const THINKING_SUMMARY_CAP: usize = 500;

// ── Web research ────────────────────────────────────────────────────────

pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(8);
pub const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(10);
pub const PAGE_BODY_CAP_BYTES: usize = 1024 * 1024;
pub const PAGE_TEXT_CAP_CHARS: usize = 50_000;
pub const ANALYSIS_TEXT_CAP_CHARS: usize = 30_000;
pub const RESEARCH_FETCH_CONCURRENCY: usize = 3;
pub const RESEARCH_MAX_PAGES: usize = 5;
pub const RESEARCH_MAX_CODE_BLOCKS: usize = 10;

// ── Context loading ─────────────────────────────────────────────────────

/// Conversation turns loaded for a skill without a schedule.
pub const HISTORY_DEPTH: u32 = 5;
/// Rows shown in the current-data prompt snapshot.
pub const DATA_PREVIEW_ROWS: u32 = 10;

// ── Proposals ───────────────────────────────────────────────────────────

/// A dismissal of a similarly-named proposal within this window
/// suppresses a new proposal.
pub const DISMISSAL_WINDOW_DAYS: i64 = 7;
/// Tokenized-name Jaccard at or above this counts as "similarly named".
pub const DISMISSAL_NAME_SIMILARITY: f64 = 0.6;
