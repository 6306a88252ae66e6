// Kilo Engine — conversational agent runtime core.
// Routes each user message through a deterministic pipeline: built-in
// handlers, matched skills, learning (web research) flows, or plain
// conversation — and returns a post-processed response plus deferred
// side effects. HTTP routing, env loading, migrations, and the durable
// datastore live in the host application and reach the engine through
// the port traits in `atoms::traits`.

// ── Kilo Atoms (constants, error types, data model, ports) ──────────────
pub mod atoms;

// ── Kilo Engine (pipeline components) ───────────────────────────────────
pub mod engine;

// ── HTTP interface contract (envelopes, redaction, status mapping) ──────
pub mod api;

pub use atoms::error::{EngineError, EngineResult};
