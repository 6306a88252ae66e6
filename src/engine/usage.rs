// Kilo Engine — Usage Tracker
// Read-side aggregation over the usage records the tracked gateway
// writes: a between-dates summary and a grouped breakdown (model, bot,
// day, month) for the usage API surface. Costs were computed at insert;
// aggregation only sums and rounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::atoms::error::EngineResult;
use crate::atoms::traits::UsageStore;
use crate::atoms::types::UsageRecord;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    pub total_cost_usd: f64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub request_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakdownGroup {
    Model,
    Bot,
    Day,
    Month,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub key: String,
    pub cost_usd: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub request_count: u64,
}

pub struct UsageTracker {
    store: Arc<dyn UsageStore>,
}

impl UsageTracker {
    pub fn new(store: Arc<dyn UsageStore>) -> Self {
        Self { store }
    }

    pub async fn summary(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> EngineResult<UsageSummary> {
        let records = self.store.records_between(user_id, start, end).await?;
        let mut summary = UsageSummary::default();
        for record in &records {
            summary.total_cost_usd += record.cost_usd;
            summary.total_prompt_tokens += record.prompt_tokens;
            summary.total_completion_tokens += record.completion_tokens;
            summary.request_count += 1;
        }
        summary.total_cost_usd = round6(summary.total_cost_usd);
        Ok(summary)
    }

    pub async fn breakdown(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group: BreakdownGroup,
    ) -> EngineResult<Vec<BreakdownRow>> {
        let records = self.store.records_between(user_id, start, end).await?;
        let mut buckets: BTreeMap<String, BreakdownRow> = BTreeMap::new();

        for record in &records {
            let key = group_key(record, group);
            let row = buckets.entry(key.clone()).or_insert_with(|| BreakdownRow {
                key,
                cost_usd: 0.0,
                prompt_tokens: 0,
                completion_tokens: 0,
                request_count: 0,
            });
            row.cost_usd += record.cost_usd;
            row.prompt_tokens += record.prompt_tokens;
            row.completion_tokens += record.completion_tokens;
            row.request_count += 1;
        }

        let mut rows: Vec<BreakdownRow> = buckets.into_values().collect();
        for row in &mut rows {
            row.cost_usd = round6(row.cost_usd);
        }
        rows.sort_by(|a, b| b.cost_usd.partial_cmp(&a.cost_usd).unwrap_or(std::cmp::Ordering::Equal));
        Ok(rows)
    }
}

fn group_key(record: &UsageRecord, group: BreakdownGroup) -> String {
    match group {
        BreakdownGroup::Model => record.model.clone(),
        BreakdownGroup::Bot => record
            .bot_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "none".into()),
        BreakdownGroup::Day => record.created_at.format("%Y-%m-%d").to_string(),
        BreakdownGroup::Month => record.created_at.format("%Y-%m").to_string(),
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::types::TaskType;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct MemoryStore {
        records: Mutex<Vec<UsageRecord>>,
    }

    #[async_trait]
    impl UsageStore for MemoryStore {
        async fn record(&self, record: UsageRecord) -> EngineResult<()> {
            self.records.lock().push(record);
            Ok(())
        }
        async fn records_between(
            &self,
            user_id: &str,
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        ) -> EngineResult<Vec<UsageRecord>> {
            Ok(self
                .records
                .lock()
                .iter()
                .filter(|r| r.user_id == user_id && r.created_at >= start && r.created_at <= end)
                .cloned()
                .collect())
        }
    }

    fn record(model: &str, bot: Option<Uuid>, day: u32, cost: f64) -> UsageRecord {
        UsageRecord {
            user_id: "u1".into(),
            bot_id: bot,
            session_id: None,
            message_id: None,
            provider: "anthropic".into(),
            model: model.into(),
            task_type: TaskType::SimpleQa,
            prompt_tokens: 100,
            completion_tokens: 50,
            cost_usd: cost,
            latency_ms: 200,
            created_at: Utc.with_ymd_and_hms(2026, 3, day, 10, 0, 0).unwrap(),
        }
    }

    fn tracker_with(records: Vec<UsageRecord>) -> UsageTracker {
        UsageTracker::new(Arc::new(MemoryStore { records: Mutex::new(records) }))
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        (
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 31, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn summary_totals() {
        let tracker = tracker_with(vec![
            record("claude-sonnet-4", None, 1, 0.001),
            record("gpt-4o-mini", None, 2, 0.0005),
        ]);
        let (start, end) = window();
        let summary = tracker.summary("u1", start, end).await.unwrap();
        assert_eq!(summary.request_count, 2);
        assert_eq!(summary.total_prompt_tokens, 200);
        assert!((summary.total_cost_usd - 0.0015).abs() < 1e-9);
    }

    #[tokio::test]
    async fn breakdown_by_model_sorted_by_cost() {
        let tracker = tracker_with(vec![
            record("claude-sonnet-4", None, 1, 0.002),
            record("claude-sonnet-4", None, 2, 0.002),
            record("gpt-4o-mini", None, 2, 0.0005),
        ]);
        let (start, end) = window();
        let rows = tracker
            .breakdown("u1", start, end, BreakdownGroup::Model)
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "claude-sonnet-4");
        assert_eq!(rows[0].request_count, 2);
        assert!((rows[0].cost_usd - 0.004).abs() < 1e-9);
    }

    #[tokio::test]
    async fn breakdown_by_day_and_month() {
        let bot = Some(Uuid::new_v4());
        let tracker = tracker_with(vec![
            record("claude-sonnet-4", bot, 1, 0.001),
            record("claude-sonnet-4", bot, 1, 0.001),
            record("claude-sonnet-4", bot, 5, 0.001),
        ]);
        let (start, end) = window();

        let days = tracker
            .breakdown("u1", start, end, BreakdownGroup::Day)
            .await
            .unwrap();
        assert_eq!(days.len(), 2);
        assert!(days.iter().any(|r| r.key == "2026-03-01" && r.request_count == 2));

        let months = tracker
            .breakdown("u1", start, end, BreakdownGroup::Month)
            .await
            .unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].key, "2026-03");
        assert_eq!(months[0].request_count, 3);
    }

    #[tokio::test]
    async fn other_users_excluded() {
        let mut foreign = record("claude-sonnet-4", None, 1, 5.0);
        foreign.user_id = "someone-else".into();
        let tracker = tracker_with(vec![foreign, record("gpt-4o-mini", None, 2, 0.0005)]);
        let (start, end) = window();
        let summary = tracker.summary("u1", start, end).await.unwrap();
        assert_eq!(summary.request_count, 1);
    }
}
