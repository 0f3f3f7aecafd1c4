// src/patterns.rs
// C6: Pattern Tracker — success-rate scoring of named patterns,
// threshold-filtered recommendations, persisted through the Mandrel
// `ContextStore`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

use crate::error::Result;
use crate::persistence::{ContextStore, ContextType};

pub const RECOMMENDATION_THRESHOLD: f64 = 0.7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternScore {
    pub pattern_id: String,
    pub name: String,
    pub success_count: u32,
    pub failure_count: u32,
    pub last_used: DateTime<Utc>,
    pub contexts: Vec<String>,
}

impl PatternScore {
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            0.0
        } else {
            self.success_count as f64 / total as f64
        }
    }

    fn new(pattern_id: &str, name: &str) -> Self {
        Self {
            pattern_id: pattern_id.to_string(),
            name: name.to_string(),
            success_count: 0,
            failure_count: 0,
            last_used: Utc::now(),
            contexts: Vec::new(),
        }
    }
}

/// Process-wide map `patternId -> PatternScore`, lazily rehydrated from the
/// persistence collaborator on first use.
pub struct PatternTracker {
    store: Arc<dyn ContextStore>,
    patterns: RwLock<HashMap<String, PatternScore>>,
    loaded: RwLock<bool>,
}

impl PatternTracker {
    pub fn new(store: Arc<dyn ContextStore>) -> Self {
        Self {
            store,
            patterns: RwLock::new(HashMap::new()),
            loaded: RwLock::new(false),
        }
    }

    pub async fn is_loaded(&self) -> bool {
        *self.loaded.read().await
    }

    async fn ensure_loaded(&self) -> Result<()> {
        if *self.loaded.read().await {
            return Ok(());
        }
        self.reload().await
    }

    /// Reload clears and re-reads from the store. `search_context` returns
    /// rows newest-first; a pattern is re-persisted in full on every update
    /// (a fresh row per write, never an in-place update), so the first
    /// record seen per `pattern_id` here is the newest one and every later
    /// duplicate for that id is a stale snapshot to discard.
    pub async fn reload(&self) -> Result<()> {
        let records = self.store.search_context("pattern").await?;
        let mut map: HashMap<String, PatternScore> = HashMap::new();
        for record in records {
            if record.context_type != ContextType::Decision {
                continue;
            }
            if !record.tags.iter().any(|t| t == "pattern") {
                continue;
            }
            match serde_json::from_str::<PatternScore>(&record.content) {
                Ok(score) => {
                    map.entry(score.pattern_id.clone()).or_insert(score);
                }
                Err(e) => warn!(error = %e, "skipping malformed pattern record"),
            }
        }
        *self.patterns.write().await = map;
        *self.loaded.write().await = true;
        Ok(())
    }

    async fn persist(&self, score: &PatternScore) -> Result<()> {
        let content = serde_json::to_string(score)?;
        let tags = vec!["pattern".to_string(), score.pattern_id.clone()];
        self.store
            .store_context(&content, ContextType::Decision, &tags)
            .await?;
        Ok(())
    }

    pub async fn record_success(&self, id: &str, name: &str, context: &str) -> Result<()> {
        self.ensure_loaded().await?;
        let mut guard = self.patterns.write().await;
        let entry = guard
            .entry(id.to_string())
            .or_insert_with(|| PatternScore::new(id, name));
        entry.success_count += 1;
        entry.last_used = Utc::now();
        if !context.is_empty() && !entry.contexts.iter().any(|c| c == context) {
            entry.contexts.push(context.to_string());
        }
        let snapshot = entry.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn record_failure(&self, id: &str, name: &str) -> Result<()> {
        self.ensure_loaded().await?;
        let mut guard = self.patterns.write().await;
        let entry = guard
            .entry(id.to_string())
            .or_insert_with(|| PatternScore::new(id, name));
        entry.failure_count += 1;
        entry.last_used = Utc::now();
        let snapshot = entry.clone();
        drop(guard);
        self.persist(&snapshot).await
    }

    pub async fn get_pattern(&self, id: &str) -> Result<Option<PatternScore>> {
        self.ensure_loaded().await?;
        Ok(self.patterns.read().await.get(id).cloned())
    }

    pub async fn get_all_patterns(&self) -> Result<Vec<PatternScore>> {
        self.ensure_loaded().await?;
        Ok(self.patterns.read().await.values().cloned().collect())
    }

    /// Patterns whose successRate >= 0.7 AND whose contexts either include
    /// `context` or are empty (universal), sorted descending, capped at
    /// `limit`.
    pub async fn get_recommended_patterns(&self, context: &str, limit: usize) -> Result<Vec<PatternScore>> {
        self.ensure_loaded().await?;
        let guard = self.patterns.read().await;
        let mut candidates: Vec<PatternScore> = guard
            .values()
            .filter(|p| p.success_rate() >= RECOMMENDATION_THRESHOLD)
            .filter(|p| p.contexts.is_empty() || p.contexts.iter().any(|c| c == context))
            .cloned()
            .collect();
        candidates.sort_by(|a, b| {
            b.success_rate()
                .partial_cmp(&a.success_rate())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(limit);
        Ok(candidates)
    }

    /// Distinct context tags observed so far, for diagnostics/UIs.
    pub async fn all_contexts(&self) -> Result<HashSet<String>> {
        self.ensure_loaded().await?;
        Ok(self
            .patterns
            .read()
            .await
            .values()
            .flat_map(|p| p.contexts.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteContextStore;

    async fn tracker() -> PatternTracker {
        let store = Arc::new(SqliteContextStore::open_in_memory().await.unwrap());
        PatternTracker::new(store)
    }

    #[tokio::test]
    async fn success_rate_computed_correctly() {
        let t = tracker().await;
        t.record_success("p1", "surgical-edit", "exec-feature").await.unwrap();
        t.record_success("p1", "surgical-edit", "exec-feature").await.unwrap();
        t.record_failure("p1", "surgical-edit").await.unwrap();
        let p = t.get_pattern("p1").await.unwrap().unwrap();
        assert!((p.success_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn zero_use_pattern_has_zero_rate() {
        let t = tracker().await;
        let score = PatternScore::new("p2", "never-used");
        assert_eq!(score.success_rate(), 0.0);
    }

    #[tokio::test]
    async fn recommended_patterns_filtered_by_threshold_and_context() {
        let t = tracker().await;
        t.record_success("good", "good-pattern", "ctx-a").await.unwrap();
        t.record_success("good", "good-pattern", "ctx-a").await.unwrap();
        t.record_success("good", "good-pattern", "ctx-a").await.unwrap();
        t.record_failure("bad", "bad-pattern").await.unwrap();
        t.record_success("bad", "bad-pattern").await.unwrap();

        let recs = t.get_recommended_patterns("ctx-a", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].pattern_id, "good");

        let none = t.get_recommended_patterns("ctx-z", 5).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn universal_pattern_recommended_regardless_of_context() {
        let t = tracker().await;
        t.record_success("universal", "always-works", "").await.unwrap();
        t.record_success("universal", "always-works", "").await.unwrap();
        let recs = t.get_recommended_patterns("anything", 5).await.unwrap();
        assert_eq!(recs.len(), 1);
    }

    #[tokio::test]
    async fn reload_clears_and_rehydrates() {
        let t = tracker().await;
        t.record_success("p1", "name", "ctx").await.unwrap();
        assert!(t.is_loaded().await);
        t.reload().await.unwrap();
        let p = t.get_pattern("p1").await.unwrap();
        assert!(p.is_some());
    }

    #[tokio::test]
    async fn reload_picks_up_newest_snapshot_after_repeated_updates() {
        let t = tracker().await;
        t.record_success("p1", "surgical-edit", "exec-feature").await.unwrap();
        t.record_failure("p1", "surgical-edit").await.unwrap();
        t.reload().await.unwrap();
        let p = t.get_pattern("p1").await.unwrap().unwrap();
        assert_eq!(p.success_count, 1);
        assert_eq!(p.failure_count, 1);
    }

    #[tokio::test]
    async fn persists_across_tracker_instances_via_shared_store() {
        let store = Arc::new(SqliteContextStore::open_in_memory().await.unwrap());
        let t1 = PatternTracker::new(store.clone());
        t1.record_success("p1", "name", "ctx").await.unwrap();

        let t2 = PatternTracker::new(store);
        let p = t2.get_pattern("p1").await.unwrap();
        assert!(p.is_some());
    }
}
