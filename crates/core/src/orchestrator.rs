use crate::config::RecallConfig;
use crate::models::{ScoredCandidate, SearchOptions, SearchOutcome, SearchResult};
use crate::ranking::{rank, RankingWeights};
use crate::synonyms::SynonymExpander;
use crate::tokenizer::tokenize;
use crate::traits::MemoryStore;
use crate::StoreError;
use std::sync::Arc;
use tracing::{debug, warn};

/// Drives a query through tokenizing, alias expansion, full-text lookup,
/// re-ranking and access feedback.
pub struct SearchCoordinator<S>
where
    S: MemoryStore,
{
    store: S,
    synonyms: Arc<SynonymExpander>,
    weights: RankingWeights,
    over_fetch_factor: usize,
}

impl<S> SearchCoordinator<S>
where
    S: MemoryStore + Send + Sync,
{
    pub fn new(store: S) -> Self {
        Self::with_config(store, Arc::new(SynonymExpander::curated()), &RecallConfig::default())
    }

    pub fn with_config(store: S, synonyms: Arc<SynonymExpander>, config: &RecallConfig) -> Self {
        Self {
            store,
            synonyms,
            weights: config.weights,
            over_fetch_factor: config.over_fetch_factor.max(1),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn weights(&self) -> &RankingWeights {
        &self.weights
    }

    /// Runs the full pipeline. Store outages surface as
    /// [`SearchOutcome::RetrievalFailed`], never as a panic or propagated error.
    pub async fn search(&self, options: &SearchOptions) -> SearchOutcome {
        match self.search_scored(options).await {
            Ok(scored) => {
                SearchOutcome::from_results(scored.into_iter().map(SearchResult::from).collect())
            }
            Err(error) => {
                warn!(query = %options.query, %error, "memory retrieval failed");
                SearchOutcome::RetrievalFailed(error)
            }
        }
    }

    /// Like [`search`](Self::search) but keeps the per-signal breakdown of
    /// each surviving candidate.
    pub async fn search_scored(
        &self,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredCandidate>, StoreError> {
        let terms = tokenize(&options.query);
        if terms.is_empty() {
            debug!(query = %options.query, "query has no terms, using phrase fallback");
            return self.phrase_fallback(options).await;
        }

        let fetch_limit = options.limit.saturating_mul(self.over_fetch_factor);
        let expression = self.synonyms.build_match_expression(&terms);
        debug!(?terms, %expression, fetch_limit, "expanded query");

        let (mut candidates, expanded_error) =
            match self.store.search_by_expression(&expression, fetch_limit).await {
                Ok(candidates) => (candidates, None),
                Err(error) => {
                    warn!(%expression, %error, "expanded lookup failed, retrying plain terms");
                    (Vec::new(), Some(error))
                }
            };

        if candidates.is_empty() {
            let plain = terms.join(" OR ");
            candidates = self.store.search_by_expression(&plain, fetch_limit).await?;
            debug!(%plain, candidates = candidates.len(), "plain-term retry");

            if candidates.is_empty() {
                return match expanded_error {
                    Some(error) => Err(error),
                    None => Ok(Vec::new()),
                };
            }
        }

        let max_access_count = self.max_access_count().await;
        let ranked = rank(
            candidates,
            &options.tags,
            max_access_count,
            options.project.as_deref(),
            &self.weights,
        );

        let survivors: Vec<ScoredCandidate> = ranked
            .into_iter()
            .filter(|scored| scored.score >= options.min_score)
            .take(options.limit)
            .collect();

        self.record_access(&survivors).await;
        Ok(survivors)
    }

    /// The raw query as one quoted phrase, without the minimum-score filter.
    async fn phrase_fallback(
        &self,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredCandidate>, StoreError> {
        let expression = quote_phrase(&options.query);
        let candidates = self
            .store
            .search_by_expression(&expression, options.limit)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let max_access_count = self.max_access_count().await;
        let survivors: Vec<ScoredCandidate> = rank(
            candidates,
            &options.tags,
            max_access_count,
            options.project.as_deref(),
            &self.weights,
        )
        .into_iter()
        .take(options.limit)
        .collect();

        self.record_access(&survivors).await;
        Ok(survivors)
    }

    async fn max_access_count(&self) -> u64 {
        match self.store.max_access_count().await {
            Ok(count) => count,
            Err(error) => {
                warn!(%error, "could not read max access count, frequency signal disabled");
                0
            }
        }
    }

    /// Best effort: a failed increment is logged and otherwise ignored.
    async fn record_access(&self, survivors: &[ScoredCandidate]) {
        for scored in survivors {
            let memory_id = scored.memory().id;
            if let Err(error) = self.store.increment_access_count(memory_id).await {
                warn!(memory_id, %error, "failed to record memory access");
            }
        }
    }
}

fn quote_phrase(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{unix_now, Candidate, Memory, MemoryId, NewMemory};
    use async_trait::async_trait;
    use serde_json::Map;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const DAY: f64 = 86_400.0;

    #[derive(Default)]
    struct FakeStore {
        responses: Mutex<VecDeque<Result<Vec<Candidate>, StoreError>>>,
        lookups: Mutex<Vec<(String, usize)>>,
        increments: Mutex<Vec<MemoryId>>,
        fail_increments: bool,
        max_access: u64,
    }

    impl FakeStore {
        fn answering(responses: Vec<Result<Vec<Candidate>, StoreError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Default::default()
            }
        }

        fn lookups(&self) -> Vec<(String, usize)> {
            self.lookups.lock().unwrap().clone()
        }

        fn increments(&self) -> Vec<MemoryId> {
            self.increments.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MemoryStore for FakeStore {
        async fn search_by_expression(
            &self,
            expression: &str,
            limit: usize,
        ) -> Result<Vec<Candidate>, StoreError> {
            self.lookups
                .lock()
                .unwrap()
                .push((expression.to_string(), limit));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn max_access_count(&self) -> Result<u64, StoreError> {
            Ok(self.max_access)
        }

        async fn increment_access_count(&self, id: MemoryId) -> Result<(), StoreError> {
            if self.fail_increments {
                return Err(StoreError::Unavailable("read-only".to_string()));
            }
            self.increments.lock().unwrap().push(id);
            Ok(())
        }

        async fn store(&self, _memory: NewMemory) -> Result<MemoryId, StoreError> {
            Ok(0)
        }

        async fn get(&self, _id: MemoryId) -> Result<Option<Memory>, StoreError> {
            Ok(None)
        }

        async fn delete(&self, _id: MemoryId) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn list(
            &self,
            _limit: usize,
            _offset: usize,
            _tags: &[String],
        ) -> Result<Vec<Memory>, StoreError> {
            Ok(Vec::new())
        }

        async fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }

        async fn find_by_content(&self, _content: &str) -> Result<Option<MemoryId>, StoreError> {
            Ok(None)
        }
    }

    fn candidate(id: MemoryId, lexical_score: f64, age_days: f64, tags: &[&str]) -> Candidate {
        let now = unix_now();
        Candidate {
            memory: Memory {
                id,
                content: format!("memory {id}"),
                tags: tags.iter().map(|tag| tag.to_string()).collect(),
                source: Some("memory-recall".to_string()),
                created_at: now - age_days * DAY,
                updated_at: now,
                access_count: id as u64,
                metadata: Map::new(),
            },
            lexical_score,
        }
    }

    fn six_candidates() -> Vec<Candidate> {
        vec![
            candidate(1, -4.1, 1.0, &["auth"]),
            candidate(2, -3.7, 12.0, &["bug"]),
            candidate(3, -2.0, 40.0, &[]),
            candidate(4, -1.2, 500.0, &[]),
            candidate(5, -0.4, 900.0, &[]),
            candidate(6, -3.9, 3.0, &["auth", "bug"]),
        ]
    }

    #[tokio::test]
    async fn ranked_results_are_filtered_capped_and_fed_back() {
        let store = FakeStore {
            max_access: 6,
            ..FakeStore::answering(vec![Ok(six_candidates())])
        };
        let coordinator = SearchCoordinator::new(store);
        let options = SearchOptions {
            tags: vec!["auth".to_string()],
            ..SearchOptions::new("auth bug")
        };

        let results = coordinator.search(&options).await.into_results();

        assert!(!results.is_empty());
        assert!(results.len() <= 5);
        assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
        assert!(results.iter().all(|result| result.score >= 0.1));
        assert!(results.iter().all(|result| result.id != 5));

        let mut returned: Vec<MemoryId> = results.iter().map(|result| result.id).collect();
        let mut incremented = coordinator.store().increments();
        returned.sort_unstable();
        incremented.sort_unstable();
        assert_eq!(returned, incremented);

        let lookups = coordinator.store().lookups();
        assert_eq!(lookups.len(), 1);
        assert_eq!(lookups[0].1, 15);
        assert!(lookups[0].0.contains("\"authentication\""));
        assert!(lookups[0].0.contains("\"bug\""));
    }

    #[tokio::test]
    async fn empty_expanded_lookup_retries_plain_terms() {
        let store = FakeStore::answering(vec![Ok(Vec::new()), Ok(vec![candidate(3, -1.0, 0.0, &[])])]);
        let coordinator = SearchCoordinator::new(store);

        let outcome = coordinator.search(&SearchOptions::new("auth bug")).await;

        let results = outcome.into_results();
        assert_eq!(results.len(), 1);
        let lookups = coordinator.store().lookups();
        assert_eq!(lookups.len(), 2);
        assert_eq!(lookups[1], ("auth OR bug".to_string(), 15));
    }

    #[tokio::test]
    async fn no_candidates_after_retry_is_empty_without_feedback() {
        let coordinator = SearchCoordinator::new(FakeStore::default());

        let outcome = coordinator.search(&SearchOptions::new("deploy pipeline")).await;

        assert!(matches!(outcome, SearchOutcome::Empty));
        assert_eq!(coordinator.store().lookups().len(), 2);
        assert!(coordinator.store().increments().is_empty());
    }

    #[tokio::test]
    async fn expanded_failure_recovers_through_retry() {
        let store = FakeStore::answering(vec![
            Err(StoreError::Unavailable("fts: syntax error".to_string())),
            Ok(vec![candidate(8, -2.0, 0.0, &[])]),
        ]);
        let coordinator = SearchCoordinator::new(store);

        let results = coordinator.search(&SearchOptions::new("cache")).await.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 8);
    }

    #[tokio::test]
    async fn outage_degrades_to_retrieval_failure() {
        let store = FakeStore::answering(vec![
            Err(StoreError::Unavailable("down".to_string())),
            Err(StoreError::Unavailable("down".to_string())),
        ]);
        let coordinator = SearchCoordinator::new(store);

        let outcome = coordinator.search(&SearchOptions::new("cache")).await;
        assert!(outcome.is_failure());
        assert!(outcome.into_results().is_empty());
        assert!(coordinator.store().increments().is_empty());
    }

    #[tokio::test]
    async fn termless_query_with_failing_fallback_is_empty() {
        let store = FakeStore::answering(vec![Err(StoreError::Unavailable("down".to_string()))]);
        let coordinator = SearchCoordinator::new(store);

        let outcome = coordinator.search(&SearchOptions::new("!!!")).await;

        assert!(outcome.is_failure());
        assert!(outcome.into_results().is_empty());
        assert_eq!(coordinator.store().lookups(), vec![("\"!!!\"".to_string(), 5)]);
        assert!(coordinator.store().increments().is_empty());
    }

    #[tokio::test]
    async fn phrase_fallback_skips_min_score_filter() {
        let store = FakeStore::answering(vec![Ok(vec![
            candidate(1, -5.0, 0.0, &[]),
            candidate(2, -1.0, 2_000.0, &[]),
        ])]);
        let coordinator = SearchCoordinator::new(store);
        let options = SearchOptions {
            limit: 2,
            ..SearchOptions::new("what is it?")
        };

        let scored = coordinator.search_scored(&options).await.unwrap();

        assert_eq!(scored.len(), 2);
        assert!(scored[1].score < options.min_score);
        assert_eq!(coordinator.store().increments().len(), 2);
    }

    #[tokio::test]
    async fn phrase_fallback_escapes_quotes() {
        let coordinator = SearchCoordinator::new(FakeStore::default());
        let outcome = coordinator.search(&SearchOptions::new("\"?\"")).await;

        assert!(matches!(outcome, SearchOutcome::Empty));
        assert_eq!(coordinator.store().lookups()[0].0, "\"\"\"?\"\"\"");
    }

    #[tokio::test]
    async fn feedback_failures_do_not_change_results() {
        let store = FakeStore {
            fail_increments: true,
            ..FakeStore::answering(vec![Ok(vec![candidate(4, -1.0, 0.0, &[])])])
        };
        let coordinator = SearchCoordinator::new(store);

        let results = coordinator.search(&SearchOptions::new("cache")).await.into_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 4);
    }

    #[tokio::test]
    async fn custom_weights_flow_into_ranking() {
        let config = RecallConfig {
            weights: RankingWeights {
                lexical: 0.0,
                recency: 0.0,
                frequency: 0.0,
                tags: 0.0,
                project: 1.0,
            },
            ..RecallConfig::default()
        };
        let store = FakeStore::answering(vec![Ok(vec![candidate(1, -1.0, 0.0, &[])])]);
        let coordinator =
            SearchCoordinator::with_config(store, Arc::new(SynonymExpander::curated()), &config);
        let options = SearchOptions {
            project: Some("MEMORY-RECALL".to_string()),
            ..SearchOptions::new("cache")
        };

        let results = coordinator.search(&options).await.into_results();
        assert_eq!(results[0].score, 1.0);
    }
}
