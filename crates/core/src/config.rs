use crate::chunking::ChunkingConfig;
use crate::models::SearchOptions;
use crate::ranking::RankingWeights;

/// Tunables for ingestion and recall.
#[derive(Debug, Clone, PartialEq)]
pub struct RecallConfig {
    pub chunking: ChunkingConfig,
    pub weights: RankingWeights,
    pub default_limit: usize,
    pub min_score: f64,
    pub hook_min_score: f64,
    /// Candidates fetched per requested result, leaving room for re-ranking.
    pub over_fetch_factor: usize,
    pub list_preview_chars: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            weights: RankingWeights::default(),
            default_limit: SearchOptions::DEFAULT_LIMIT,
            min_score: SearchOptions::DEFAULT_MIN_SCORE,
            hook_min_score: SearchOptions::HOOK_MIN_SCORE,
            over_fetch_factor: 3,
            list_preview_chars: 200,
        }
    }
}

impl RecallConfig {
    pub fn search_options(&self, query: impl Into<String>) -> SearchOptions {
        SearchOptions {
            limit: self.default_limit,
            min_score: self.min_score,
            ..SearchOptions::new(query)
        }
    }

    pub fn hook_options(&self, query: impl Into<String>, project: Option<String>) -> SearchOptions {
        SearchOptions {
            limit: self.default_limit,
            min_score: self.hook_min_score,
            project,
            ..SearchOptions::new(query)
        }
    }
}
