//! Multi-signal re-ranking of full-text candidates.
//!
//! `score = w_lex * lexical + w_rec * recency + w_freq * frequency
//!        + w_tags * tag_jaccard + w_proj * project_match`

use std::collections::HashSet;

use crate::models::{unix_now, Candidate, ScoredCandidate, SignalBreakdown};

/// Decay constant per day; a 30-day-old memory keeps ~0.741 of its recency.
pub const RECENCY_LAMBDA: f64 = 0.01;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Weights for the five ranking signals. They need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingWeights {
    pub lexical: f64,
    pub recency: f64,
    pub frequency: f64,
    pub tags: f64,
    pub project: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            lexical: 0.55,
            recency: 0.15,
            frequency: 0.05,
            tags: 0.15,
            project: 0.10,
        }
    }
}

impl RankingWeights {
    fn combine(&self, signals: &SignalBreakdown) -> f64 {
        self.lexical * signals.lexical
            + self.recency * signals.recency
            + self.frequency * signals.frequency
            + self.tags * signals.tags
            + self.project * signals.project
    }
}

/// Scores and orders `candidates` best first, relative to the current time.
pub fn rank(
    candidates: Vec<Candidate>,
    query_tags: &[String],
    max_access_count: u64,
    project: Option<&str>,
    weights: &RankingWeights,
) -> Vec<ScoredCandidate> {
    rank_at(
        candidates,
        query_tags,
        max_access_count,
        project,
        weights,
        unix_now(),
    )
}

/// Like [`rank`], with an explicit `now` in unix seconds.
pub fn rank_at(
    candidates: Vec<Candidate>,
    query_tags: &[String],
    max_access_count: u64,
    project: Option<&str>,
    weights: &RankingWeights,
    now: f64,
) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let bounds = LexicalBounds::of(&candidates);
    let query_tags = lowercase_set(query_tags);
    let project = project.map(str::to_lowercase);

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .map(|candidate| {
            let memory = &candidate.memory;
            let signals = SignalBreakdown {
                lexical: bounds.normalize(candidate.lexical_score),
                recency: recency_signal(memory.created_at, now),
                frequency: frequency_signal(memory.access_count, max_access_count),
                tags: tag_signal(&query_tags, &memory.tags),
                project: project_signal(project.as_deref(), memory.source.as_deref()),
            };
            let score = weights.combine(&signals);

            ScoredCandidate {
                candidate,
                score,
                signals,
            }
        })
        .collect();

    // stable: ties keep the store's order
    scored.sort_by(|left, right| right.score.total_cmp(&left.score));
    scored
}

/// Min/max of raw lexical scores within one batch; lower raw is better.
struct LexicalBounds {
    min: f64,
    max: f64,
}

impl LexicalBounds {
    fn of(candidates: &[Candidate]) -> Self {
        let (min, max) = candidates.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY),
            |(min, max), candidate| {
                (
                    min.min(candidate.lexical_score),
                    max.max(candidate.lexical_score),
                )
            },
        );
        Self { min, max }
    }

    fn normalize(&self, raw: f64) -> f64 {
        let range = self.max - self.min;
        if range == 0.0 {
            1.0
        } else {
            (self.max - raw) / range
        }
    }
}

/// `exp(-λ · age_days)`. Future timestamps yield values above 1.
pub fn recency_signal(created_at: f64, now: f64) -> f64 {
    let age_days = (now - created_at) / SECONDS_PER_DAY;
    (-RECENCY_LAMBDA * age_days).exp()
}

pub fn frequency_signal(access_count: u64, max_access_count: u64) -> f64 {
    if max_access_count == 0 {
        return 0.0;
    }
    (access_count as f64).ln_1p() / (max_access_count as f64).ln_1p()
}

fn tag_signal(query_tags: &HashSet<String>, memory_tags: &[String]) -> f64 {
    if query_tags.is_empty() || memory_tags.is_empty() {
        return 0.0;
    }
    jaccard(query_tags, &lowercase_set(memory_tags))
}

fn project_signal(project: Option<&str>, source: Option<&str>) -> f64 {
    match (project, source) {
        (Some(project), Some(source)) if source.to_lowercase() == project => 1.0,
        _ => 0.0,
    }
}

pub fn jaccard(left: &HashSet<String>, right: &HashSet<String>) -> f64 {
    let union = left.union(right).count();
    if union == 0 {
        return 0.0;
    }
    left.intersection(right).count() as f64 / union as f64
}

fn lowercase_set(tags: &[String]) -> HashSet<String> {
    tags.iter().map(|tag| tag.to_lowercase()).collect()
}
