use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

pub type MemoryId = i64;

/// Seconds since the unix epoch, with sub-second precision.
pub fn unix_now() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Formats a unix-seconds timestamp as RFC 3339, falling back to the epoch for
/// values chrono cannot represent.
pub fn to_rfc3339(seconds: f64) -> String {
    timestamp_to_datetime(seconds).to_rfc3339()
}

pub(crate) fn timestamp_to_datetime(seconds: f64) -> DateTime<Utc> {
    let micros = (seconds * 1_000_000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or_default()
}

/// A stored record, as owned by the backing store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Memory {
    pub id: MemoryId,
    pub content: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub created_at: f64,
    pub updated_at: f64,
    pub access_count: u64,
    pub metadata: Map<String, Value>,
}

/// Input for a single store call; one per chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMemory {
    pub content: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub metadata: Map<String, Value>,
    /// Overrides the creation time, used when importing exported memories.
    pub created_at: Option<f64>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }
}

/// A memory matched by the full-text index. `lexical_score` is engine-defined
/// and lower means a better match.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub memory: Memory,
    pub lexical_score: f64,
}

/// The raw per-signal values that went into a final score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SignalBreakdown {
    pub lexical: f64,
    pub recency: f64,
    pub frequency: f64,
    pub tags: f64,
    pub project: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f64,
    pub signals: SignalBreakdown,
}

impl ScoredCandidate {
    pub fn memory(&self) -> &Memory {
        &self.candidate.memory
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub query: String,
    pub tags: Vec<String>,
    pub limit: usize,
    pub min_score: f64,
    pub project: Option<String>,
}

impl SearchOptions {
    pub const DEFAULT_LIMIT: usize = 5;
    pub const DEFAULT_MIN_SCORE: f64 = 0.1;
    /// Stricter threshold for context injected without an explicit request.
    pub const HOOK_MIN_SCORE: f64 = 0.15;

    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            tags: Vec::new(),
            limit: Self::DEFAULT_LIMIT,
            min_score: Self::DEFAULT_MIN_SCORE,
            project: None,
        }
    }
}

/// The shape returned to callers of search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: MemoryId,
    pub content: String,
    pub tags: Vec<String>,
    pub score: f64,
    pub created_at: f64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source: Option<String>,
}

impl From<ScoredCandidate> for SearchResult {
    fn from(value: ScoredCandidate) -> Self {
        let memory = value.candidate.memory;
        Self {
            id: memory.id,
            content: memory.content,
            tags: memory.tags,
            score: (value.score * 1000.0).round() / 1000.0,
            created_at: memory.created_at,
            source: memory.source,
        }
    }
}

/// Result of one search call. Retrieval failures are kept apart from an empty
/// match even though callers usually treat them the same.
#[derive(Debug)]
pub enum SearchOutcome {
    Found(Vec<SearchResult>),
    Empty,
    RetrievalFailed(StoreError),
}

impl SearchOutcome {
    pub fn from_results(results: Vec<SearchResult>) -> Self {
        if results.is_empty() {
            Self::Empty
        } else {
            Self::Found(results)
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::RetrievalFailed(_))
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        match self {
            Self::Found(results) => results,
            Self::Empty | Self::RetrievalFailed(_) => Vec::new(),
        }
    }
}

/// Listing view of a memory with truncated content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySummary {
    pub id: MemoryId,
    pub content: String,
    pub tags: Vec<String>,
    pub created_at: String,
    pub access_count: u64,
    pub source: Option<String>,
}

impl MemorySummary {
    pub fn from_memory(memory: Memory, preview_chars: usize) -> Self {
        let content = if memory.content.chars().count() > preview_chars {
            let mut preview: String = memory.content.chars().take(preview_chars).collect();
            preview.push_str("...");
            preview
        } else {
            memory.content
        };

        Self {
            id: memory.id,
            content,
            tags: memory.tags,
            created_at: to_rfc3339(memory.created_at),
            access_count: memory.access_count,
            source: memory.source,
        }
    }
}
