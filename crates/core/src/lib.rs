pub mod chunking;
pub mod config;
pub mod error;
pub mod hook;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod ranking;
pub mod stores;
pub mod synonyms;
pub mod tokenizer;
pub mod traits;
pub mod transfer;

pub use chunking::{chunk_text, Chunk, ChunkingConfig};
pub use config::RecallConfig;
pub use error::{IngestError, StoreError};
pub use hook::{project_name, render_context, HookInput};
pub use ingest::{ingest_text, IngestRequest, IngestionReport, StoredChunk};
pub use models::{
    Candidate, Memory, MemoryId, MemorySummary, NewMemory, ScoredCandidate, SearchOptions,
    SearchOutcome, SearchResult, SignalBreakdown,
};
pub use orchestrator::SearchCoordinator;
pub use ranking::{rank, RankingWeights};
pub use stores::SqliteMemoryStore;
pub use synonyms::SynonymExpander;
pub use tokenizer::tokenize;
pub use traits::MemoryStore;
pub use transfer::{export_memories, import_memories, parse_export, ExportDocument, ImportReport};
