use crate::chunking::{chunk_text, ChunkingConfig};
use crate::models::{MemoryId, NewMemory};
use crate::traits::MemoryStore;
use crate::IngestError;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredChunk {
    pub id: MemoryId,
    pub length: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub chunks: Vec<StoredChunk>,
}

/// What to store: the text plus labels copied onto every chunk.
#[derive(Debug, Clone, Default)]
pub struct IngestRequest {
    pub content: String,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub metadata: Map<String, Value>,
}

impl IngestRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Chunks `request.content` and stores each chunk as an independent memory.
pub async fn ingest_text<S>(
    store: &S,
    request: IngestRequest,
    config: ChunkingConfig,
) -> Result<IngestionReport, IngestError>
where
    S: MemoryStore + Sync,
{
    config.validate()?;
    if request.content.trim().is_empty() {
        return Err(IngestError::EmptyContent);
    }

    let mut report = IngestionReport::default();
    for chunk in chunk_text(&request.content, config) {
        let id = store
            .store(NewMemory {
                content: chunk.text,
                tags: request.tags.clone(),
                source: request.source.clone(),
                metadata: request.metadata.clone(),
                created_at: None,
            })
            .await?;
        report.chunks.push(StoredChunk {
            id,
            length: chunk.length,
        });
    }

    info!(
        chunks = report.chunks.len(),
        source = request.source.as_deref().unwrap_or("-"),
        "stored memory"
    );
    Ok(report)
}
