//! JSON export and import of the whole store.

use crate::models::{unix_now, to_rfc3339, NewMemory};
use crate::traits::MemoryStore;
use crate::IngestError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub const EXPORT_FORMAT_VERSION: u32 = 1;

const EXPORT_BATCH_SIZE: usize = 1_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportedMemory {
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_at: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExportDocument {
    #[serde(default = "current_version")]
    pub version: u32,
    #[serde(default)]
    pub exported_at: String,
    #[serde(default)]
    pub count: usize,
    pub memories: Vec<ExportedMemory>,
}

fn current_version() -> u32 {
    EXPORT_FORMAT_VERSION
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

pub async fn export_memories<S>(store: &S) -> Result<ExportDocument, IngestError>
where
    S: MemoryStore + Sync,
{
    let mut memories = Vec::new();
    let mut offset = 0;

    loop {
        let batch = store.list(EXPORT_BATCH_SIZE, offset, &[]).await?;
        let fetched = batch.len();
        memories.extend(batch.into_iter().map(|memory| ExportedMemory {
            content: memory.content,
            tags: memory.tags,
            source: memory.source,
            created_at: Some(memory.created_at),
            metadata: memory.metadata,
        }));

        if fetched < EXPORT_BATCH_SIZE {
            break;
        }
        offset += fetched;
    }

    debug!(count = memories.len(), "exported memories");
    Ok(ExportDocument {
        version: EXPORT_FORMAT_VERSION,
        exported_at: to_rfc3339(unix_now()),
        count: memories.len(),
        memories,
    })
}

/// Stores every exported memory whose exact content is not already present.
/// Creation times from the export are kept.
pub async fn import_memories<S>(
    store: &S,
    document: ExportDocument,
) -> Result<ImportReport, IngestError>
where
    S: MemoryStore + Sync,
{
    if document.version != EXPORT_FORMAT_VERSION {
        return Err(IngestError::InvalidArgument(format!(
            "unsupported export version {}",
            document.version
        )));
    }

    let mut report = ImportReport::default();
    for exported in document.memories {
        if exported.content.trim().is_empty()
            || store.find_by_content(&exported.content).await?.is_some()
        {
            report.skipped += 1;
            continue;
        }

        store
            .store(NewMemory {
                content: exported.content,
                tags: exported.tags,
                source: exported.source,
                metadata: exported.metadata,
                created_at: exported.created_at,
            })
            .await?;
        report.imported += 1;
    }

    info!(imported = report.imported, skipped = report.skipped, "import complete");
    Ok(report)
}

/// Parses an export file, rejecting documents without a `memories` array.
pub fn parse_export(raw: &str) -> Result<ExportDocument, IngestError> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::SqliteMemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn export_then_import_skips_duplicates() -> Result<(), Box<dyn std::error::Error>> {
        let source = SqliteMemoryStore::open_in_memory()?;
        source
            .store(NewMemory::new("Use pnpm, not npm").with_tags(vec!["tooling".to_string()]))
            .await?;
        source.store(NewMemory::new("Prod database is read-only on Fridays")).await?;

        let document = export_memories(&source).await?;
        assert_eq!(document.count, 2);
        assert_eq!(document.version, 1);

        let target = SqliteMemoryStore::open_in_memory()?;
        target.store(NewMemory::new("Use pnpm, not npm")).await?;

        let report = import_memories(&target, document.clone()).await?;
        assert_eq!(report, ImportReport { imported: 1, skipped: 1 });
        assert_eq!(target.count().await?, 2);

        let imported = target
            .find_by_content("Prod database is read-only on Fridays")
            .await?
            .ok_or("missing import")?;
        let memory = target.get(imported).await?.ok_or("missing memory")?;
        let original = document
            .memories
            .iter()
            .find(|exported| exported.content == memory.content)
            .ok_or("missing export entry")?;
        assert_eq!(Some(memory.created_at), original.created_at);
        Ok(())
    }

    #[test]
    fn parse_export_requires_memories() {
        assert!(parse_export(r#"{"version":1,"count":0}"#).is_err());

        let document = parse_export(
            &json!({
                "memories": [{ "content": "only content" }]
            })
            .to_string(),
        )
        .unwrap();
        assert_eq!(document.memories[0].tags, Vec::<String>::new());
        assert_eq!(document.memories[0].created_at, None);
        assert_eq!(document.version, EXPORT_FORMAT_VERSION);
    }

    #[tokio::test]
    async fn unknown_versions_are_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let store = SqliteMemoryStore::open_in_memory()?;
        let document = ExportDocument {
            version: 2,
            exported_at: String::new(),
            count: 0,
            memories: Vec::new(),
        };
        assert!(import_memories(&store, document).await.is_err());
        Ok(())
    }
}
