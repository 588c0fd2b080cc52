use crate::models::{Candidate, Memory, MemoryId, NewMemory};
use crate::StoreError;
use async_trait::async_trait;

/// Persistent memory store with a full-text index.
///
/// `search_by_expression` accepts an OR of double-quoted terms and returns
/// candidates best first, scored lower-is-better.
#[async_trait]
pub trait MemoryStore {
    async fn search_by_expression(
        &self,
        expression: &str,
        limit: usize,
    ) -> Result<Vec<Candidate>, StoreError>;

    /// Highest access count across the whole store, 0 when empty.
    async fn max_access_count(&self) -> Result<u64, StoreError>;

    async fn increment_access_count(&self, id: MemoryId) -> Result<(), StoreError>;

    async fn store(&self, memory: NewMemory) -> Result<MemoryId, StoreError>;

    async fn get(&self, id: MemoryId) -> Result<Option<Memory>, StoreError>;

    async fn delete(&self, id: MemoryId) -> Result<bool, StoreError>;

    /// Newest first. With `tags`, keeps memories carrying any of them.
    async fn list(
        &self,
        limit: usize,
        offset: usize,
        tags: &[String],
    ) -> Result<Vec<Memory>, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    /// Id of a memory with exactly this content, if any.
    async fn find_by_content(&self, content: &str) -> Result<Option<MemoryId>, StoreError>;
}
