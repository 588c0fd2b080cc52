pub mod sqlite;

pub use sqlite::SqliteMemoryStore;
