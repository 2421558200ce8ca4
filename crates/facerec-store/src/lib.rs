//! facerec-store — Face embedding records and nearest-neighbour search.
//!
//! The store is a thin CRUD façade. Name uniqueness is the caller's job;
//! `insert` never checks for duplicates.

pub mod sqlite;

use facerec_core::Embedding;
use serde::Serialize;
use thiserror::Error;

pub use sqlite::SqliteFaceStore;

/// Candidates scored before the top result is picked.
pub const DEFAULT_NUM_CANDIDATES: usize = 10;
/// Results returned per search.
pub const DEFAULT_SEARCH_LIMIT: usize = 1;
/// Minimum vector-search score for a match.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.75;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("invalid identifier '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidIdentifier(String),
    #[error("embedding has {actual} dimensions, vector index '{index}' expects {expected}")]
    DimensionMismatch {
        index: String,
        expected: usize,
        actual: usize,
    },
    #[error("corrupt embedding for '{name}': {len} bytes is not a whole number of f32 values")]
    CorruptEmbedding { name: String, len: usize },
    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how records are kept.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Directory holding the database file, or `:memory:`.
    pub database_uri: String,
    pub database_name: String,
    pub collection_name: String,
    pub vector_index_name: String,
    pub vector_field_path: String,
    pub similarity_threshold: f32,
    pub num_candidates: usize,
    pub limit: usize,
}

impl StoreSettings {
    pub fn new(
        database_uri: impl Into<String>,
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
        vector_index_name: impl Into<String>,
        vector_field_path: impl Into<String>,
    ) -> Self {
        Self {
            database_uri: database_uri.into(),
            database_name: database_name.into(),
            collection_name: collection_name.into(),
            vector_index_name: vector_index_name.into(),
            vector_field_path: vector_field_path.into(),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// A persisted face.
#[derive(Debug, Clone, Serialize)]
pub struct FaceRecord {
    pub id: String,
    pub name: String,
    #[serde(skip)]
    pub embedding: Embedding,
    pub created_at: String,
}

/// Best match of a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    /// Empty when nothing was found.
    pub name: String,
    /// Vector-search score in [0, 1], higher = more similar.
    pub score: f32,
    pub is_match: bool,
}

impl SearchHit {
    pub fn none() -> Self {
        Self {
            name: String::new(),
            score: 0.0,
            is_match: false,
        }
    }
}

/// Cosine similarity rescaled to [0, 1] the way vector-search engines report it.
pub fn vector_search_score(a: &Embedding, b: &Embedding) -> f32 {
    (1.0 + a.similarity(b)) / 2.0
}

/// CRUD and similarity search over face records.
pub trait FaceStore {
    fn insert(&self, name: &str, embedding: &Embedding) -> Result<(), StoreError>;
    fn is_name_taken(&self, name: &str) -> Result<bool, StoreError>;
    /// True iff exactly one record's name changed.
    fn update_name(&self, old_name: &str, new_name: &str) -> Result<bool, StoreError>;
    /// True iff exactly one record was removed.
    fn delete(&self, name: &str) -> Result<bool, StoreError>;
    /// All names, sorted.
    fn list_names(&self) -> Result<Vec<String>, StoreError>;
    fn count(&self) -> Result<u64, StoreError>;
    fn search(&self, embedding: &Embedding) -> Result<SearchHit, StoreError>;
}
