//! SQLite-backed face store.
//!
//! One table per collection; embeddings live in a BLOB column of
//! little-endian `f32`s. The vector index is a row in
//! `facerec_vector_indexes` that pins the embedding dimensionality on the
//! first insert.

use crate::{vector_search_score, FaceRecord, FaceStore, SearchHit, StoreError, StoreSettings};
use facerec_core::Embedding;
use rusqlite::{params, Connection, OptionalExtension};
use std::cmp::Ordering;
use std::path::Path;

const MEMORY_URI: &str = ":memory:";

pub struct SqliteFaceStore {
    conn: Connection,
    settings: StoreSettings,
}

impl SqliteFaceStore {
    /// Open (creating if needed) the database described by `settings`.
    pub fn open(settings: StoreSettings) -> Result<Self, StoreError> {
        for ident in [
            &settings.database_name,
            &settings.collection_name,
            &settings.vector_index_name,
            &settings.vector_field_path,
        ] {
            validate_identifier(ident)?;
        }

        let conn = if settings.database_uri == MEMORY_URI {
            Connection::open_in_memory()?
        } else {
            let dir = Path::new(&settings.database_uri);
            std::fs::create_dir_all(dir)?;
            Connection::open(dir.join(format!("{}.sqlite3", settings.database_name)))?
        };

        let store = Self { conn, settings };
        store.init_schema()?;

        tracing::info!(
            uri = %store.settings.database_uri,
            database = %store.settings.database_name,
            collection = %store.settings.collection_name,
            index = %store.settings.vector_index_name,
            "face store opened"
        );

        Ok(store)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let c = &self.settings.collection_name;
        let f = &self.settings.vector_field_path;
        self.conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS facerec_vector_indexes (
                 name TEXT PRIMARY KEY,
                 collection TEXT NOT NULL,
                 path TEXT NOT NULL,
                 dimensions INTEGER,
                 similarity TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {c} (
                 id TEXT PRIMARY KEY,
                 name TEXT NOT NULL,
                 {f} BLOB NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS {c}_name_idx ON {c}(name);"
        ))?;

        self.conn.execute(
            "INSERT OR IGNORE INTO facerec_vector_indexes (name, collection, path, dimensions, similarity)
             VALUES (?1, ?2, ?3, NULL, 'cosine')",
            params![self.settings.vector_index_name, c, f],
        )?;

        let (collection, path): (String, String) = self.conn.query_row(
            "SELECT collection, path FROM facerec_vector_indexes WHERE name = ?1",
            params![self.settings.vector_index_name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if collection != *c || path != *f {
            tracing::warn!(
                index = %self.settings.vector_index_name,
                indexed_collection = %collection,
                indexed_path = %path,
                "vector index was defined for a different collection or path"
            );
        }

        Ok(())
    }

    /// Dimensionality pinned by the vector index, if any record was ever inserted.
    pub fn pinned_dimensions(&self) -> Result<Option<usize>, StoreError> {
        let dims: Option<i64> = self
            .conn
            .query_row(
                "SELECT dimensions FROM facerec_vector_indexes WHERE name = ?1",
                params![self.settings.vector_index_name],
                |row| row.get(0),
            )
            .optional()?
            .flatten();
        Ok(dims.map(|d| d as usize))
    }

    fn check_dimensions(&self, embedding: &Embedding) -> Result<Option<usize>, StoreError> {
        let pinned = self.pinned_dimensions()?;
        match pinned {
            Some(expected) if expected != embedding.dimensions() => Err(StoreError::DimensionMismatch {
                index: self.settings.vector_index_name.clone(),
                expected,
                actual: embedding.dimensions(),
            }),
            _ => Ok(pinned),
        }
    }

    /// Every record in insertion order.
    pub fn records(&self) -> Result<Vec<FaceRecord>, StoreError> {
        let c = &self.settings.collection_name;
        let f = &self.settings.vector_field_path;
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, name, {f}, created_at FROM {c} ORDER BY rowid"))?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Vec<u8>>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, name, blob, created_at) = row?;
            let values = decode_embedding(&name, &blob)?;
            records.push(FaceRecord {
                id,
                name,
                embedding: Embedding::new(values),
                created_at,
            });
        }
        Ok(records)
    }
}

impl FaceStore for SqliteFaceStore {
    fn insert(&self, name: &str, embedding: &Embedding) -> Result<(), StoreError> {
        if self.check_dimensions(embedding)?.is_none() {
            self.conn.execute(
                "UPDATE facerec_vector_indexes SET dimensions = ?2 WHERE name = ?1",
                params![self.settings.vector_index_name, embedding.dimensions() as i64],
            )?;
        }

        let c = &self.settings.collection_name;
        let f = &self.settings.vector_field_path;
        self.conn.execute(
            &format!("INSERT INTO {c} (id, name, {f}, created_at) VALUES (?1, ?2, ?3, ?4)"),
            params![
                uuid::Uuid::new_v4().to_string(),
                name,
                encode_embedding(&embedding.values),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn is_name_taken(&self, name: &str) -> Result<bool, StoreError> {
        let c = &self.settings.collection_name;
        let taken = self.conn.query_row(
            &format!("SELECT EXISTS(SELECT 1 FROM {c} WHERE name = ?1)"),
            params![name],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    fn update_name(&self, old_name: &str, new_name: &str) -> Result<bool, StoreError> {
        // Setting a field to its current value modifies nothing.
        if old_name == new_name {
            return Ok(false);
        }
        let c = &self.settings.collection_name;
        let changed = self.conn.execute(
            &format!("UPDATE {c} SET name = ?2 WHERE id = (SELECT id FROM {c} WHERE name = ?1 LIMIT 1)"),
            params![old_name, new_name],
        )?;
        Ok(changed == 1)
    }

    fn delete(&self, name: &str) -> Result<bool, StoreError> {
        let c = &self.settings.collection_name;
        let removed = self.conn.execute(
            &format!("DELETE FROM {c} WHERE id = (SELECT id FROM {c} WHERE name = ?1 LIMIT 1)"),
            params![name],
        )?;
        Ok(removed == 1)
    }

    fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let c = &self.settings.collection_name;
        let mut stmt = self.conn.prepare(&format!("SELECT name FROM {c} ORDER BY name"))?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn count(&self) -> Result<u64, StoreError> {
        let c = &self.settings.collection_name;
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {c}"), [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn search(&self, embedding: &Embedding) -> Result<SearchHit, StoreError> {
        // An empty collection has nothing to compare against, whatever the pinned dimensionality.
        if self.count()? == 0 {
            return Ok(SearchHit::none());
        }
        self.check_dimensions(embedding)?;

        let mut candidates: Vec<(String, f32)> = self
            .records()?
            .into_iter()
            .map(|r| {
                let score = vector_search_score(embedding, &r.embedding);
                (r.name, score)
            })
            .collect();

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        candidates.truncate(self.settings.num_candidates);
        candidates.truncate(self.settings.limit);

        let hit = match candidates.into_iter().next() {
            Some((name, score)) => SearchHit {
                is_match: score >= self.settings.similarity_threshold,
                name,
                score,
            },
            None => SearchHit::none(),
        };

        tracing::trace!(name = %hit.name, score = hit.score, is_match = hit.is_match, "vector search");
        Ok(hit)
    }
}

fn validate_identifier(ident: &str) -> Result<(), StoreError> {
    let mut chars = ident.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidIdentifier(ident.to_string()))
    }
}

fn encode_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(name: &str, blob: &[u8]) -> Result<Vec<f32>, StoreError> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::CorruptEmbedding {
            name: name.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteFaceStore {
        SqliteFaceStore::open(StoreSettings::new(
            MEMORY_URI,
            "facerec",
            "faces",
            "vector_index",
            "embedding",
        ))
        .unwrap()
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_empty_store_search_returns_none() {
        let store = store();
        assert_eq!(store.search(&emb(&[1.0, 0.0, 0.0])).unwrap(), SearchHit::none());
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_names().unwrap().is_empty());
    }

    #[test]
    fn test_search_after_last_delete_accepts_any_dimensions() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
        assert!(store.delete("Alice").unwrap());

        assert_eq!(store.search(&emb(&[1.0, 0.0])).unwrap(), SearchHit::none());
        assert_eq!(store.pinned_dimensions().unwrap(), Some(3));
    }

    #[test]
    fn test_insert_makes_name_taken_once() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0, 0.0])).unwrap();

        assert!(store.is_name_taken("Alice").unwrap());
        assert!(!store.is_name_taken("alice").unwrap());
        let names = store.list_names().unwrap();
        assert_eq!(names.iter().filter(|n| *n == "Alice").count(), 1);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_list_names_sorted() {
        let store = store();
        for name in ["carol", "Bob", "alice", "Alice"] {
            store.insert(name, &emb(&[1.0, 0.0])).unwrap();
        }
        assert_eq!(store.list_names().unwrap(), vec!["Alice", "Bob", "alice", "carol"]);
    }

    #[test]
    fn test_update_name_moves_record() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0])).unwrap();

        assert!(store.update_name("Alice", "Alicia").unwrap());
        assert!(store.is_name_taken("Alicia").unwrap());
        assert!(!store.is_name_taken("Alice").unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_name_missing_or_identical() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0])).unwrap();

        assert!(!store.update_name("Nobody", "Someone").unwrap());
        assert!(!store.update_name("Alice", "Alice").unwrap());
        assert_eq!(store.list_names().unwrap(), vec!["Alice"]);
    }

    #[test]
    fn test_delete_missing_leaves_count() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0])).unwrap();

        assert!(!store.delete("Bob").unwrap());
        assert_eq!(store.count().unwrap(), 1);

        assert!(store.delete("Alice").unwrap());
        assert_eq!(store.count().unwrap(), 0);
        assert!(!store.is_name_taken("Alice").unwrap());
    }

    #[test]
    fn test_delete_removes_one_record_per_call() {
        let store = store();
        store.insert("Twin", &emb(&[1.0, 0.0])).unwrap();
        store.insert("Twin", &emb(&[0.0, 1.0])).unwrap();

        assert!(store.delete("Twin").unwrap());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_search_picks_nearest() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
        store.insert("Bob", &emb(&[0.0, 1.0, 0.0])).unwrap();
        store.insert("Carol", &emb(&[0.0, 0.0, 1.0])).unwrap();

        let hit = store.search(&emb(&[0.1, 0.9, 0.0])).unwrap();
        assert_eq!(hit.name, "Bob");
        assert!(hit.is_match);
        assert!(hit.score > 0.9);
    }

    #[test]
    fn test_search_below_threshold_is_not_match() {
        let store = store();
        store.insert("Alice", &emb(&[1.0, 0.0])).unwrap();

        // Orthogonal → cosine 0 → score 0.5.
        let hit = store.search(&emb(&[0.0, 1.0])).unwrap();
        assert_eq!(hit.name, "Alice");
        assert!((hit.score - 0.5).abs() < 1e-6);
        assert!(!hit.is_match);
    }

    #[test]
    fn test_search_threshold_is_inclusive() {
        let settings = StoreSettings::new(MEMORY_URI, "facerec", "faces", "vector_index", "embedding")
            .with_threshold(0.5);
        let store = SqliteFaceStore::open(settings).unwrap();
        store.insert("Alice", &emb(&[1.0, 0.0])).unwrap();

        assert!(store.search(&emb(&[0.0, 1.0])).unwrap().is_match);
    }

    #[test]
    fn test_identical_embedding_scores_max() {
        let store = store();
        store.insert("Alice", &emb(&[0.3, -0.2, 0.9])).unwrap();
        let hit = store.search(&emb(&[0.3, -0.2, 0.9])).unwrap();
        assert!((hit.score - 1.0).abs() < 1e-5);
        assert!(hit.is_match);
    }

    #[test]
    fn test_dimension_pinned_on_first_insert() {
        let store = store();
        assert_eq!(store.pinned_dimensions().unwrap(), None);
        store.insert("Alice", &emb(&[1.0, 0.0, 0.0])).unwrap();
        assert_eq!(store.pinned_dimensions().unwrap(), Some(3));

        let err = store.insert("Bob", &emb(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(err, StoreError::DimensionMismatch { expected: 3, actual: 2, .. }));
        assert!(matches!(
            store.search(&emb(&[1.0])),
            Err(StoreError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_records_roundtrip_embedding_and_metadata() {
        let store = store();
        store.insert("Alice", &emb(&[0.25, -1.5])).unwrap();
        let records = store.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].embedding.values, vec![0.25, -1.5]);
        assert_eq!(records[0].id.len(), 36);
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0].created_at).is_ok());
    }

    #[test]
    fn test_invalid_identifier_rejected() {
        let settings = StoreSettings::new(MEMORY_URI, "facerec", "faces; DROP TABLE x", "idx", "embedding");
        assert!(matches!(
            SqliteFaceStore::open(settings),
            Err(StoreError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_decode_rejects_partial_floats() {
        assert!(decode_embedding("x", &[0, 0, 128]).is_err());
        assert_eq!(decode_embedding("x", &encode_embedding(&[1.0, 2.0])).unwrap(), vec![1.0, 2.0]);
    }
}
