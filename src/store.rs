use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;
use tracing::{debug, error, info, warn};

use crate::embedder::Embedder;
use crate::error::{Result, SearchError};
use crate::models::{
    CandidateRecord, CompositeKey, Field, FieldHit, HitMetadata, IndexStats, StoreStats,
    StoredEntry,
};

const TABLE: &str = "field_entries";

/// Read side of the vector store, as seen by the search engine.
#[async_trait]
pub trait FieldStore: Send + Sync {
    /// Embeds `query_text` and returns up to `limit` entries ordered by
    /// ascending cosine distance, optionally restricted to one field.
    async fn find_nearest(
        &self,
        query_text: &str,
        field: Option<Field>,
        limit: usize,
    ) -> Result<Vec<FieldHit>>;

    async fn get_entry(&self, candidate_id: &str, field: Field) -> Result<Option<StoredEntry>>;
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

/// Field embeddings persisted in SurrealDB, one record per composite key.
pub struct SurrealFieldStore<E> {
    db: Surreal<Db>,
    embedder: E,
}

#[derive(Debug, Deserialize)]
struct EntryTag {
    candidate_id: String,
    field_name: Field,
}

impl<E: Embedder> SurrealFieldStore<E> {
    pub async fn open(path: &Path, namespace: &str, database: &str, embedder: E) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let location = path.to_string_lossy();
        let db = Surreal::new::<RocksDb>(&*location).await?;
        info!(path = %path.display(), "opened field store");
        Self::init(db, namespace, database, embedder).await
    }

    pub async fn in_memory(embedder: E) -> Result<Self> {
        let db = Surreal::new::<Mem>(()).await?;
        Self::init(db, "resumes", "candidates", embedder).await
    }

    async fn init(db: Surreal<Db>, namespace: &str, database: &str, embedder: E) -> Result<Self> {
        db.use_ns(namespace).use_db(database).await?;
        db.query(
            "
            DEFINE TABLE field_entries SCHEMAFUL;
            DEFINE FIELD candidate_id ON field_entries TYPE string;
            DEFINE FIELD name ON field_entries TYPE string;
            DEFINE FIELD field_name ON field_entries TYPE string;
            DEFINE FIELD content ON field_entries TYPE string;
            DEFINE FIELD content_length ON field_entries TYPE int;
            DEFINE FIELD embedding ON field_entries TYPE array<float>;
            DEFINE FIELD confidence_score ON field_entries TYPE option<float>;
            DEFINE FIELD links ON field_entries TYPE string;
            DEFINE FIELD processing_timestamp ON field_entries TYPE option<string>;
            DEFINE FIELD indexed_at ON field_entries TYPE string;

            DEFINE INDEX idx_candidate ON field_entries FIELDS candidate_id;
            DEFINE INDEX idx_field_name ON field_entries FIELDS field_name;
        ",
        )
        .await?
        .check()?;

        Ok(Self { db, embedder })
    }

    /// Stores one entry per non-blank field and drops entries for fields that
    /// are now blank, in a single transaction. Returns the number of entries
    /// written.
    pub async fn store_candidate(&self, record: &CandidateRecord) -> Result<usize> {
        if record.id.trim().is_empty() {
            return Err(SearchError::InvalidRecord("candidate id is blank".into()));
        }

        let fields: Vec<(Field, &str)> = record.embeddable_fields().collect();
        if fields.is_empty() {
            warn!(candidate_id = %record.id, "no embeddable content");
        }

        let texts = fields.iter().map(|(_, content)| content.to_string()).collect::<Vec<_>>();
        let embeddings = if texts.is_empty() {
            Vec::new()
        } else {
            self.embedder.embed(texts)?
        };
        if embeddings.len() != fields.len() {
            return Err(SearchError::Embedding(format!(
                "expected {} embeddings, got {}",
                fields.len(),
                embeddings.len()
            )));
        }

        let links = serde_json::to_string(&record.links)?;
        let indexed_at = Utc::now().to_rfc3339();
        let present: HashSet<Field> = fields.iter().map(|(field, _)| *field).collect();

        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for i in 0..fields.len() {
            sql.push_str(&format!("UPDATE type::thing($table, $key{i}) CONTENT $entry{i};\n"));
        }
        let stale: Vec<String> = Field::ALL
            .into_iter()
            .filter(|f| !present.contains(f))
            .map(|field| CompositeKey::new(record.id.clone(), field).to_string())
            .collect();
        for i in 0..stale.len() {
            sql.push_str(&format!("DELETE type::thing($table, $stale{i});\n"));
        }
        sql.push_str("COMMIT TRANSACTION;");

        let mut query = self.db.query(sql).bind(("table", TABLE));
        for (i, ((field, content), embedding)) in fields.iter().zip(embeddings).enumerate() {
            let entry = StoredEntry {
                candidate_id: record.id.clone(),
                name: record.display_name().to_string(),
                field_name: *field,
                content: content.to_string(),
                content_length: content.chars().count(),
                embedding,
                confidence_score: record.confidence_score,
                links: links.clone(),
                processing_timestamp: record.processing_timestamp.clone(),
                indexed_at: indexed_at.clone(),
            };
            let key = entry.key().to_string();
            debug!(%key, "staging field embedding");
            query = query
                .bind((format!("key{i}"), key))
                .bind((format!("entry{i}"), entry));
        }
        for (i, key) in stale.into_iter().enumerate() {
            query = query.bind((format!("stale{i}"), key));
        }
        query.await?.check()?;

        info!(candidate_id = %record.id, entries = fields.len(), "stored candidate");
        Ok(fields.len())
    }

    /// Loads one [`CandidateRecord`] per line. Bad lines are logged and
    /// counted, never fatal.
    pub async fn index_jsonl(&self, path: &Path) -> Result<IndexStats> {
        let raw = fs::read_to_string(path)?;
        let mut stats = IndexStats::default();
        info!(path = %path.display(), "indexing candidates");

        for (line_num, line) in raw.lines().enumerate().map(|(i, l)| (i + 1, l.trim())) {
            if line.is_empty() {
                continue;
            }
            stats.processed += 1;

            let record: CandidateRecord = match serde_json::from_str(line) {
                Ok(record) => record,
                Err(e) => {
                    error!(line = line_num, error = %e, "malformed candidate record");
                    stats.failed += 1;
                    continue;
                }
            };

            match self.store_candidate(&record).await {
                Ok(0) => stats.failed += 1,
                Ok(count) => {
                    stats.stored += 1;
                    stats.total_embeddings += count;
                }
                Err(e) => {
                    error!(line = line_num, candidate_id = %record.id, error = %e, "failed to store candidate");
                    stats.failed += 1;
                }
            }
        }

        info!(?stats, "indexing complete");
        Ok(stats)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let tags: Vec<EntryTag> = self
            .db
            .query("SELECT candidate_id, field_name FROM field_entries")
            .await?
            .take(0)?;

        let mut field_distribution = BTreeMap::new();
        let mut candidates = HashSet::new();
        for tag in &tags {
            *field_distribution.entry(tag.field_name).or_insert(0) += 1;
            candidates.insert(tag.candidate_id.as_str());
        }

        Ok(StoreStats {
            total_embeddings: tags.len(),
            unique_candidates: candidates.len(),
            field_distribution,
        })
    }

    pub async fn reset(&self) -> Result<()> {
        self.db.query("DELETE field_entries").await?.check()?;
        warn!("field store reset");
        Ok(())
    }
}

#[async_trait]
impl<E: Embedder> FieldStore for SurrealFieldStore<E> {
    async fn find_nearest(
        &self,
        query_text: &str,
        field: Option<Field>,
        limit: usize,
    ) -> Result<Vec<FieldHit>> {
        if limit == 0 {
            return Err(SearchError::InvalidLimit);
        }
        let query_embedding = self.embedder.embed_one(query_text)?;

        let entries: Vec<StoredEntry> = match field {
            Some(field) => self
                .db
                .query("SELECT * FROM field_entries WHERE field_name = $field_name")
                .bind(("field_name", field.as_str()))
                .await?
                .take(0)?,
            None => self.db.query("SELECT * FROM field_entries").await?.take(0)?,
        };

        let mut hits: Vec<FieldHit> = entries
            .into_iter()
            .map(|entry| {
                let distance = 1.0 - cosine_similarity(&entry.embedding, &query_embedding);
                FieldHit {
                    key: entry.key(),
                    distance,
                    metadata: HitMetadata {
                        name: entry.name,
                        content: entry.content,
                        content_length: entry.content_length,
                    },
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.key.to_string().cmp(&b.key.to_string()))
        });
        hits.truncate(limit);

        debug!(field = ?field, hits = hits.len(), "nearest field entries");
        Ok(hits)
    }

    async fn get_entry(&self, candidate_id: &str, field: Field) -> Result<Option<StoredEntry>> {
        let key = CompositeKey::new(candidate_id, field).to_string();
        let entry: Option<StoredEntry> = self.db.select((TABLE, key.as_str())).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;
    use anyhow::Result;
    use tempfile::TempDir;

    fn candidate(id: &str, summary: &str, skills: &str) -> CandidateRecord {
        CandidateRecord {
            id: id.into(),
            name: Some(format!("Candidate {id}")),
            summary: summary.into(),
            skills: skills.into(),
            ..Default::default()
        }
    }

    async fn setup_store() -> SurrealFieldStore<HashingEmbedder> {
        SurrealFieldStore::in_memory(HashingEmbedder)
            .await
            .expect("Failed to create in-memory store")
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_store_skips_blank_fields() -> Result<()> {
        let store = setup_store().await;
        let record = candidate("c1", "Rust backend engineer", "   ");

        assert_eq!(store.store_candidate(&record).await?, 1);
        assert!(store.get_entry("c1", Field::Summary).await?.is_some());
        assert!(store.get_entry("c1", Field::Skills).await?.is_none());

        let entry = store.get_entry("c1", Field::Summary).await?.unwrap();
        assert_eq!(entry.name, "Candidate c1");
        assert_eq!(entry.content_length, "Rust backend engineer".len());
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_drops_fields_that_became_blank() -> Result<()> {
        let store = setup_store().await;
        store.store_candidate(&candidate("c1", "Rust engineer", "Rust, Tokio")).await?;
        store.store_candidate(&candidate("c1", "Rust engineer", "")).await?;

        assert!(store.get_entry("c1", Field::Skills).await?.is_none());
        let stats = store.stats().await?;
        assert_eq!(stats.total_embeddings, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_restore_replaces_text_of_every_field() -> Result<()> {
        let store = setup_store().await;
        store.store_candidate(&candidate("c1", "Go developer", "Go")).await?;
        store.store_candidate(&candidate("c1", "Rust engineer", "Rust, Tokio")).await?;

        let summary = store.get_entry("c1", Field::Summary).await?.unwrap();
        let skills = store.get_entry("c1", Field::Skills).await?.unwrap();
        assert_eq!(summary.content, "Rust engineer");
        assert_eq!(skills.content, "Rust, Tokio");
        assert_eq!(store.stats().await?.total_embeddings, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_blank_candidate_ids_are_rejected() -> Result<()> {
        let store = setup_store().await;
        store.store_candidate(&candidate("c1", "Go developer", "Go")).await?;

        let first = store.store_candidate(&candidate("", "Go developer", "Go")).await;
        let second = store.store_candidate(&candidate("   ", "Java developer", "Java")).await;
        assert!(matches!(first, Err(SearchError::InvalidRecord(_))));
        assert!(matches!(second, Err(SearchError::InvalidRecord(_))));

        let stats = store.stats().await?;
        assert_eq!(stats.total_embeddings, 2);
        assert_eq!(stats.unique_candidates, 1);
        assert!(store.get_entry("", Field::Summary).await?.is_none());

        let dir = TempDir::new()?;
        let path = dir.path().join("blank_ids.jsonl");
        let blank = serde_json::to_string(&candidate("", "Go developer", "Go"))?;
        let spaces = serde_json::to_string(&candidate(" ", "Java developer", "Java"))?;
        fs::write(&path, format!("{blank}\n{spaces}\n"))?;

        let indexed = store.index_jsonl(&path).await?;
        assert_eq!(indexed.processed, 2);
        assert_eq!(indexed.stored, 0);
        assert_eq!(indexed.failed, 2);
        assert_eq!(store.stats().await?.total_embeddings, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_nearest_filters_and_orders() -> Result<()> {
        let store = setup_store().await;
        store.store_candidate(&candidate("rust", "Rust systems programmer", "Rust Tokio async")).await?;
        store.store_candidate(&candidate("py", "Python data scientist", "Python pandas numpy")).await?;
        store.store_candidate(&candidate("mixed", "Rust and Python developer", "Python Rust")).await?;

        let hits = store.find_nearest("Rust Tokio", Some(Field::Skills), 10).await?;
        assert_eq!(hits.len(), 3);
        assert!(hits.iter().all(|hit| hit.key.field == Field::Skills));
        assert_eq!(hits[0].key.candidate_id, "rust");
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));

        let hits = store.find_nearest("Rust Tokio", None, 2).await?;
        assert_eq!(hits.len(), 2);

        let err = store.find_nearest("Rust", None, 0).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidLimit));
        Ok(())
    }

    #[tokio::test]
    async fn test_index_jsonl_counts_bad_lines() -> Result<()> {
        let store = setup_store().await;
        let dir = TempDir::new()?;
        let path = dir.path().join("resumes.jsonl");
        let good = serde_json::to_string(&candidate("a", "Go developer", "Go, gRPC"))?;
        let blank = serde_json::to_string(&candidate("b", " ", ""))?;
        fs::write(&path, format!("{good}\nnot json\n\n{blank}\n"))?;

        let stats = store.index_jsonl(&path).await?;
        assert_eq!(
            stats,
            IndexStats {
                processed: 3,
                stored: 1,
                failed: 2,
                total_embeddings: 2,
            }
        );

        let missing = store.index_jsonl(&dir.path().join("missing.jsonl")).await;
        assert!(matches!(missing, Err(SearchError::Io(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_stats_and_reset() -> Result<()> {
        let store = setup_store().await;
        store.store_candidate(&candidate("a", "Go developer", "Go")).await?;
        store.store_candidate(&candidate("b", "Java developer", "")).await?;

        let stats = store.stats().await?;
        assert_eq!(stats.total_embeddings, 3);
        assert_eq!(stats.unique_candidates, 2);
        assert_eq!(stats.field_distribution.get(&Field::Summary), Some(&2));
        assert_eq!(stats.field_distribution.get(&Field::Skills), Some(&1));

        store.reset().await?;
        assert_eq!(store.stats().await?, StoreStats::default());
        Ok(())
    }

    #[tokio::test]
    async fn test_open_creates_on_disk_store() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("nested").join("db");
        let store = SurrealFieldStore::open(&path, "resumes", "candidates", HashingEmbedder).await?;
        store.store_candidate(&candidate("a", "Go developer", "Go")).await?;

        assert!(store.get_entry("a", Field::Skills).await?.is_some());
        assert!(path.parent().unwrap().exists());
        Ok(())
    }
}
