//! File-backed vector store
//!
//! Each collection lives in `<directory>/<collection>.json`. Writes go to a
//! uniquely named temporary file that is renamed over the collection file, so
//! readers never see a partially written store. Writers hold an advisory lock
//! on `<directory>/.<collection>.lock` while they reload, merge and write, so
//! concurrent writers (other handles or processes) never lose each other's
//! records. Reads reload the file first if it changed since it was last read.
//!
//! Author: hephaex@gmail.com

use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use assistant_core::{
    AssistantError, DistanceMetric, QueryResult, Result, ScoredRecord, VectorRecord,
};
use async_trait::async_trait;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::sync::RwLock;

use crate::distance::{distance, relevance_score};

/// On-disk format version
const STORE_VERSION: u32 = 1;

/// Serialized collection
#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    collection: String,
    metric: DistanceMetric,
    records: Vec<VectorRecord>,
}

/// Identifies one version of the collection file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Debug, Default)]
struct State {
    /// Records in insertion order
    records: Vec<VectorRecord>,
    /// Record id -> position in `records`
    index: HashMap<String, usize>,
    /// Stamp of the file the records were loaded from
    stamp: Option<FileStamp>,
}

impl State {
    fn replace(&mut self, records: Vec<VectorRecord>) {
        self.index = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.id.clone(), i))
            .collect();
        self.records = records;
    }

    fn dimension(&self) -> Option<usize> {
        self.records.first().map(|r| r.embedding.len())
    }
}

/// Exclusive advisory lock on a collection, released on drop
struct WriteLock {
    file: File,
}

impl WriteLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || -> Result<Self> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| storage_error(&path, e))?;
            file.lock_exclusive().map_err(|e| storage_error(&path, e))?;
            Ok(Self { file })
        })
        .await
        .map_err(join_error)?
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(error = %e, "Failed to release vector store lock");
        }
    }
}

/// Vector store persisted as a JSON file per collection
pub struct LocalVectorStore {
    path: PathBuf,
    lock_path: PathBuf,
    collection: String,
    metric: DistanceMetric,
    state: RwLock<State>,
}

impl LocalVectorStore {
    /// Open (or create) a collection below `directory`.
    ///
    /// An existing collection keeps the metric it was created with.
    pub async fn open(
        directory: impl AsRef<Path>,
        collection: impl Into<String>,
        metric: DistanceMetric,
    ) -> Result<Self> {
        let collection = collection.into();
        validate_collection_name(&collection)?;

        let directory = directory.as_ref();
        tokio::fs::create_dir_all(directory).await.map_err(|e| {
            AssistantError::StorageError(format!(
                "Failed to create store directory {}: {e}",
                directory.display()
            ))
        })?;

        let mut store = Self {
            path: Self::store_path(directory, &collection),
            lock_path: directory.join(format!(".{collection}.lock")),
            collection,
            metric,
            state: RwLock::new(State::default()),
        };

        if let Some((file, stamp)) = store.read_file().await? {
            if file.metric != metric {
                tracing::warn!(
                    collection = %store.collection,
                    requested = %metric,
                    stored = %file.metric,
                    "Collection exists with a different metric, keeping the stored one"
                );
            }
            store.metric = file.metric;

            let state = store.state.get_mut();
            state.replace(file.records);
            state.stamp = Some(stamp);
        }

        tracing::info!(
            path = %store.path.display(),
            records = store.state.get_mut().records.len(),
            metric = %store.metric,
            "Opened vector store"
        );

        Ok(store)
    }

    /// Whether a collection has been persisted below `directory`
    pub fn is_persisted(directory: impl AsRef<Path>, collection: &str) -> bool {
        Self::store_path(directory.as_ref(), collection).is_file()
    }

    /// Location of the collection file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn store_path(directory: &Path, collection: &str) -> PathBuf {
        directory.join(format!("{collection}.json"))
    }

    async fn stamp(&self) -> Result<Option<FileStamp>> {
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(Some(FileStamp {
                modified: meta.modified().map_err(|e| storage_error(&self.path, e))?,
                len: meta.len(),
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error(&self.path, e)),
        }
    }

    async fn read_file(&self) -> Result<Option<(StoreFile, FileStamp)>> {
        let Some(stamp) = self.stamp().await? else {
            return Ok(None);
        };

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| storage_error(&self.path, e))?;
        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
            AssistantError::StorageError(format!(
                "Corrupt vector store {}: {e}",
                self.path.display()
            ))
        })?;

        if file.version != STORE_VERSION {
            return Err(AssistantError::StorageError(format!(
                "Unsupported vector store version {} in {}",
                file.version,
                self.path.display()
            )));
        }

        Ok(Some((file, stamp)))
    }

    /// Reload from disk if the file changed since it was last read
    async fn refresh(&self, state: &mut State) -> Result<()> {
        let current = self.stamp().await?;
        if current == state.stamp {
            return Ok(());
        }
        self.reload(state).await
    }

    /// Unconditionally replace `state` with the file contents
    async fn reload(&self, state: &mut State) -> Result<()> {
        match self.read_file().await? {
            Some((file, stamp)) => {
                tracing::debug!(path = %self.path.display(), "Reloading changed vector store");
                state.replace(file.records);
                state.stamp = Some(stamp);
            }
            None => {
                state.replace(Vec::new());
                state.stamp = None;
            }
        }

        Ok(())
    }

    /// Write `records` to a fresh temporary file and rename it over the store
    async fn persist(&self, records: &[VectorRecord]) -> Result<FileStamp> {
        let file = StoreFile {
            version: STORE_VERSION,
            collection: self.collection.clone(),
            metric: self.metric,
            records: records.to_vec(),
        };
        let bytes = serde_json::to_vec(&file)
            .map_err(|e| AssistantError::StorageError(format!("Failed to encode store: {e}")))?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(join_error)??;

        self.stamp().await?.ok_or_else(|| {
            AssistantError::StorageError(format!(
                "Vector store {} vanished after write",
                self.path.display()
            ))
        })
    }

    /// Apply `change` to the current on-disk records and write the result.
    ///
    /// Runs under the collection lock with a fresh reload, so a concurrent
    /// writer's records are merged rather than overwritten. `change` returns
    /// the number of records it touched; nothing is written when it is zero.
    /// A failed write leaves the in-memory state as it was on disk.
    async fn write_with<F>(&self, change: F) -> Result<usize>
    where
        F: FnOnce(&mut Vec<VectorRecord>, &mut HashMap<String, usize>) -> Result<usize> + Send,
    {
        let mut state = self.state.write().await;
        let _lock = WriteLock::acquire(self.lock_path.clone()).await?;
        self.reload(&mut state).await?;

        let mut staged = state.records.clone();
        let mut index = state.index.clone();
        let changed = change(&mut staged, &mut index)?;
        if changed == 0 {
            return Ok(0);
        }

        let stamp = self.persist(&staged).await?;
        state.records = staged;
        state.index = index;
        state.stamp = Some(stamp);
        Ok(changed)
    }

    async fn refreshed_read(&self) -> Result<tokio::sync::RwLockReadGuard<'_, State>> {
        let mut state = self.state.write().await;
        self.refresh(&mut state).await?;
        Ok(state.downgrade())
    }
}

#[async_trait]
impl super::VectorStore for LocalVectorStore {
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let total = records.len();
        let changed = self
            .write_with(|staged, index| merge_records(staged, index, records))
            .await?;

        if changed == 0 {
            tracing::debug!(total, "Upsert left the store unchanged");
        } else {
            tracing::info!(changed, total, collection = %self.collection, "Upserted records");
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<QueryResult> {
        if k == 0 {
            return Err(AssistantError::InvalidArgument(
                "k must be greater than zero".to_string(),
            ));
        }
        if vector.is_empty() {
            return Err(AssistantError::InvalidArgument(
                "query vector is empty".to_string(),
            ));
        }

        let state = self.refreshed_read().await?;
        if let Some(dimension) = state.dimension() {
            if dimension != vector.len() {
                return Err(AssistantError::InvalidArgument(format!(
                    "query vector has dimension {}, store expects {dimension}",
                    vector.len()
                )));
            }
        }

        let mut scored: Vec<(usize, f32)> = state
            .records
            .iter()
            .enumerate()
            .map(|(i, r)| (i, distance(self.metric, vector, &r.embedding)))
            .collect();

        // Stable sort: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, d)| ScoredRecord {
                record: state.records[i].clone(),
                distance: d,
                score: relevance_score(self.metric, d),
            })
            .collect())
    }

    async fn dump(&self) -> Result<Vec<VectorRecord>> {
        Ok(self.refreshed_read().await?.records.clone())
    }

    async fn sources(&self) -> Result<BTreeSet<String>> {
        let state = self.refreshed_read().await?;
        Ok(state
            .records
            .iter()
            .map(|r| r.metadata.source.clone())
            .collect())
    }

    async fn replace_sources(
        &self,
        sources: &BTreeSet<String>,
        records: Vec<VectorRecord>,
    ) -> Result<usize> {
        let mut removed = 0;
        let changed = self
            .write_with(|staged, index| {
                let before = staged.len();
                staged.retain(|r| !sources.contains(&r.metadata.source));
                removed = before - staged.len();
                if removed > 0 {
                    *index = staged
                        .iter()
                        .enumerate()
                        .map(|(i, r)| (r.id.clone(), i))
                        .collect();
                }
                Ok(removed + merge_records(staged, index, records)?)
            })
            .await?;

        if changed > 0 {
            tracing::info!(
                removed,
                changed,
                collection = %self.collection,
                "Replaced records of sources"
            );
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.refreshed_read().await?.records.len())
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.stamp().await?.is_some())
    }

    fn metric(&self) -> DistanceMetric {
        self.metric
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    fn location(&self) -> String {
        self.path
            .parent()
            .map(|dir| dir.display().to_string())
            .unwrap_or_default()
    }
}

/// Overwrite records by id in place and append new ones.
///
/// All records must share the dimension of what is already stored; on error
/// `staged` may be partially modified and must be discarded.
fn merge_records(
    staged: &mut Vec<VectorRecord>,
    index: &mut HashMap<String, usize>,
    records: Vec<VectorRecord>,
) -> Result<usize> {
    let Some(first) = records.first() else {
        return Ok(0);
    };
    let dimension = staged
        .first()
        .map_or(first.embedding.len(), |r| r.embedding.len());
    if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
        return Err(AssistantError::InvalidArgument(format!(
            "record {} has dimension {}, store expects {dimension}",
            bad.id,
            bad.embedding.len()
        )));
    }

    let mut changed = 0;
    for record in records {
        match index.get(&record.id) {
            Some(&pos) => {
                if staged[pos] != record {
                    staged[pos] = record;
                    changed += 1;
                }
            }
            None => {
                index.insert(record.id.clone(), staged.len());
                staged.push(record);
                changed += 1;
            }
        }
    }
    Ok(changed)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| storage_error(dir, e))?;
    tmp.write_all(bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| storage_error(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| storage_error(path, e.error))?;
    Ok(())
}

fn validate_collection_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AssistantError::ConfigError(format!(
            "Invalid collection name '{name}': use letters, digits, '-' or '_'"
        )))
    }
}

fn storage_error(path: &Path, err: std::io::Error) -> AssistantError {
    AssistantError::StorageError(format!("{}: {err}", path.display()))
}

fn join_error(err: tokio::task::JoinError) -> AssistantError {
    AssistantError::StorageError(format!("Vector store task failed: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VectorStore;
    use assistant_core::{Chunk, ChunkMetadata, DocumentMetadata};

    fn record(source: &str, start: usize, text: &str, embedding: Vec<f32>) -> VectorRecord {
        let meta = ChunkMetadata::from_document(&DocumentMetadata::new(source), start);
        Chunk::new(text, meta)
            .with_embedding(embedding)
            .into_record()
            .unwrap()
    }

    fn sample() -> Vec<VectorRecord> {
        vec![
            record("a.html", 0, "alpha", vec![0.0, 0.0]),
            record("a.html", 800, "beta", vec![3.0, 4.0]),
            record("b.html", 0, "gamma", vec![1.0, 0.0]),
        ]
    }

    async fn open(dir: &Path) -> LocalVectorStore {
        LocalVectorStore::open(dir, "docs", DistanceMetric::L2)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        assert!(!store.exists().await.unwrap());
        assert_eq!(store.collection(), "docs");

        store.upsert(sample()).await.unwrap();
        let first = store.dump().await.unwrap();
        store.upsert(sample()).await.unwrap();
        let second = store.dump().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.len(), 3);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        let changed = record("a.html", 0, "alpha, revised", vec![0.5, 0.5]);
        store.upsert(vec![changed.clone()]).await.unwrap();

        let dump = store.dump().await.unwrap();
        assert_eq!(dump.len(), 3);
        // Keeps its original position
        assert_eq!(dump[0], changed);
    }

    #[tokio::test]
    async fn test_query_sorted_by_distance() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        let results = store.query(&[3.0, 3.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.record.text.as_str()).collect();
        assert_eq!(texts, vec!["beta", "gamma", "alpha"]);
        for pair in results.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(results[0].distance, 1.0);
    }

    #[tokio::test]
    async fn test_query_k_larger_than_store_returns_all() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        assert_eq!(store.query(&[0.0, 0.0], 10).await.unwrap().len(), 3);
        assert_eq!(store.query(&[0.0, 0.0], 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_ties_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store
            .upsert(vec![
                record("x.html", 0, "first", vec![1.0, 0.0]),
                record("y.html", 0, "second", vec![-1.0, 0.0]),
                record("z.html", 0, "third", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&[0.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.record.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_query_rejects_bad_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        assert!(matches!(
            store.query(&[0.0, 0.0], 0).await,
            Err(AssistantError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.query(&[0.0, 0.0, 0.0], 1).await,
            Err(AssistantError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_upsert_rejects_mixed_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        let err = store
            .upsert(vec![record("c.html", 0, "wide", vec![1.0, 2.0, 3.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidArgument(_)));
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open(dir.path()).await;
            store.upsert(sample()).await.unwrap();
        }

        assert!(LocalVectorStore::is_persisted(dir.path(), "docs"));
        let reopened = open(dir.path()).await;
        assert!(reopened.exists().await.unwrap());
        assert_eq!(reopened.dump().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_second_handle_observes_writes() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open(dir.path()).await;
        let writer = open(dir.path()).await;

        assert_eq!(reader.len().await.unwrap(), 0);
        writer.upsert(sample()).await.unwrap();
        assert_eq!(reader.dump().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_existing_collection_keeps_metric() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path(), "docs", DistanceMetric::Cosine)
            .await
            .unwrap();
        store.upsert(sample()).await.unwrap();

        let reopened = open(dir.path()).await;
        assert_eq!(reopened.metric(), DistanceMetric::Cosine);
    }

    #[tokio::test]
    async fn test_sources_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        let sources = store.sources().await.unwrap();
        assert_eq!(
            sources.into_iter().collect::<Vec<_>>(),
            vec!["a.html", "b.html"]
        );

        let removed = store
            .replace_sources(
                &BTreeSet::from(["a.html".to_string()]),
                vec![record("a.html", 0, "alpha, again", vec![2.0, 2.0])],
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);

        let texts: Vec<String> = store.dump().await.unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["gamma", "alpha, again"]);
        assert_eq!(store.query(&[0.0, 0.0], 5).await.unwrap().len(), 2);

        // Nothing to add: a plain delete
        let removed = store
            .replace_sources(&BTreeSet::from(["b.html".to_string()]), Vec::new())
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_replace_with_bad_dimension_keeps_old_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        let err = store
            .replace_sources(
                &BTreeSet::from(["a.html".to_string()]),
                vec![record("a.html", 0, "wide", vec![1.0, 2.0, 3.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidArgument(_)));
        assert_eq!(store.dump().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_query_cosine_metric() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path(), "docs", DistanceMetric::Cosine)
            .await
            .unwrap();
        store
            .upsert(vec![
                record("x.html", 0, "orthogonal", vec![0.0, 1.0]),
                record("y.html", 0, "parallel", vec![10.0, 0.0]),
                record("z.html", 0, "opposite", vec![-1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.record.text.as_str()).collect();
        // Magnitude does not matter, direction does
        assert_eq!(texts, vec!["parallel", "orthogonal", "opposite"]);
        assert!(results[0].distance.abs() < 1e-6);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[2].distance - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_query_inner_product_metric() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalVectorStore::open(dir.path(), "docs", DistanceMetric::Ip)
            .await
            .unwrap();
        store
            .upsert(vec![
                record("x.html", 0, "small", vec![0.5, 0.0]),
                record("y.html", 0, "large", vec![2.0, 0.0]),
                record("z.html", 0, "across", vec![0.0, 3.0]),
            ])
            .await
            .unwrap();

        let results = store.query(&[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.record.text.as_str()).collect();
        // Larger dot product, smaller distance
        assert_eq!(texts, vec!["large", "small", "across"]);
        assert!((results[0].distance - (-1.0)).abs() < 1e-6);
        assert!((results[2].distance - 1.0).abs() < 1e-6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writers_keep_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let first = std::sync::Arc::new(open(dir.path()).await);
        let second = std::sync::Arc::new(open(dir.path()).await);

        let mut tasks = Vec::new();
        for (name, store) in [("first", first.clone()), ("second", second.clone())] {
            tasks.push(tokio::spawn(async move {
                for i in 0..10 {
                    let source = format!("{name}-{i}.html");
                    store
                        .upsert(vec![record(&source, 0, &source, vec![i as f32, 1.0])])
                        .await?;
                }
                Ok::<_, AssistantError>(())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let reopened = open(dir.path()).await;
        assert_eq!(reopened.len().await.unwrap(), 20);
        assert_eq!(first.len().await.unwrap(), 20);
        assert_eq!(second.sources().await.unwrap().len(), 20);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_write_leaves_store_unchanged() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.upsert(sample()).await.unwrap();

        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o555)).unwrap();
        // Permission bits do not bind privileged users
        let writable = std::fs::write(dir.path().join("check"), b"").is_ok();

        let result = store
            .upsert(vec![record("c.html", 0, "delta", vec![7.0, 7.0])])
            .await;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o755)).unwrap();
        if writable {
            return;
        }

        assert!(matches!(result, Err(AssistantError::StorageError(_))));
        assert_eq!(store.dump().await.unwrap(), sample());
        assert_eq!(open(dir.path()).await.dump().await.unwrap(), sample());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("docs.json"), b"{not json").unwrap();

        let err = LocalVectorStore::open(dir.path(), "docs", DistanceMetric::L2)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssistantError::StorageError(_)));
    }

    #[tokio::test]
    async fn test_invalid_collection_name() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalVectorStore::open(dir.path(), "../escape", DistanceMetric::L2)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssistantError::ConfigError(_)));
    }
}
