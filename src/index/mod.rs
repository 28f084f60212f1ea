//! sqlite-vec backed vector index for chunk embeddings.
//!
//! rig-sqlite owns the table schema and the embedding side-table; inserts go
//! through [`rig_sqlite::SqliteVectorStore::add_rows`] with precomputed
//! vectors, and nearest-neighbour search runs raw `vec_distance_cosine` SQL
//! against a query embedding. The index only ever grows during ingestion
//! and is read-only to retrieval.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::{Path, PathBuf};
use std::sync::Once;

use rig::OneOrMany;
use rig::embeddings::embedding::{Embedding, EmbeddingError, EmbeddingModel};
use rig_sqlite::{Column, ColumnValue, SqliteVectorStore, SqliteVectorStoreTable};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::{Connection, ffi};
use uuid::Uuid;

use crate::types::RagError;

/// One indexed chunk: a window of page text plus enough provenance to cite
/// it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkDocument {
    pub id: String,
    pub url: String,
    pub title: String,
    pub chunk_index: usize,
    pub content: String,
}

impl ChunkDocument {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            url: url.into(),
            title: title.into(),
            chunk_index,
            content: content.into(),
        }
    }
}

impl SqliteVectorStoreTable for ChunkDocument {
    fn name() -> &'static str {
        "chunks"
    }

    fn schema() -> Vec<Column> {
        vec![
            Column::new("id", "TEXT PRIMARY KEY"),
            Column::new("url", "TEXT").indexed(),
            Column::new("title", "TEXT"),
            Column::new("chunk_index", "TEXT"),
            Column::new("content", "TEXT"),
        ]
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn column_values(&self) -> Vec<(&'static str, Box<dyn ColumnValue>)> {
        vec![
            ("id", Box::new(self.id.clone())),
            ("url", Box::new(self.url.clone())),
            ("title", Box::new(self.title.clone())),
            ("chunk_index", Box::new(self.chunk_index.to_string())),
            ("content", Box::new(self.content.clone())),
        ]
    }
}

/// A search hit: the chunk plus its cosine similarity to the query vector.
#[derive(Clone, Debug)]
pub struct ChunkHit {
    pub chunk: ChunkDocument,
    pub score: f32,
}

/// rig-sqlite wants an [`EmbeddingModel`] to size the vector table. All
/// vectors in this crate are computed by the configured embedding provider
/// before they reach the index, so only the dimensionality of this model is
/// ever consulted; its hash-derived vectors exist to satisfy the trait.
#[derive(Clone, Debug)]
struct DimensionModel {
    dims: usize,
}

impl EmbeddingModel for DimensionModel {
    const MAX_DOCUMENTS: usize = 64;

    type Client = ();

    fn make(_client: &Self::Client, _model: impl Into<String>, dims: Option<usize>) -> Self {
        Self {
            dims: dims.unwrap_or(0),
        }
    }

    fn ndims(&self) -> usize {
        self.dims
    }

    fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> impl std::future::Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send {
        let dims = self.dims;
        let documents: Vec<String> = texts.into_iter().collect();
        async move {
            Ok(documents
                .into_iter()
                .map(|document| Embedding {
                    vec: hash_projection(&document, dims),
                    document,
                })
                .collect())
        }
    }
}

fn hash_projection(text: &str, dims: usize) -> Vec<f64> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let seed = hasher.finish();
    (0..dims)
        .map(|i| {
            let bits = seed.rotate_left((i % 8 * 8) as u32) ^ ((i as u64) << 24);
            (bits as f64) / u32::MAX as f64
        })
        .collect()
}

/// The persisted vector index.
#[derive(Clone)]
pub struct ChunkIndex {
    inner: SqliteVectorStore<DimensionModel, ChunkDocument>,
    /// Direct connection for the raw-SQL search path; a clone of the
    /// connection owned by the inner store.
    conn: Connection,
    path: PathBuf,
}

impl std::fmt::Debug for ChunkIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkIndex")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl ChunkIndex {
    /// Opens the index at `path`, creating it when absent. Reopening an
    /// existing index appends to it — merge semantics.
    pub async fn open_or_create(path: impl AsRef<Path>, dims: usize) -> Result<Self, RagError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        Self::open_impl(path.as_ref(), dims).await
    }

    /// Opens an index that must already exist. Fails with
    /// [`RagError::IndexNotFound`] otherwise — retrieval calls this before
    /// touching any model service.
    pub async fn open_existing(path: impl AsRef<Path>, dims: usize) -> Result<Self, RagError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RagError::IndexNotFound(path.to_path_buf()));
        }
        Self::open_impl(path, dims).await
    }

    async fn open_impl(path: &Path, dims: usize) -> Result<Self, RagError> {
        register_sqlite_vec()?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        conn.call(|conn| {
            let result = conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0));
            match result {
                Ok(_) => Ok(()),
                Err(err) => Err(tokio_rusqlite::Error::Rusqlite(err)),
            }
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        let conn_for_queries = conn.clone();
        let store = SqliteVectorStore::new(conn, &DimensionModel { dims })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(Self {
            inner: store,
            conn: conn_for_queries,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends chunk documents with their embeddings.
    pub async fn add_chunks(
        &self,
        documents: Vec<(ChunkDocument, Vec<f32>)>,
    ) -> Result<(), RagError> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut rows = Vec::with_capacity(documents.len());
        for (document, embedding) in documents {
            let vec: Vec<f64> = embedding.into_iter().map(f64::from).collect();
            let embed = Embedding {
                document: document.content.clone(),
                vec,
            };
            rows.push((document, OneOrMany::one(embed)));
        }
        self.inner
            .add_rows(rows)
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;
        Ok(())
    }

    /// Top-K nearest chunks to `query_embedding` by cosine distance.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ChunkHit>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::Storage(err.to_string()))?;
        let limit = top_k as i64;
        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT c.id, c.url, c.title, c.chunk_index, c.content, \
                         vec_distance_cosine(e.embedding, vec_f32(?1)) AS distance \
                         FROM chunks c \
                         JOIN chunks_embeddings e ON c.id = e.id \
                         ORDER BY distance ASC \
                         LIMIT ?2",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((&embedding_json, limit), |row| {
                        let chunk = ChunkDocument {
                            id: row.get(0)?,
                            url: row.get(1)?,
                            title: row.get(2)?,
                            chunk_index: row.get::<_, String>(3)?.parse().unwrap_or(0),
                            content: row.get(4)?,
                        };
                        let distance: f32 = row.get(5)?;
                        Ok(ChunkHit {
                            chunk,
                            score: 1.0 - distance,
                        })
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    /// Total number of indexed chunks.
    pub async fn count(&self) -> Result<usize, RagError> {
        self.conn
            .call(|conn| {
                let count: i64 = conn
                    .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}

/// Registers the sqlite-vec extension for every connection opened by this
/// process. Safe to call repeatedly; registration happens once.
fn register_sqlite_vec() -> Result<(), RagError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(RagError::Storage)
}
