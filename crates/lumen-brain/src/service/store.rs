use async_trait::async_trait;
use libsql::{Builder, Connection, Database};
use lumen_core::error::{LumenError, Result};
use lumen_core::types::{new_id, now_unix, Message};

use crate::service::conversation::ConversationStore;
use crate::service::knowledge::{KnowledgeStore, ScoredChunk};

/// libsql-backed storage for embeddings and chat histories.
pub struct VectorStore {
    db: Database,
    dims: usize,
}

fn embedding_to_json(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

fn map_err(e: libsql::Error) -> LumenError {
    LumenError::Database(e.to_string())
}

const MAX_DB_RETRIES: u32 = 3;

fn is_transient_db_error(err: &LumenError) -> bool {
    match err {
        LumenError::Database(msg) => {
            msg.contains("Bad Gateway")
                || msg.contains("Service Unavailable")
                || msg.contains("Gateway Timeout")
                || msg.contains("timed out")
                || msg.contains("connection")
                || msg.contains("STREAM_EXPIRED")
        }
        _ => false,
    }
}

/// Retry an async database operation with exponential backoff on transient errors.
async fn with_retry<F, Fut, T>(f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if is_transient_db_error(&e) && attempt < MAX_DB_RETRIES => {
                attempt += 1;
                let delay = std::time::Duration::from_secs(1 << (attempt - 1));
                tracing::warn!(
                    "db transient error, retry {attempt}/{MAX_DB_RETRIES} in {}s: {e}",
                    delay.as_secs()
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

impl VectorStore {
    /// Open a local libsql database at the given file path.
    pub async fn new(path: &str, dims: usize) -> Result<Self> {
        let db = Builder::new_local(path).build().await.map_err(map_err)?;
        let store = Self { db, dims };
        store.init_tables().await?;
        Ok(store)
    }

    /// Open a remote Turso database.
    pub async fn new_remote(url: &str, token: &str, dims: usize) -> Result<Self> {
        let db = Builder::new_remote(url.to_string(), token.to_string())
            .build()
            .await
            .map_err(map_err)?;
        let store = Self { db, dims };
        store.init_tables().await?;
        Ok(store)
    }

    /// Get a fresh database connection. For remote databases this creates
    /// a new Hrana stream, avoiding STREAM_EXPIRED errors.
    fn conn(&self) -> Result<Connection> {
        self.db.connect().map_err(map_err)
    }

    async fn init_tables(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS embeddings (
                    id TEXT PRIMARY KEY,
                    content TEXT NOT NULL,
                    embedding F32_BLOB({}) NOT NULL,
                    created_at INTEGER NOT NULL
                )",
                self.dims
            ),
            (),
        )
        .await
        .map_err(map_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(map_err)?;

        Ok(())
    }
}

#[async_trait]
impl KnowledgeStore for VectorStore {
    async fn insert(&self, content: &str, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dims {
            return Err(LumenError::Database(format!(
                "embedding has {} dimensions, store expects {}",
                embedding.len(),
                self.dims
            )));
        }

        let id = new_id("emb");
        let embedding_json = embedding_to_json(embedding);
        let created_at = now_unix();
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT INTO embeddings (id, content, embedding, created_at) VALUES (?, ?, vector(?), ?)",
                    libsql::params![id.clone(), content.to_string(), embedding_json.clone(), created_at],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }

    async fn query_top_k(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Result<Vec<ScoredChunk>> {
        let query_json = embedding_to_json(query);
        with_retry(|| async {
            let mut rows = self
                .conn()?
                .query(
                    "SELECT content, similarity FROM (
                        SELECT rowid AS seq, content,
                               1 - vector_distance_cos(embedding, vector(?)) AS similarity
                        FROM embeddings
                     )
                     WHERE similarity > ?
                     ORDER BY similarity DESC, seq ASC
                     LIMIT ?",
                    libsql::params![query_json.clone(), min_similarity as f64, k as i64],
                )
                .await
                .map_err(map_err)?;

            let mut chunks = Vec::new();
            while let Some(row) = rows.next().await.map_err(map_err)? {
                chunks.push(ScoredChunk {
                    content: row.get::<String>(0).map_err(map_err)?,
                    similarity: row.get::<f64>(1).map_err(map_err)? as f32,
                });
            }
            Ok(chunks)
        })
        .await
    }
}

#[async_trait]
impl ConversationStore for VectorStore {
    async fn load(&self, id: &str) -> Result<Vec<Message>> {
        let mut rows = with_retry(|| async {
            self.conn()?
                .query("SELECT messages FROM chats WHERE id = ?", libsql::params![id.to_string()])
                .await
                .map_err(map_err)
        })
        .await?;

        let Some(row) = rows.next().await.map_err(map_err)? else {
            return Ok(Vec::new());
        };
        let raw = row.get::<String>(0).map_err(map_err)?;
        serde_json::from_str(&raw)
            .map_err(|e| LumenError::Database(format!("corrupt history for chat {id}: {e}")))
    }

    async fn save(&self, id: &str, messages: &[Message]) -> Result<()> {
        let raw = serde_json::to_string(messages)
            .map_err(|e| LumenError::Database(format!("failed to serialize history: {e}")))?;
        let updated_at = now_unix();
        with_retry(|| async {
            self.conn()?
                .execute(
                    "INSERT INTO chats (id, messages, updated_at) VALUES (?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET messages = excluded.messages, updated_at = excluded.updated_at",
                    libsql::params![id.to_string(), raw.clone(), updated_at],
                )
                .await
                .map_err(map_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_store(dims: usize) -> (VectorStore, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!("{}.db", new_id("lumen-test")));
        let store = VectorStore::new(path.to_str().unwrap(), dims).await.unwrap();
        (store, path)
    }

    #[test]
    fn test_embedding_to_json() {
        assert_eq!(embedding_to_json(&[1.0, 0.5, -2.0]), "[1,0.5,-2]");
    }

    #[test]
    fn test_transient_errors() {
        assert!(is_transient_db_error(&LumenError::Database("STREAM_EXPIRED".into())));
        assert!(!is_transient_db_error(&LumenError::Database("no such table".into())));
        assert!(!is_transient_db_error(&LumenError::Tool("timed out".into())));
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_error() {
        let attempts = &std::sync::atomic::AtomicUsize::new(0);
        let result = with_retry(move || async move {
            match attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 => Err(LumenError::Database("STREAM_EXPIRED".into())),
                n => Ok(n),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);

        let permanent = with_retry(|| async {
            Err::<(), _>(LumenError::Database("no such table: embeddings".into()))
        })
        .await;
        assert!(permanent.is_err());
    }

    #[tokio::test]
    async fn test_chat_history_round_trip() {
        let (store, path) = temp_store(2).await;

        assert!(store.load("c1").await.unwrap().is_empty());
        store
            .save("c1", &[Message::user("hi"), Message::assistant("hello")])
            .await
            .unwrap();
        store.save("c1", &[Message::user("again")]).await.unwrap();

        let history = store.load("c1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "again");

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_wrong_dimensions_rejected() {
        let (store, path) = temp_store(2).await;
        let result = store.insert("x", &[1.0, 0.0, 0.0]).await;
        assert!(matches!(result, Err(LumenError::Database(_))));
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_similarity_query() {
        let (store, path) = temp_store(2).await;
        store.insert("east", &[1.0, 0.0]).await.unwrap();
        store.insert("north", &[0.0, 1.0]).await.unwrap();
        store.insert("north-east", &[1.0, 1.0]).await.unwrap();

        let results = store.query_top_k(&[1.0, 0.0], 4, 0.5).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, vec!["east", "north-east"]);
        assert!((results[0].similarity - 1.0).abs() < 1e-4);

        let _ = std::fs::remove_file(path);
    }
}
