pub mod runner;
pub mod types;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use cnidarium::{Snapshot, StateDelta, StateRead, StateWrite, Storage};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::agents::Agent;
use crate::llm::Message;
use crate::paper::PaperSource;

pub use runner::SessionRunner;
pub use types::{ChatMessage, SessionId, SessionRecord, SessionStatus};

// Key prefixes (no trailing slashes, cnidarium convention)
const META_PREFIX: &str = "session/meta";
const OWNER_PREFIX: &str = "session/owner";
const MSG_PREFIX: &str = "session/msg";
const THREAD_PREFIX: &str = "session/thread";

fn meta_key(id: &str) -> String {
    format!("{}/{}", META_PREFIX, id)
}
fn owner_key(owner_id: u64, id: &str) -> String {
    format!("{}/{}:{}", OWNER_PREFIX, owner_id, id)
}
fn msg_prefix(id: &str) -> String {
    format!("{}/{}/", MSG_PREFIX, id)
}
fn thread_prefix(id: &str, field: &str) -> String {
    format!("{}/{}/{}/", THREAD_PREFIX, id, field)
}

pub struct SessionStore {
    storage: Storage,
    /// A delta must fork from the latest snapshot, so commits are serialized.
    write_lock: Mutex<()>,
    seq: AtomicU64,
}

impl SessionStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("create data dir {}", data_dir.display()))?;
        let prefixes = vec![
            META_PREFIX.to_string(),
            OWNER_PREFIX.to_string(),
            MSG_PREFIX.to_string(),
            THREAD_PREFIX.to_string(),
        ];
        let storage = Storage::load(data_dir.to_path_buf(), prefixes)
            .await
            .context("Failed to init cnidarium storage")?;
        Ok(Self {
            storage,
            write_lock: Mutex::new(()),
            seq: AtomicU64::new(0),
        })
    }

    /// Ordered, collision-free suffix for log keys.
    fn next_entry_key(&self, prefix: &str) -> String {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let micros = chrono::Utc::now().timestamp_micros().max(0);
        format!("{}{:020}-{:08}", prefix, micros, seq)
    }

    async fn commit_with(&self, write: impl FnOnce(&mut StateDelta<Snapshot>)) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.commit_locked(write).await
    }

    /// Caller must hold `write_lock`.
    async fn commit_locked(&self, write: impl FnOnce(&mut StateDelta<Snapshot>)) -> Result<()> {
        let snapshot = self.storage.latest_snapshot();
        let mut delta = StateDelta::new(snapshot);
        write(&mut delta);
        self.storage.commit(delta).await?;
        Ok(())
    }

    /// Create a session owned by `owner_id`.
    pub async fn create(&self, owner_id: u64, source: Option<PaperSource>) -> Result<SessionRecord> {
        let now = chrono::Utc::now();
        let mut hasher = blake3::Hasher::new();
        hasher.update(&owner_id.to_le_bytes());
        hasher.update(source.as_ref().map(|s| s.to_string()).unwrap_or_default().as_bytes());
        hasher.update(&now.timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
        hasher.update(&self.seq.fetch_add(1, Ordering::SeqCst).to_le_bytes());
        let id: SessionId = hasher.finalize().to_hex().as_str()[..16].to_string();

        let record = SessionRecord {
            id,
            owner_id,
            paper_source: source,
            status: SessionStatus::Created,
            current_agent: None,
            state: None,
            errors: Vec::new(),
            created_at: now.timestamp(),
            updated_at: now.timestamp(),
        };
        self.put(&record).await?;
        debug!(session_id = %record.id, owner_id, "session created");
        Ok(record)
    }

    async fn put(&self, record: &SessionRecord) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put_locked(record).await
    }

    async fn put_locked(&self, record: &SessionRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record).context("serialize SessionRecord")?;
        let meta = meta_key(&record.id);
        // Owner index entry (empty value, presence is the index)
        let owner = owner_key(record.owner_id, &record.id);
        self.commit_locked(|delta| {
            delta.put_raw(meta, bytes);
            delta.put_raw(owner, vec![]);
        })
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<SessionRecord>> {
        let snapshot = self.storage.latest_snapshot();
        let Some(bytes) = snapshot.get_raw(&meta_key(id)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&bytes)
            .with_context(|| format!("decode session {}", id))?;
        Ok(Some(record))
    }

    /// Upsert by id, stamping `updated_at`.
    pub async fn update(&self, record: &mut SessionRecord) -> Result<()> {
        record.updated_at = chrono::Utc::now().timestamp();
        self.put(record).await
    }

    /// Read, modify and write back one session. `None` if it does not exist.
    pub async fn modify(
        &self,
        id: &str,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<Option<SessionRecord>> {
        let _guard = self.write_lock.lock().await;
        let Some(mut record) = self.get(id).await? else {
            return Ok(None);
        };
        f(&mut record);
        record.updated_at = chrono::Utc::now().timestamp();
        self.put_locked(&record).await?;
        Ok(Some(record))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = snapshot.prefix_raw(prefix);
        let mut keys = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, _)) => keys.push(key),
                Err(e) => warn!("Error reading {} stream: {}", prefix, e),
            }
        }
        keys
    }

    /// Delete a session with its owner index, log and threads. Returns false if absent.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let Some(record) = self.get(id).await? else {
            return Ok(false);
        };
        let mut keys = self.keys_with_prefix(&msg_prefix(id)).await;
        keys.extend(self.keys_with_prefix(&format!("{}/{}/", THREAD_PREFIX, id)).await);
        let removed = keys.len();
        self.commit_locked(|delta| {
            delta.delete(meta_key(id));
            delta.delete(owner_key(record.owner_id, id));
            for key in keys {
                delta.delete(key);
            }
        })
        .await?;
        debug!(session_id = id, entries = removed, "session deleted");
        Ok(true)
    }

    /// Sessions owned by a user, newest first.
    pub async fn list_by_owner(&self, owner_id: u64) -> Result<Vec<SessionRecord>> {
        let prefix = format!("{}/{}:", OWNER_PREFIX, owner_id);
        let mut results = Vec::new();
        for key in self.keys_with_prefix(&prefix).await {
            // Key format: "session/owner/{owner}:{session_id}"
            let Some(id) = key.strip_prefix(&prefix) else {
                continue;
            };
            match self.get(id).await {
                Ok(Some(record)) => results.push(record),
                Ok(None) => warn!(session_id = id, "owner index points at missing session"),
                Err(e) => warn!("Failed to get session {}: {}", id, e),
            }
        }
        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(results)
    }

    async fn append(&self, prefix: &str, message: &ChatMessage) -> Result<()> {
        let key = self.next_entry_key(prefix);
        let bytes = serde_json::to_vec(message).context("serialize ChatMessage")?;
        self.commit_with(|delta| delta.put_raw(key, bytes)).await
    }

    async fn read_log(&self, prefix: &str) -> Result<Vec<ChatMessage>> {
        let snapshot = self.storage.latest_snapshot();
        let mut stream = snapshot.prefix_raw(prefix);
        let mut entries = Vec::new();
        while let Some(entry) = stream.next().await {
            match entry {
                Ok((key, value)) => match serde_json::from_slice::<ChatMessage>(&value) {
                    Ok(message) => entries.push((key, message)),
                    Err(e) => warn!(key = %key, "skipping undecodable message: {}", e),
                },
                Err(e) => warn!("Error reading message stream: {}", e),
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries.into_iter().map(|(_, m)| m).collect())
    }

    pub async fn add_message(&self, id: &str, message: &ChatMessage) -> Result<()> {
        self.append(&msg_prefix(id), message).await
    }

    /// Progress log, oldest first.
    pub async fn messages(&self, id: &str) -> Result<Vec<ChatMessage>> {
        self.read_log(&msg_prefix(id)).await
    }

    /// Append one turn to the deep-dive thread of a report field.
    pub async fn add_thread_message(&self, id: &str, field: &str, message: &Message) -> Result<()> {
        let entry = ChatMessage::new(&message.role, message.content.clone(), Some(Agent::DeepDive));
        self.append(&thread_prefix(id, field), &entry).await
    }

    pub async fn thread_history(&self, id: &str, field: &str) -> Result<Vec<Message>> {
        let log = self.read_log(&thread_prefix(id, field)).await?;
        Ok(log.iter().map(ChatMessage::as_message).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    fn source() -> Option<PaperSource> {
        Some(PaperSource::Url("https://arxiv.org/abs/1706.03762".into()))
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let (_dir, store) = store().await;
        let mut record = store.create(42, source()).await.unwrap();
        assert_eq!(record.id.len(), 16);
        assert!(record.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(record.status, SessionStatus::Created);

        record.status = SessionStatus::Processing;
        record.current_agent = Some(Agent::WebResearch);
        store.update(&mut record).await.unwrap();

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Processing);
        assert_eq!(loaded.current_agent, Some(Agent::WebResearch));
        assert_eq!(loaded.paper_source, source());
        assert!(store.get("0000000000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_by_owner_is_scoped() {
        let (_dir, store) = store().await;
        let a = store.create(1, source()).await.unwrap();
        let b = store.create(1, source()).await.unwrap();
        store.create(2, source()).await.unwrap();
        assert_ne!(a.id, b.id);

        let mine = store.list_by_owner(1).await.unwrap();
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.owner_id == 1));
        // owner 10 must not match owner 1's index prefix
        assert!(store.list_by_owner(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_messages_keep_insertion_order() {
        let (_dir, store) = store().await;
        let record = store.create(7, source()).await.unwrap();
        for i in 0..5 {
            let line = ChatMessage::new("assistant", format!("line {}", i), Some(Agent::SotaTracker));
            store.add_message(&record.id, &line).await.unwrap();
        }
        let log = store.messages(&record.id).await.unwrap();
        let lines: Vec<&str> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(lines, vec!["line 0", "line 1", "line 2", "line 3", "line 4"]);
        assert_eq!(log[0].agent, Some(Agent::SotaTracker));
    }

    #[tokio::test]
    async fn test_threads_are_per_field() {
        let (_dir, store) = store().await;
        let record = store.create(7, source()).await.unwrap();
        store
            .add_thread_message(&record.id, "research_findings", &Message::user("why?"))
            .await
            .unwrap();
        store
            .add_thread_message(&record.id, "research_findings", &Message::assistant("because"))
            .await
            .unwrap();
        store
            .add_thread_message(&record.id, "executive_summary", &Message::user("tl;dr?"))
            .await
            .unwrap();

        let thread = store.thread_history(&record.id, "research_findings").await.unwrap();
        assert_eq!(thread.len(), 2);
        assert_eq!(thread[0].role, "user");
        assert_eq!(thread[1].content, "because");
        assert_eq!(store.thread_history(&record.id, "executive_summary").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_modify_keeps_every_write() {
        let (_dir, store) = store().await;
        let record = store.create(3, source()).await.unwrap();
        let writes = (0..8).map(|i| {
            let store = &store;
            let id = record.id.clone();
            async move {
                store
                    .modify(&id, |r| r.errors.push(format!("stage {}", i)))
                    .await
                    .unwrap()
            }
        });
        futures::future::join_all(writes).await;

        let loaded = store.get(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.errors.len(), 8);
    }

    #[tokio::test]
    async fn test_modify_racing_delete_does_not_resurrect() {
        let (_dir, store) = store().await;
        let record = store.create(3, source()).await.unwrap();
        let (_, deleted) = futures::join!(
            store.modify(&record.id, |r| r.status = SessionStatus::Processing),
            store.delete(&record.id)
        );
        assert!(deleted.unwrap());
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.list_by_owner(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_removes_everything() {
        let (_dir, store) = store().await;
        let record = store.create(9, source()).await.unwrap();
        store
            .add_message(&record.id, &ChatMessage::system("started"))
            .await
            .unwrap();
        store
            .add_thread_message(&record.id, "report", &Message::user("more"))
            .await
            .unwrap();

        assert!(store.delete(&record.id).await.unwrap());
        assert!(store.get(&record.id).await.unwrap().is_none());
        assert!(store.messages(&record.id).await.unwrap().is_empty());
        assert!(store.thread_history(&record.id, "report").await.unwrap().is_empty());
        assert!(store.list_by_owner(9).await.unwrap().is_empty());
        assert!(!store.delete(&record.id).await.unwrap());
    }
}
