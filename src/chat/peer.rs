use crate::chat::PeerMessage;
use crate::places::store::write_atomically;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("failed to read mailbox {path}: {reason}")]
    Read { path: PathBuf, reason: String },
    #[error("failed to write mailbox {path}: {reason}")]
    Write { path: PathBuf, reason: String },
}

/// Durable store for person-to-person messages.
#[async_trait]
pub trait PeerMailbox: Send + Sync {
    async fn send(&self, message: PeerMessage) -> Result<(), PeerError>;
    /// Every stored message, oldest first.
    async fn snapshot(&self) -> Result<Vec<PeerMessage>, PeerError>;
}

/// Mailbox backed by a JSON file that every local client shares.
#[derive(Debug, Clone)]
pub struct FileMailbox {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileMailbox {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn read_all(&self) -> Result<Vec<PeerMessage>, PeerError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(PeerError::Read {
                    path: self.path.clone(),
                    reason: err.to_string(),
                })
            }
        };
        serde_json::from_slice(&data).map_err(|err| PeerError::Read {
            path: self.path.clone(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl PeerMailbox for FileMailbox {
    async fn send(&self, message: PeerMessage) -> Result<(), PeerError> {
        let _guard = self.write_lock.lock().await;
        let mut messages = self.read_all().await?;
        messages.push(message);
        let bytes = serde_json::to_vec_pretty(&messages).map_err(|err| PeerError::Write {
            path: self.path.clone(),
            reason: err.to_string(),
        })?;

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|err| PeerError::Write {
                path: self.path.clone(),
                reason: err.to_string(),
            })?
            .map_err(|err| PeerError::Write {
                path: self.path.clone(),
                reason: err.to_string(),
            })
    }

    async fn snapshot(&self) -> Result<Vec<PeerMessage>, PeerError> {
        let mut messages = self.read_all().await?;
        messages.sort_by_key(|message| message.timestamp_ms);
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileMailbox, PeerMailbox};
    use crate::chat::PeerMessage;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "daka_mailbox_{prefix}_{}_{}.json",
            std::process::id(),
            nanos
        ))
    }

    fn message(from: &str, to: &str, timestamp_ms: u64) -> PeerMessage {
        PeerMessage {
            from: from.to_string(),
            to: to.to_string(),
            text: format!("{from} -> {to}"),
            timestamp_ms,
        }
    }

    #[tokio::test]
    async fn empty_mailbox_has_no_messages() {
        let mailbox = FileMailbox::new(temp_file("empty"));
        let messages = mailbox.snapshot().await.expect("missing file should read as empty");
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn sent_messages_come_back_in_timestamp_order() {
        let path = temp_file("order");
        let mailbox = FileMailbox::new(path.clone());

        mailbox.send(message("bob", "alice", 20)).await.expect("send should succeed");
        mailbox.send(message("alice", "bob", 10)).await.expect("send should succeed");

        let reopened = FileMailbox::new(path.clone());
        let messages = reopened.snapshot().await.expect("snapshot should succeed");
        let stamps: Vec<_> = messages.iter().map(|m| m.timestamp_ms).collect();
        assert_eq!(stamps, vec![10, 20]);
        let _ = tokio::fs::remove_file(path).await;
    }
}
