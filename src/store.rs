//! Pending pictures, keyed by sender.
//!
//! A sender has at most one picture waiting for a caption. Nothing here
//! survives a restart.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// A stored picture waiting for its caption.
#[derive(Clone, Debug)]
struct PendingImage {
    path: PathBuf,
    stored_at: Instant,
}

/// Cloneable handle on the sender -> pending picture map.
#[derive(Clone, Debug, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, PendingImage>>>,
    turns: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Path of the sender's pending picture, if there is one.
    pub async fn get(&self, sender: &str) -> Option<PathBuf> {
        self.inner
            .read()
            .await
            .get(sender)
            .map(|pending| pending.path.clone())
    }

    /// Records a pending picture, returning the path it replaced.
    pub async fn set(&self, sender: &str, path: PathBuf) -> Option<PathBuf> {
        self.inner
            .write()
            .await
            .insert(
                sender.to_string(),
                PendingImage {
                    path,
                    stored_at: Instant::now(),
                },
            )
            .map(|previous| previous.path)
    }

    /// Forgets the sender's pending picture.
    pub async fn clear(&self, sender: &str) -> Option<PathBuf> {
        self.inner
            .write()
            .await
            .remove(sender)
            .map(|pending| pending.path)
    }

    /// Forgets the sender's pending picture only if it is still `path`.
    ///
    /// A newer upload from the same sender is left alone.
    pub async fn clear_if(&self, sender: &str, path: &Path) -> bool {
        let mut sessions = self.inner.write().await;
        match sessions.get(sender) {
            Some(pending) if pending.path == path => {
                sessions.remove(sender);
                true
            }
            _ => false,
        }
    }

    /// Number of senders with a pending picture.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// True when nobody has a pending picture.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Serialises turns for one sender. Hold the guard for the whole turn.
    pub async fn lock_sender(&self, sender: &str) -> OwnedMutexGuard<()> {
        let turn = self
            .turns
            .lock()
            .await
            .entry(sender.to_string())
            .or_default()
            .clone();
        turn.lock_owned().await
    }

    /// Removes and returns every session older than `max_age`.
    pub async fn take_expired(&self, max_age: Duration) -> Vec<(String, PathBuf)> {
        // locks nobody holds or waits on
        self.turns
            .lock()
            .await
            .retain(|_, turn| Arc::strong_count(turn) > 1);

        let mut sessions = self.inner.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, pending)| pending.stored_at.elapsed() >= max_age)
            .map(|(sender, _)| sender.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|sender| {
                sessions
                    .remove(&sender)
                    .map(|pending| (sender, pending.path))
            })
            .collect()
    }
}
