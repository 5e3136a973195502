use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, RtspError};
use crate::media::MediaSession;

/// Registry of named media sessions, keyed by stream name.
///
/// The stream name is the URL path segment clients address in DESCRIBE and
/// SETUP requests. Registering a second session under an existing name
/// evicts the previous one, which is destroyed when its last handle drops.
#[derive(Clone)]
pub struct MediaSessionRegistry {
    sessions: Arc<RwLock<HashMap<String, Arc<dyn MediaSession>>>>,
}

impl MediaSessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a media session under its stream name.
    ///
    /// An empty stream name is a caller error: the empty key would be
    /// unaddressable except by eviction. Returns
    /// [`RtspError::EmptyStreamName`].
    pub fn add(&self, session: Arc<dyn MediaSession>) -> Result<()> {
        let name = session.stream_name().to_string();
        if name.is_empty() {
            return Err(RtspError::EmptyStreamName);
        }

        let evicted = self.sessions.write().insert(name.clone(), session);
        if evicted.is_some() {
            tracing::info!(name, "media session replaced");
        } else {
            tracing::info!(name, "media session registered");
        }
        Ok(())
    }

    /// Look up a media session by stream name.
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn MediaSession>> {
        self.sessions.read().get(name).cloned()
    }

    /// Remove and return a media session by stream name.
    pub fn remove(&self, name: &str) -> Option<Arc<dyn MediaSession>> {
        let removed = self.sessions.write().remove(name);
        if removed.is_some() {
            tracing::info!(name, "media session removed");
        }
        removed
    }

    /// Drop every registered media session (used during server shutdown).
    pub fn clear(&self) {
        let mut sessions = self.sessions.write();
        let count = sessions.len();
        sessions.clear();
        if count > 0 {
            tracing::debug!(count, "registry cleared");
        }
    }

    /// Number of registered media sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

impl Default for MediaSessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
