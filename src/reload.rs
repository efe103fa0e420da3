//! Reload survival: one durable marker, one safe decision.
//!
//! When the hosting surface is torn down while a connection is open, a
//! single boolean marker is persisted. On the next load, the presence of
//! that marker means the previous session was interrupted mid-flight: the
//! guard clears it and directs the caller to start over: force-close any
//! connection, drop the lobby key, return to the entry screen. The peer has
//! no resumption token, so "start over" is the only reconnection story that
//! is always correct and never leaves a socket dangling.
//!
//! The marker is keyed by a fixed constant, not by lobby: at most one active
//! session per profile is assumed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::Result;
use crate::supervisor::ConnectionState;

/// Fixed key for the active-session marker.
pub const MARKER_KEY: &str = "word-race-active-session";

/// Durable storage for the single active-session marker.
///
/// Only presence matters; implementations store no value.
pub trait MarkerStore: Send + Sync {
    /// Persist the marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker could not be written.
    fn set(&self) -> Result<()>;

    /// Remove the marker. Removing an absent marker is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if removal failed for any other reason.
    fn clear(&self) -> Result<()>;

    /// Whether the marker is currently present.
    fn is_set(&self) -> bool;
}

/// Marker persisted as a file in a profile directory.
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    /// Store the marker under `profile_dir`, using [`MARKER_KEY`] as the
    /// file name.
    pub fn new(profile_dir: impl AsRef<Path>) -> Self {
        Self {
            path: profile_dir.as_ref().join(MARKER_KEY),
        }
    }
}

impl MarkerStore for FileMarkerStore {
    fn set(&self) -> Result<()> {
        std::fs::write(&self.path, b"1")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_set(&self) -> bool {
        self.path.exists()
    }
}

/// In-memory marker for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryMarkerStore {
    set: AtomicBool,
}

impl MarkerStore for MemoryMarkerStore {
    fn set(&self) -> Result<()> {
        self.set.store(true, Ordering::Release);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.set.store(false, Ordering::Release);
        Ok(())
    }

    fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}

/// What the caller should do on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// No interrupted session; proceed normally.
    Continue,
    /// The previous session was interrupted mid-flight: force-close any
    /// connection, clear the lobby key, and return to the entry screen.
    StartOver,
}

/// Decides between rejoining and starting over across a reload.
#[derive(Clone)]
pub struct ReloadGuard {
    store: Arc<dyn MarkerStore>,
}

impl ReloadGuard {
    pub fn new(store: Arc<dyn MarkerStore>) -> Self {
        Self { store }
    }

    /// Record an unload. Persists the marker only while a connection is
    /// open; tearing down an idle or closed session leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker could not be persisted.
    pub fn mark_unload(&self, connection: ConnectionState) -> Result<()> {
        if connection == ConnectionState::Open {
            debug!("recording active session for reload detection");
            self.store.set()?;
        }
        Ok(())
    }

    /// Check for an interrupted session on load, consuming the marker.
    pub fn check_on_load(&self) -> ReloadDecision {
        if !self.store.is_set() {
            return ReloadDecision::Continue;
        }
        debug!("previous session was interrupted, starting over");
        if let Err(e) = self.store.clear() {
            warn!("failed to clear reload marker: {e}");
        }
        ReloadDecision::StartOver
    }

    /// Remove the marker unconditionally (post-error navigation).
    ///
    /// # Errors
    ///
    /// Returns an error if removal failed.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}

impl std::fmt::Debug for ReloadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadGuard")
            .field("marker_set", &self.store.is_set())
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryMarkerStore::default();
        assert!(!store.is_set());
        store.set().unwrap();
        assert!(store.is_set());
        store.clear().unwrap();
        assert!(!store.is_set());
    }

    #[test]
    fn guard_marks_only_open_connections() {
        let store = Arc::new(MemoryMarkerStore::default());
        let guard = ReloadGuard::new(Arc::clone(&store) as Arc<dyn MarkerStore>);

        guard.mark_unload(ConnectionState::Idle).unwrap();
        guard.mark_unload(ConnectionState::Closed).unwrap();
        assert!(!store.is_set());

        guard.mark_unload(ConnectionState::Open).unwrap();
        assert!(store.is_set());
    }

    #[test]
    fn check_on_load_consumes_the_marker() {
        let store = Arc::new(MemoryMarkerStore::default());
        let guard = ReloadGuard::new(Arc::clone(&store) as Arc<dyn MarkerStore>);

        assert_eq!(guard.check_on_load(), ReloadDecision::Continue);

        store.set().unwrap();
        assert_eq!(guard.check_on_load(), ReloadDecision::StartOver);
        // The marker is one-shot.
        assert_eq!(guard.check_on_load(), ReloadDecision::Continue);
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "word-race-reload-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let store = FileMarkerStore::new(&dir);
        // Clearing an absent marker is fine.
        store.clear().unwrap();
        assert!(!store.is_set());

        store.set().unwrap();
        assert!(store.is_set());
        store.clear().unwrap();
        assert!(!store.is_set());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
