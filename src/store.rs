//! In-memory registry of playable WAV clips.
//!
//! Each clip gets an addressable handle (`/audio/{id}`) that the HTTP
//! surface serves until the owner releases it. Only the orchestrator
//! creates and releases handles; everyone else reads.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::debug;

/// Handle to a live clip in an [`AudioStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioHandle {
    pub id: u64,
    pub url: String,
}

#[derive(Clone, Default)]
pub struct AudioStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Default)]
struct StoreInner {
    next_id: u64,
    clips: HashMap<u64, Arc<Vec<u8>>>,
    created: u64,
    released: u64,
}

impl AudioStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn create(&self, wav: Vec<u8>) -> AudioHandle {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        let len = wav.len();
        inner.clips.insert(id, Arc::new(wav));
        inner.created += 1;
        debug!("Audio clip {id} created ({len} bytes)");
        AudioHandle {
            id,
            url: format!("/audio/{id}"),
        }
    }

    /// Release a clip. Returns false if it was already gone.
    pub(crate) fn release(&self, handle: &AudioHandle) -> bool {
        let mut inner = self.lock();
        if inner.clips.remove(&handle.id).is_some() {
            inner.released += 1;
            debug!("Audio clip {} released", handle.id);
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: u64) -> Option<Arc<Vec<u8>>> {
        self.lock().clips.get(&id).cloned()
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.lock().clips.len()
    }

    /// Total clips ever created and released, in that order.
    pub fn totals(&self) -> (u64, u64) {
        let inner = self.lock();
        (inner.created, inner.released)
    }
}
