//! Content-addressed cache of rendered stretch beds.

use std::collections::VecDeque;
use std::fmt;

use flurry_params::Seed;

use super::paulstretch::StretchBuffer;

/// Identifies a render: the canonical settings text, the source notes and
/// the phase seed, hashed with BLAKE3.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StretchKey {
    digest: blake3::Hash,
}

impl StretchKey {
    pub fn new(canonical_settings: &str, source_notes: &[u8], phase_seed: Seed) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(canonical_settings.as_bytes());
        hasher.update(&[0]);
        hasher.update(source_notes);
        hasher.update(&[0]);
        hasher.update(&phase_seed.to_le_bytes());
        Self {
            digest: hasher.finalize(),
        }
    }

    /// Lowercase hex digest.
    pub fn to_hex(&self) -> String {
        self.digest.to_hex().to_string()
    }
}

impl fmt::Debug for StretchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StretchKey({})", &self.to_hex()[..16])
    }
}

/// Small least-recently-inserted cache.
#[derive(Debug, Clone)]
pub struct StretchCache {
    capacity: usize,
    entries: VecDeque<(StretchKey, StretchBuffer)>,
}

impl StretchCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &StretchKey) -> Option<&StretchBuffer> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, b)| b)
    }

    /// Stores a buffer, evicting the oldest entry when full.
    pub fn insert(&mut self, key: StretchKey, buffer: StretchBuffer) {
        if self.capacity == 0 {
            return;
        }
        self.entries.retain(|(k, _)| *k != key);
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((key, buffer));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StretchCache {
    fn default() -> Self {
        Self::new(4)
    }
}
