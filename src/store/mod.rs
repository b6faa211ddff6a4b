//! Persistent, confidence-monotonic mapping from shape keys to characters.
//!
//! The store is the pipeline's only mutable shared state. Reads are
//! concurrent; writes are serialized per shard so writes to different shape
//! keys proceed independently. Every write goes through the monotonicity
//! check: a write that would worsen an entry's confidence is rejected as a
//! caller-visible no-op and never corrupts existing state.
//!
//! The JSON snapshot is addressed purely by shape key, so a store built
//! from one document seeds any later document that shares glyph shapes.

use crate::canonical::ShapeKey;
use crate::error::{Error, Result};
use crate::reference::FontStyle;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::RwLock;

const SHARDS: usize = 16;

/// JSON has no representation for infinity; non-finite confidences map to
/// null and back.
mod confidence_serde {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f32, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f32, D::Error> {
        Ok(Option::<f32>::deserialize(deserializer)?.unwrap_or(f32::INFINITY))
    }
}

/// Resolution result for one canonical shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Canonical shape key this entry resolves
    pub key: ShapeKey,
    /// Decoded text; `None` means unresolved. Usually a single character,
    /// several for ligature glyphs.
    pub text: Option<String>,
    /// Style of the winning reference render (or the hint, if unresolved)
    pub style: FontStyle,
    /// Structural-similarity distance of the winning candidate; lower is
    /// better, 0 is a pixel-perfect match. Unresolved entries carry the
    /// best distance seen so far (infinity when nothing compared; stored
    /// as null in snapshots since JSON has no infinity).
    #[serde(with = "confidence_serde")]
    pub confidence: f32,
    /// Tier index of the ladder the result was accepted at
    pub tier: usize,
    /// True when the winning render came from a synthesized style
    pub synthetic_style: bool,
}

impl MappingEntry {
    /// An unresolved entry with no comparison recorded yet.
    pub fn unresolved(key: ShapeKey) -> Self {
        Self {
            key,
            text: None,
            style: FontStyle::Regular,
            confidence: f32::INFINITY,
            tier: 0,
            synthetic_style: false,
        }
    }

    /// True when this entry decoded to text.
    pub fn is_resolved(&self) -> bool {
        self.text.is_some()
    }
}

/// Outcome of a [`MappingStore::put`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// No entry existed for the key; the write was stored
    Inserted,
    /// An entry existed and the write improved it
    Improved,
    /// The write would have worsened the entry and was ignored
    Rejected,
}

/// Sharded, persistent mapping store.
#[derive(Debug)]
pub struct MappingStore {
    shards: Vec<RwLock<HashMap<ShapeKey, MappingEntry>>>,
}

impl Default for MappingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    /// Load a store from a JSON snapshot. A missing file yields an empty
    /// store; a present but unparseable file is a fatal startup error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = std::fs::read_to_string(path)?;
        let entries: Vec<MappingEntry> =
            serde_json::from_str(&data).map_err(|e| Error::StoreCorrupt(e.to_string()))?;
        let store = Self::new();
        for entry in entries {
            store.put(entry);
        }
        Ok(store)
    }

    /// Write a JSON snapshot atomically (temp file + rename), sorted by
    /// shape key so snapshots diff cleanly across runs.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut entries = self.snapshot();
        entries.sort_by_key(|e| e.key);
        let json = serde_json::to_string_pretty(&entries)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn shard(&self, key: &ShapeKey) -> &RwLock<HashMap<ShapeKey, MappingEntry>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// Look up the entry for a shape key.
    pub fn get(&self, key: &ShapeKey) -> Option<MappingEntry> {
        self.shard(key).read().expect("store lock").get(key).cloned()
    }

    /// Store an entry, enforcing confidence monotonicity.
    ///
    /// The write is accepted when no entry exists, when the new confidence
    /// is strictly better, or when it upgrades an unresolved entry to
    /// resolved at equal confidence. Anything else is rejected and logged
    /// as a no-op.
    pub fn put(&self, entry: MappingEntry) -> PutOutcome {
        let mut shard = self.shard(&entry.key).write().expect("store lock");
        match shard.get(&entry.key) {
            None => {
                shard.insert(entry.key, entry);
                PutOutcome::Inserted
            },
            Some(existing) => {
                let improves = entry.confidence < existing.confidence
                    || (entry.confidence == existing.confidence
                        && !existing.is_resolved()
                        && entry.is_resolved());
                if improves {
                    shard.insert(entry.key, entry);
                    PutOutcome::Improved
                } else {
                    log::debug!(
                        "rejected non-improving write for {} ({} >= {})",
                        entry.key.short(),
                        entry.confidence,
                        existing.confidence
                    );
                    PutOutcome::Rejected
                }
            },
        }
    }

    /// Shape keys of every unresolved entry, sorted for deterministic
    /// re-match scheduling.
    pub fn all_unresolved(&self) -> Vec<ShapeKey> {
        let mut keys: Vec<ShapeKey> = self
            .shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .expect("store lock")
                    .values()
                    .filter(|e| !e.is_resolved())
                    .map(|e| e.key)
                    .collect::<Vec<_>>()
            })
            .collect();
        keys.sort();
        keys
    }

    /// Copy of every entry, unordered.
    pub fn snapshot(&self) -> Vec<MappingEntry> {
        self.shards
            .iter()
            .flat_map(|s| {
                s.read()
                    .expect("store lock")
                    .values()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().expect("store lock").len())
            .sum()
    }

    /// True when the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of resolved entries.
    pub fn resolved_count(&self) -> usize {
        self.shards
            .iter()
            .map(|s| {
                s.read()
                    .expect("store lock")
                    .values()
                    .filter(|e| e.is_resolved())
                    .count()
            })
            .sum()
    }
}
