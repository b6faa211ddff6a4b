//! Shape canonicalization: perceptual hashing and cross-batch deduplication.
//!
//! Every glyph occurrence is rendered once at a fixed base resolution and
//! reduced to a [`ShapeKey`]: a 512-bit perceptual hash combining a 16×16
//! average hash with a 16×16 difference hash. Two outlines whose keys fall
//! within a small Hamming distance are folded into one [`CanonicalShape`]:
//! re-renders of the same underlying outline differ by anti-aliasing noise
//! and sub-pixel offsets, so exact hash equality under-merges.
//!
//! Hashing is pure and runs on the worker pool; folding and registration
//! are sequential in [`ShapeRegistry`], which is the only place the set of
//! seen keys is consulted.

use crate::raster::{FontMetrics, GlyphRasterizer, Raster};
use image::imageops::FilterType;
use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Words in a shape key: 4 × u64 average hash + 4 × u64 difference hash.
const KEY_WORDS: usize = 8;

/// Content-addressed identity of a canonical glyph shape.
///
/// The all-zero key is the sentinel for degenerate ("empty") shapes; a real
/// render always produces at least one set bit in the difference half or a
/// nonzero average half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShapeKey([u64; KEY_WORDS]);

impl ShapeKey {
    /// Sentinel key for degenerate/empty outlines.
    pub const EMPTY: ShapeKey = ShapeKey([0; KEY_WORDS]);

    /// True for the empty-shape sentinel.
    pub fn is_empty(&self) -> bool {
        *self == Self::EMPTY
    }

    /// Number of differing bits between two keys (0..=512).
    pub fn hamming_distance(&self, other: &ShapeKey) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// First 8 hex digits, used in placeholders and log lines.
    pub fn short(&self) -> String {
        format!("{:08x}", (self.0[0] >> 32) as u32)
    }
}

impl fmt::Display for ShapeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.0 {
            write!(f, "{:016x}", word)?;
        }
        Ok(())
    }
}

impl FromStr for ShapeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != KEY_WORDS * 16 {
            return Err(format!("shape key must be {} hex digits", KEY_WORDS * 16));
        }
        let mut words = [0u64; KEY_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let chunk = &s[i * 16..(i + 1) * 16];
            *word = u64::from_str_radix(chunk, 16).map_err(|e| e.to_string())?;
        }
        Ok(ShapeKey(words))
    }
}

impl Serialize for ShapeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ShapeKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ShapeKey::from_str(&s).map_err(D::Error::custom)
    }
}

/// Reference to one glyph occurrence: which batch, which local glyph id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GlyphRef {
    /// Batch the occurrence came from
    pub batch: u32,
    /// Local glyph id within that batch
    pub glyph: u32,
}

/// Representative outline of a canonical shape, kept so the matcher can
/// re-render the shape at finer resolution tiers than the base raster.
#[derive(Debug, Clone)]
pub struct Outline {
    /// SVG-style path data
    pub path_data: String,
    /// Metrics of the face the outline was expressed in
    pub metrics: FontMetrics,
}

/// A deduplicated glyph shape with its occurrences.
#[derive(Debug, Clone)]
pub struct CanonicalShape {
    /// Dense id in first-seen order (stable for the run)
    pub id: u32,
    /// Canonical shape key (the first key seen in the fold group)
    pub key: ShapeKey,
    /// Representative raster at the base resolution; `None` for the
    /// empty-shape sentinel
    pub raster: Option<Raster>,
    /// Representative outline (the first occurrence's), for re-rendering
    /// at finer tiers; `None` for the empty-shape sentinel
    pub outline: Option<Outline>,
    /// Every occurrence folded into this shape
    pub occurrences: Vec<GlyphRef>,
}

/// Output of the parallel hashing stage for one glyph definition.
#[derive(Debug, Clone)]
pub struct HashedGlyph {
    /// Occurrence reference
    pub glyph_ref: GlyphRef,
    /// Raw (unfolded) shape key
    pub key: ShapeKey,
    /// Raster the key was computed from; `None` when the outline was
    /// degenerate
    pub raster: Option<Raster>,
    /// The source outline; `None` when degenerate
    pub outline: Option<Outline>,
}

/// Compute the perceptual hash of a rendered raster.
///
/// Average hash: 16×16 downsample, bit set where the pixel is brighter
/// than the mean. Difference hash: 17×16 downsample, bit set where each
/// pixel is brighter than its left neighbor. Combining both keeps overall
/// ink distribution and stroke-edge direction in the key.
pub fn perceptual_hash(raster: &Raster) -> ShapeKey {
    let mut words = [0u64; KEY_WORDS];

    // Average hash over a 16x16 reduction.
    let small = image::imageops::resize(raster.as_image(), 16, 16, FilterType::Lanczos3);
    let mean: u32 = small.pixels().map(|p| p.0[0] as u32).sum::<u32>() / 256;
    for (i, p) in small.pixels().enumerate() {
        if (p.0[0] as u32) > mean {
            words[i / 64] |= 1 << (i % 64);
        }
    }

    // Difference hash over a 17x16 reduction (row-wise gradient).
    let wide = image::imageops::resize(raster.as_image(), 17, 16, FilterType::Lanczos3);
    let mut bit = 0usize;
    for y in 0..16 {
        for x in 0..16 {
            if wide.get_pixel(x + 1, y).0[0] > wide.get_pixel(x, y).0[0] {
                words[4 + bit / 64] |= 1 << (bit % 64);
            }
            bit += 1;
        }
    }

    ShapeKey(words)
}

/// Render and hash one glyph outline. Pure; safe to run on the worker pool.
pub fn hash_glyph(
    rasterizer: &GlyphRasterizer,
    glyph_ref: GlyphRef,
    path_data: &str,
    metrics: &FontMetrics,
) -> HashedGlyph {
    match rasterizer.render_path_data(path_data, metrics) {
        Some(raster) => {
            let key = perceptual_hash(&raster);
            HashedGlyph {
                glyph_ref,
                key,
                raster: Some(raster),
                outline: Some(Outline {
                    path_data: path_data.to_string(),
                    metrics: *metrics,
                }),
            }
        },
        None => HashedGlyph {
            glyph_ref,
            key: ShapeKey::EMPTY,
            raster: None,
            outline: None,
        },
    }
}

/// Append-only registry of canonical shapes for one extraction run.
#[derive(Debug, Default)]
pub struct ShapeRegistry {
    fold_distance: u32,
    shapes: IndexMap<ShapeKey, CanonicalShape>,
}

impl ShapeRegistry {
    /// Create a registry folding keys within `fold_distance` bits.
    pub fn new(fold_distance: u32) -> Self {
        Self {
            fold_distance,
            shapes: IndexMap::new(),
        }
    }

    /// Register a hashed glyph, folding near-duplicates, and return the
    /// canonical key the occurrence now belongs to.
    ///
    /// The empty sentinel never folds with real shapes. Among multiple
    /// candidates within the fold distance the closest wins; ties go to
    /// the earlier-registered shape so re-runs fold identically.
    pub fn register(&mut self, hashed: HashedGlyph) -> ShapeKey {
        let canonical = self.fold_target(&hashed.key);

        match self.shapes.get_mut(&canonical) {
            Some(shape) => {
                shape.occurrences.push(hashed.glyph_ref);
                canonical
            },
            None => {
                let id = self.shapes.len() as u32;
                self.shapes.insert(
                    canonical,
                    CanonicalShape {
                        id,
                        key: canonical,
                        raster: hashed.raster,
                        outline: hashed.outline,
                        occurrences: vec![hashed.glyph_ref],
                    },
                );
                canonical
            },
        }
    }

    /// Find the canonical key an incoming key folds into.
    fn fold_target(&self, key: &ShapeKey) -> ShapeKey {
        if key.is_empty() || self.shapes.contains_key(key) {
            return *key;
        }
        let mut best: Option<(u32, ShapeKey)> = None;
        for existing in self.shapes.keys() {
            if existing.is_empty() {
                continue;
            }
            let d = key.hamming_distance(existing);
            if d <= self.fold_distance {
                match best {
                    Some((bd, _)) if bd <= d => {},
                    _ => best = Some((d, *existing)),
                }
            }
        }
        best.map(|(_, k)| k).unwrap_or(*key)
    }

    /// Look up a canonical shape by key.
    pub fn get(&self, key: &ShapeKey) -> Option<&CanonicalShape> {
        self.shapes.get(key)
    }

    /// Number of canonical shapes seen so far.
    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    /// True when no shape has been registered.
    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Iterate shapes in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &CanonicalShape> {
        self.shapes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::GlyphRasterizer;

    fn rasterizer() -> GlyphRasterizer {
        GlyphRasterizer::new(128)
    }

    fn gref(batch: u32, glyph: u32) -> GlyphRef {
        GlyphRef { batch, glyph }
    }

    const SQUARE: &str = "M 300 300 L 700 300 L 700 700 L 300 700 Z";
    const TRIANGLE: &str = "M 300 700 L 700 700 L 500 300 Z";

    #[test]
    fn test_identical_outlines_share_key() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let a = hash_glyph(&r, gref(0, 1), SQUARE, &m);
        let b = hash_glyph(&r, gref(1, 9), SQUARE, &m);
        assert_eq!(a.key, b.key);
        assert!(!a.key.is_empty());
    }

    #[test]
    fn test_different_outlines_differ() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let a = hash_glyph(&r, gref(0, 1), SQUARE, &m);
        let b = hash_glyph(&r, gref(0, 2), TRIANGLE, &m);
        assert!(a.key.hamming_distance(&b.key) > 16);
    }

    #[test]
    fn test_degenerate_outline_yields_empty_sentinel() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let hashed = hash_glyph(&r, gref(0, 3), "", &m);
        assert_eq!(hashed.key, ShapeKey::EMPTY);
        assert!(hashed.raster.is_none());

        let hashed = hash_glyph(&r, gref(0, 4), "M 0 0 L 10 0", &m);
        assert_eq!(hashed.key, ShapeKey::EMPTY);
    }

    #[test]
    fn test_registry_dedupes_occurrences() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let mut registry = ShapeRegistry::new(6);

        let k1 = registry.register(hash_glyph(&r, gref(0, 1), SQUARE, &m));
        let k2 = registry.register(hash_glyph(&r, gref(1, 7), SQUARE, &m));
        let k3 = registry.register(hash_glyph(&r, gref(0, 2), TRIANGLE, &m));

        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&k1).unwrap().occurrences.len(), 2);
    }

    #[test]
    fn test_near_duplicate_folding() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let mut registry = ShapeRegistry::new(6);

        let base = hash_glyph(&r, gref(0, 1), SQUARE, &m);
        let canonical = registry.register(base.clone());

        // Perturb the key within the fold distance to simulate a re-render
        // differing by anti-aliasing noise.
        let mut noisy = base.clone();
        noisy.glyph_ref = gref(2, 5);
        noisy.key.0[1] ^= 0b111; // flip 3 bits

        let folded = registry.register(noisy);
        assert_eq!(folded, canonical);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&canonical).unwrap().occurrences.len(), 2);
    }

    #[test]
    fn test_empty_sentinel_never_folds() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let mut registry = ShapeRegistry::new(512);

        registry.register(hash_glyph(&r, gref(0, 1), SQUARE, &m));
        let k = registry.register(hash_glyph(&r, gref(0, 2), "", &m));
        assert_eq!(k, ShapeKey::EMPTY);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_shape_key_roundtrips_through_hex() {
        let r = rasterizer();
        let m = FontMetrics::default();
        let key = hash_glyph(&r, gref(0, 1), SQUARE, &m).key;
        let hex = key.to_string();
        assert_eq!(hex.len(), 128);
        assert_eq!(ShapeKey::from_str(&hex).unwrap(), key);
    }

    #[test]
    fn test_shape_key_serde() {
        let key = ShapeKey::EMPTY;
        let json = serde_json::to_string(&key).unwrap();
        let back: ShapeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
