//! The glyph decoding pipeline: orchestration of the full flow.
//!
//! ```text
//! Stage-1 batches (DocumentInput)
//!     ↓
//! [canonicalize] render + hash every outline   (parallel, pure)
//!     ↓
//! ShapeRegistry (sequential fold + registration)
//!     ↓
//! [match] progressive SSIM search per shape    (parallel, store is the
//!     ↓                                         only shared state)
//! MappingStore (monotonic, persistent)
//!     ↓
//! [assemble] ordered single-threaded pass
//!     ↓
//! ReconstructedDocument + DecodeSummary
//! ```
//!
//! Canonicalization and matching of independent shapes are embarrassingly
//! parallel and run on the rayon pool. The assembler is single-threaded
//! because output ordering is a global property of the input sequence.
//! A run can be cancelled between shape-matching units; whatever the store
//! already holds stays valid and seeds the next run.

use crate::assembler::{DocumentAssembler, ReconstructedDocument};
use crate::canonical::{hash_glyph, GlyphRef, ShapeKey, ShapeRegistry};
use crate::config::DecoderConfig;
use crate::error::Result;
use crate::input::DocumentInput;
use crate::matcher::ProgressiveMatcher;
use crate::raster::GlyphRasterizer;
use crate::reference::{FontStyle, ReferenceIndex};
use crate::store::{MappingEntry, MappingStore};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked between shape-matching units.
/// Never interrupts the comparison of a single glyph.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Create a token in the running state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// True once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Upper bounds of the confidence histogram buckets in [`DecodeSummary`].
pub const CONFIDENCE_BUCKETS: [f32; 5] = [0.1, 0.25, 0.5, 1.0, f32::INFINITY];

/// End-of-run accounting, so recovery quality is auditable without
/// re-running.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeSummary {
    /// Glyph instances in the input sequence
    pub total_instances: usize,
    /// Canonical shapes after deduplication
    pub canonical_shapes: usize,
    /// Shapes actually matched in this run (not reused from the store)
    pub matched_this_run: usize,
    /// Shapes with a resolved mapping entry
    pub resolved_shapes: usize,
    /// Shapes left unresolved
    pub unresolved_shapes: usize,
    /// Instances emitted as placeholders
    pub placeholder_instances: usize,
    /// Instances assembled with best-effort layout defaults
    pub flagged_layout_instances: usize,
    /// Instances skipped as front matter (zero unless configured)
    pub skipped_front_matter: usize,
    /// Resolved-shape counts per confidence bucket, bounds in
    /// [`CONFIDENCE_BUCKETS`]
    pub confidence_histogram: [usize; 5],
    /// True when the run was cancelled before all shapes were matched
    pub cancelled: bool,
}

/// A finished run: the document plus its summary.
#[derive(Debug)]
pub struct DecodeOutcome {
    /// The reconstructed document
    pub document: ReconstructedDocument,
    /// End-of-run accounting
    pub summary: DecodeSummary,
}

/// The decoding pipeline. Built once per configuration; reusable across
/// documents that share the mapping store.
pub struct DecodePipeline {
    config: DecoderConfig,
    index: ReferenceIndex,
    store: MappingStore,
}

impl DecodePipeline {
    /// Build the pipeline: validate configuration, pre-render the
    /// reference index, load the mapping store snapshot.
    ///
    /// All configuration problems surface here; nothing later in the run
    /// is fatal.
    pub fn new(config: DecoderConfig) -> Result<Self> {
        config.validate()?;
        let index = ReferenceIndex::build(&config)?;
        let store = match &config.store_path {
            Some(path) => MappingStore::load(path)?,
            None => MappingStore::new(),
        };
        Ok(Self {
            config,
            index,
            store,
        })
    }

    /// Assemble a pipeline from prebuilt parts (a pre-rendered index, a
    /// store loaded elsewhere).
    pub fn from_parts(config: DecoderConfig, index: ReferenceIndex, store: MappingStore) -> Self {
        Self {
            config,
            index,
            store,
        }
    }

    /// The mapping store, for inspection and re-match scheduling.
    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    /// Decode one document.
    pub fn run(&self, input: &DocumentInput, cancel: &CancelToken) -> Result<DecodeOutcome> {
        let fuzzy = self.config.assembler.toc_fuzzy_distance;
        let instances = input.instances(fuzzy);
        let anchors = input.chapter_anchors(fuzzy);
        let page_width = input.page_width().unwrap_or(0.0);

        // Phase 1: render + hash every outline in parallel, then fold and
        // register sequentially (folding consults the seen-key set).
        let rasterizer = GlyphRasterizer::new(self.config.canonical.base_resolution);
        let outlines: Vec<_> = input
            .batches
            .iter()
            .flat_map(|b| b.outlines())
            .collect();
        let hashed: Vec<_> = outlines
            .par_iter()
            .map(|(glyph_ref, def, metrics)| hash_glyph(&rasterizer, *glyph_ref, &def.path, metrics))
            .collect();

        let mut registry = ShapeRegistry::new(self.config.canonical.fold_distance);
        let mut shape_map: HashMap<GlyphRef, ShapeKey> = HashMap::new();
        for item in hashed {
            let glyph_ref = item.glyph_ref;
            let key = registry.register(item);
            shape_map.insert(glyph_ref, key);
        }
        log::info!(
            "canonicalized {} outlines into {} shapes",
            outlines.len(),
            registry.len()
        );

        // Style hints: the first instance of each shape decides, so the
        // hint is deterministic in reading order.
        let mut style_hints: HashMap<ShapeKey, FontStyle> = HashMap::new();
        for instance in &instances {
            if let Some(key) = shape_map.get(&instance.glyph_ref) {
                style_hints
                    .entry(*key)
                    .or_insert_with(|| FontStyle::from_hints(instance.weight, instance.italic));
            }
        }

        // Degenerate outlines resolve to a recorded unresolved entry under
        // the fixed empty-shape key, never through comparison.
        if registry.get(&ShapeKey::EMPTY).is_some() {
            self.store.put(MappingEntry::unresolved(ShapeKey::EMPTY));
        }

        // Phase 2: match the shapes the store cannot already answer.
        let to_match: Vec<_> = registry
            .iter()
            .filter(|shape| {
                !shape.key.is_empty()
                    && self
                        .store
                        .get(&shape.key)
                        .map(|entry| !entry.is_resolved())
                        .unwrap_or(true)
            })
            .collect();
        let matched_this_run = to_match.len();
        log::info!(
            "matching {} shapes ({} answered by the store)",
            matched_this_run,
            registry.len() - matched_this_run
        );

        let matcher = ProgressiveMatcher::new(&self.index, self.config.matcher.clone());
        to_match.par_iter().for_each(|shape| {
            if cancel.is_cancelled() {
                return;
            }
            let hint = style_hints.get(&shape.key).copied();
            let entry = matcher.match_shape(shape, hint);
            self.store.put(entry);
        });

        // Phase 3: single-threaded assembly in reading order.
        let assembler = DocumentAssembler::new(&self.store, self.config.assembler.clone());
        let (document, stats) =
            assembler.assemble(&instances, &shape_map, &registry, &anchors, page_width);

        let summary = self.summarize(&registry, &stats, matched_this_run, cancel.is_cancelled());
        log::info!(
            "decoded {} instances: {} shapes resolved, {} unresolved, {} placeholders",
            summary.total_instances,
            summary.resolved_shapes,
            summary.unresolved_shapes,
            summary.placeholder_instances
        );

        if let Some(path) = &self.config.store_path {
            self.store.save(path)?;
        }

        Ok(DecodeOutcome { document, summary })
    }

    /// Re-match every shape of `registry` whose entry is still
    /// unresolved, e.g. after raising the tier ladder in the
    /// configuration. The store only accepts strictly better results, so
    /// re-matching never regresses an entry. Returns how many shapes
    /// became resolved.
    pub fn rematch_unresolved(&self, registry: &ShapeRegistry, cancel: &CancelToken) -> usize {
        let unresolved: Vec<_> = self
            .store
            .all_unresolved()
            .into_iter()
            .filter_map(|key| registry.get(&key))
            .filter(|shape| !shape.key.is_empty())
            .collect();
        let matcher = ProgressiveMatcher::new(&self.index, self.config.matcher.clone());
        unresolved
            .par_iter()
            .map(|shape| {
                if cancel.is_cancelled() {
                    return 0;
                }
                let entry = matcher.match_shape(shape, None);
                let resolved = entry.is_resolved();
                match self.store.put(entry) {
                    crate::store::PutOutcome::Rejected => 0,
                    _ if resolved => 1,
                    _ => 0,
                }
            })
            .sum()
    }

    fn summarize(
        &self,
        registry: &ShapeRegistry,
        stats: &crate::assembler::AssemblyStats,
        matched_this_run: usize,
        cancelled: bool,
    ) -> DecodeSummary {
        let mut resolved_shapes = 0;
        let mut unresolved_shapes = 0;
        let mut confidence_histogram = [0usize; 5];

        for shape in registry.iter() {
            match self.store.get(&shape.key) {
                Some(entry) if entry.is_resolved() => {
                    resolved_shapes += 1;
                    let bucket = CONFIDENCE_BUCKETS
                        .iter()
                        .position(|&b| entry.confidence < b)
                        .unwrap_or(CONFIDENCE_BUCKETS.len() - 1);
                    confidence_histogram[bucket] += 1;
                },
                _ => unresolved_shapes += 1,
            }
        }

        DecodeSummary {
            total_instances: stats.total_instances,
            canonical_shapes: registry.len(),
            matched_this_run,
            resolved_shapes,
            unresolved_shapes,
            placeholder_instances: stats.placeholder_instances,
            flagged_layout_instances: stats.flagged_layout_instances,
            skipped_front_matter: stats.skipped_front_matter,
            confidence_histogram,
            cancelled,
        }
    }
}
