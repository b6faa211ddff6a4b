//! Stage-1 record model: the raw per-batch data the retrieval collaborator
//! delivers.
//!
//! Retrieval and session management are out of scope; this module only
//! defines the shapes of the records it hands over (per-batch glyph
//! outline tables, per-page placement runs, and the table-of-contents
//! record) plus the flattening that restores one ordered
//! [`GlyphInstance`] sequence for the whole document and tags each
//! instance with its chapter position.

use crate::canonical::GlyphRef;
use crate::error::{Error, Result};
use crate::geometry::Rect;
use crate::raster::FontMetrics;
use serde::Deserialize;
use std::collections::BTreeMap;

fn default_units_per_em() -> f32 {
    1000.0
}
fn default_ascent() -> f32 {
    800.0
}
fn default_descent() -> f32 {
    -200.0
}
fn default_font_weight() -> u16 {
    400
}
fn default_font_style() -> String {
    "normal".to_string()
}
fn default_font_size() -> f32 {
    8.91
}

/// One glyph outline definition within a font family table.
#[derive(Debug, Clone, Deserialize)]
pub struct GlyphDef {
    /// SVG-style outline path data
    #[serde(default)]
    pub path: String,
}

/// The outline table of one session font family within a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontGlyphs {
    /// Session font family name
    pub font_family: String,
    /// Font units per em
    #[serde(default = "default_units_per_em")]
    pub units_per_em: f32,
    /// Ascender in font units
    #[serde(default = "default_ascent")]
    pub ascent: f32,
    /// Descender in font units (negative)
    #[serde(default = "default_descent")]
    pub descent: f32,
    /// Outlines keyed by local glyph id
    #[serde(default)]
    pub glyphs: BTreeMap<u32, GlyphDef>,
}

impl FontGlyphs {
    /// Vertical metrics of this family.
    pub fn metrics(&self) -> FontMetrics {
        FontMetrics::new(self.units_per_em, self.ascent, self.descent)
    }
}

/// Bounding rect of a placement run, renderer coordinate convention.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct RunRect {
    /// Left edge
    #[serde(default)]
    pub left: f32,
    /// Top edge
    #[serde(default)]
    pub top: f32,
    /// Right edge
    #[serde(default)]
    pub right: f32,
    /// Bottom edge
    #[serde(default)]
    pub bottom: f32,
}

/// One placement run: a row of glyph ids sharing position and style.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRun {
    /// Run bounding rect; absent for malformed records
    #[serde(default)]
    pub rect: Option<RunRect>,
    /// Affine transform `[a b c d tx ty]`; only the translation applies
    /// to layout
    #[serde(default)]
    pub transform: Vec<f32>,
    /// Numeric weight (400 regular, 700 bold)
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    /// "normal" or "italic"
    #[serde(default = "default_font_style")]
    pub font_style: String,
    /// Font size in points
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    /// Present when the run is a hyperlink
    #[serde(default)]
    pub link: Option<serde_json::Value>,
    /// Local glyph ids in reading order
    #[serde(default)]
    pub glyphs: Vec<u32>,
    /// Book position id of the run start, when the renderer reported one
    #[serde(default)]
    pub start_position_id: Option<u32>,
}

impl PlacementRun {
    /// Run rect with the transform's translation applied.
    pub fn placed_rect(&self) -> Option<Rect> {
        let rect = self.rect?;
        let (tx, ty) = if self.transform.len() >= 6 {
            (self.transform[4], self.transform[5])
        } else {
            (0.0, 0.0)
        };
        Some(
            Rect::from_points(rect.left, rect.top, rect.right, rect.bottom).translated(tx, ty),
        )
    }

    /// True when the renderer flagged this run as italic.
    pub fn is_italic(&self) -> bool {
        self.font_style == "italic"
    }
}

/// One rendered page with its placement runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Page width in renderer units
    #[serde(default)]
    pub width: f32,
    /// Page height in renderer units
    #[serde(default)]
    pub height: f32,
    /// Placement runs in reading order
    #[serde(default)]
    pub children: Vec<PlacementRun>,
}

/// One retrieval batch: outline tables plus the pages that reference them.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Batch index in document order
    pub id: u32,
    /// Per-family outline tables
    pub fonts: Vec<FontGlyphs>,
    /// Pages in document order
    pub pages: Vec<Page>,
}

impl Batch {
    /// Parse a batch from its Stage-1 JSON records: one glyph-table
    /// document and any number of page documents (each an array of pages).
    pub fn from_json(id: u32, glyphs_json: &str, page_jsons: &[&str]) -> Result<Self> {
        let fonts: Vec<FontGlyphs> =
            serde_json::from_str(glyphs_json).map_err(|e| Error::InvalidBatch(e.to_string()))?;
        let mut pages = Vec::new();
        for doc in page_jsons {
            let mut batch_pages: Vec<Page> =
                serde_json::from_str(doc).map_err(|e| Error::InvalidBatch(e.to_string()))?;
            pages.append(&mut batch_pages);
        }
        Ok(Self { id, fonts, pages })
    }

    /// Iterate every outline in this batch with its glyph reference and
    /// family metrics.
    pub fn outlines(&self) -> impl Iterator<Item = (GlyphRef, &GlyphDef, FontMetrics)> + '_ {
        self.fonts.iter().flat_map(move |family| {
            let metrics = family.metrics();
            family.glyphs.iter().map(move |(&glyph_id, def)| {
                (
                    GlyphRef {
                        batch: self.id,
                        glyph: glyph_id,
                    },
                    def,
                    metrics,
                )
            })
        })
    }
}

/// One table-of-contents entry, possibly nested.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TocEntry {
    /// Human-readable chapter title
    pub label: String,
    /// Book position id the entry points at
    pub toc_position_id: u32,
    /// Sub-entries, empty for leaves
    #[serde(default)]
    pub entries: Vec<TocEntry>,
}

/// Parse the TOC record.
pub fn toc_from_json(json: &str) -> Result<Vec<TocEntry>> {
    serde_json::from_str(json).map_err(|e| Error::InvalidBatch(e.to_string()))
}

/// Flatten a nested TOC.
///
/// A section header whose position equals its first sub-entry's position
/// duplicates that sub-entry and is dropped in favor of its children;
/// otherwise both the header and the children are kept.
pub fn flatten_toc(entries: &[TocEntry]) -> Vec<TocEntry> {
    let mut flat = Vec::new();
    for entry in entries {
        if entry.entries.is_empty() {
            flat.push(entry.clone());
            continue;
        }
        let duplicates_first_child = entry.entries[0].toc_position_id == entry.toc_position_id;
        if !duplicates_first_child {
            flat.push(TocEntry {
                entries: Vec::new(),
                ..entry.clone()
            });
        }
        for sub in &entry.entries {
            flat.push(TocEntry {
                entries: Vec::new(),
                ..sub.clone()
            });
        }
    }
    flat
}

/// One occurrence of a glyph in reading order, with layout metadata.
#[derive(Debug, Clone)]
pub struct GlyphInstance {
    /// Which outline this occurrence renders
    pub glyph_ref: GlyphRef,
    /// Global reading-order index, dense from 0
    pub sequence: usize,
    /// Approximate glyph rect: the run rect divided evenly among the
    /// run's glyphs
    pub rect: Rect,
    /// Font size in points
    pub font_size: f32,
    /// Numeric weight hint
    pub weight: u16,
    /// Italic hint
    pub italic: bool,
    /// Hyperlink membership
    pub has_link: bool,
    /// Chapter tag: index into the flattened TOC of the chapter this
    /// glyph belongs to; `None` before the first chapter anchor
    pub chapter: Option<u32>,
    /// True when the source run had no rect and layout defaults were
    /// substituted
    pub missing_layout: bool,
}

/// A chapter anchor resolved to a glyph sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterAnchor {
    /// Chapter title from the TOC
    pub title: String,
    /// Sequence index of the chapter's first glyph
    pub glyph_index: usize,
}

/// The full document as delivered by Stage 1.
#[derive(Debug, Clone, Default)]
pub struct DocumentInput {
    /// Batches in document order
    pub batches: Vec<Batch>,
    /// Table of contents, possibly nested
    pub toc: Vec<TocEntry>,
}

impl DocumentInput {
    /// Page width of the first page, used for alignment thresholds.
    pub fn page_width(&self) -> Option<f32> {
        self.batches
            .iter()
            .flat_map(|b| b.pages.iter())
            .find(|p| p.width > 0.0)
            .map(|p| p.width)
    }

    /// Resolve TOC entries to chapter anchors over the glyph sequence.
    ///
    /// Position ids are matched to run start positions exactly first, then
    /// to the nearest run start within `fuzzy_distance`. Entries with no
    /// match are dropped with a warning.
    pub fn chapter_anchors(&self, fuzzy_distance: u32) -> Vec<ChapterAnchor> {
        // Map every reported run start position to its glyph index.
        let mut position_to_index: BTreeMap<u32, usize> = BTreeMap::new();
        let mut glyph_index = 0usize;
        for batch in &self.batches {
            for page in &batch.pages {
                for run in &page.children {
                    if let Some(pos) = run.start_position_id {
                        position_to_index.entry(pos).or_insert(glyph_index);
                    }
                    glyph_index += run.glyphs.len();
                }
            }
        }

        let mut anchors = Vec::new();
        for entry in flatten_toc(&self.toc) {
            let target = entry.toc_position_id;
            let exact = position_to_index.get(&target).copied();
            let resolved = exact.or_else(|| {
                position_to_index
                    .iter()
                    .map(|(&pos, &idx)| (pos.abs_diff(target), pos, idx))
                    .filter(|&(d, _, _)| d <= fuzzy_distance)
                    .min_by_key(|&(d, pos, _)| (d, pos))
                    .map(|(d, pos, idx)| {
                        log::debug!(
                            "fuzzy TOC anchor for '{}': {} -> {} (distance {})",
                            entry.label,
                            target,
                            pos,
                            d
                        );
                        idx
                    })
            });
            match resolved {
                Some(idx) => anchors.push(ChapterAnchor {
                    title: entry.label,
                    glyph_index: idx,
                }),
                None => log::warn!(
                    "no position anchor for TOC entry '{}' (position {})",
                    entry.label,
                    target
                ),
            }
        }
        anchors.sort_by_key(|a| a.glyph_index);
        anchors
    }

    /// Flatten all batches into the ordered, chapter-tagged glyph
    /// instance sequence.
    ///
    /// Runs without a rect continue the previous run's layout and are
    /// flagged; their glyphs are never dropped.
    pub fn instances(&self, fuzzy_distance: u32) -> Vec<GlyphInstance> {
        let anchors = self.chapter_anchors(fuzzy_distance);

        let mut instances = Vec::new();
        let mut sequence = 0usize;
        let mut last_rect = Rect::new(0.0, 0.0, 0.0, 0.0);
        let mut next_anchor = 0usize;
        let mut chapter: Option<u32> = None;

        for batch in &self.batches {
            for page in &batch.pages {
                for run in &page.children {
                    let (run_rect, missing_layout) = match run.placed_rect() {
                        Some(rect) => {
                            last_rect = rect;
                            (rect, false)
                        },
                        None => (last_rect, true),
                    };
                    let glyph_count = run.glyphs.len().max(1) as f32;
                    let glyph_width = run_rect.width / glyph_count;

                    for (i, &glyph_id) in run.glyphs.iter().enumerate() {
                        while next_anchor < anchors.len()
                            && anchors[next_anchor].glyph_index == sequence
                        {
                            chapter = Some(next_anchor as u32);
                            next_anchor += 1;
                        }

                        instances.push(GlyphInstance {
                            glyph_ref: GlyphRef {
                                batch: batch.id,
                                glyph: glyph_id,
                            },
                            sequence,
                            rect: Rect::new(
                                run_rect.x + glyph_width * i as f32,
                                run_rect.y,
                                glyph_width,
                                run_rect.height,
                            ),
                            font_size: run.font_size,
                            weight: run.font_weight,
                            italic: run.is_italic(),
                            has_link: run.link.is_some(),
                            chapter,
                            missing_layout,
                        });
                        sequence += 1;
                    }
                }
            }
        }
        instances
    }
}
