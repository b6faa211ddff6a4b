// Allow some clippy lints that are too pedantic for this project
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
// Allow unused for tests
#![cfg_attr(test, allow(dead_code))]

//! # Glyph Oxide
//!
//! Recovers readable text from documents delivered as vector glyph shapes
//! rendered through a session-scoped custom font encoding. Each glyph
//! carries no character identity; identity is recovered by comparing the
//! rendered shape against a reference typeface whose mapping is known,
//! then reassembling the recovered characters into a structured document.
//!
//! ## Pipeline
//!
//! 1. **Canonicalize** ([`canonical`]): render every outline at a fixed
//!    base resolution, perceptually hash it, and fold near-duplicates into
//!    canonical shapes shared across retrieval batches.
//! 2. **Match** ([`matcher`], consulting [`reference`]): a coarse-to-fine
//!    structural-similarity search against pre-rendered reference glyphs,
//!    keeping only the top candidates at each resolution tier.
//! 3. **Store** ([`store`]): a persistent shape-key-to-character table
//!    with a confidence-monotonicity invariant, reusable across runs and
//!    related documents.
//! 4. **Assemble** ([`assembler`]): the ordered glyph sequence becomes
//!    chapters, paragraphs, lines and styled runs; unresolved glyphs
//!    surface as explicit placeholders, never silently dropped.
//!
//! ## Quick Start
//!
//! ```ignore
//! use glyph_oxide::config::{DecoderConfig, ReferenceFaceConfig};
//! use glyph_oxide::input::DocumentInput;
//! use glyph_oxide::pipeline::{CancelToken, DecodePipeline};
//! use glyph_oxide::reference::FontStyle;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DecoderConfig {
//!     reference_faces: vec![ReferenceFaceConfig {
//!         path: "fonts/Bookerly.ttf".into(),
//!         style: FontStyle::Regular,
//!     }],
//!     store_path: Some("mapping.json".into()),
//!     ..DecoderConfig::default()
//! };
//!
//! let pipeline = DecodePipeline::new(config)?;
//! let input = DocumentInput { batches: vec![], toc: vec![] };
//! let outcome = pipeline.run(&input, &CancelToken::new())?;
//! println!("{}", outcome.document.text());
//! # Ok(())
//! # }
//! ```
//!
//! Retrieval of raw batch data (Stage 1) and container packaging of the
//! reconstructed document (Stage 3) are external collaborators; this
//! crate consumes [`input::DocumentInput`] and produces
//! [`assembler::ReconstructedDocument`].

#![warn(missing_docs)]

// Error handling
pub mod error;

// Configuration
pub mod config;

// Geometry for placement and layout
pub mod geometry;

// Stage-1 record model
pub mod input;

// Shared rasterization
pub mod raster;

// Shape canonicalization and deduplication
pub mod canonical;

// Reference typeface index
pub mod reference;

// Progressive structural-similarity matching
pub mod matcher;

// Persistent mapping store
pub mod store;

// Document assembly
pub mod assembler;

// Orchestration
pub mod pipeline;

// Re-exports
pub use assembler::ReconstructedDocument;
pub use canonical::{ShapeKey, ShapeRegistry};
pub use config::DecoderConfig;
pub use error::{Error, Result};
pub use pipeline::{CancelToken, DecodeOutcome, DecodePipeline, DecodeSummary};
pub use reference::{FontStyle, ReferenceIndex};
pub use store::{MappingEntry, MappingStore, PutOutcome};

// Internal utilities
pub(crate) mod utils {
    //! Internal utility functions for the library.

    use std::cmp::Ordering;

    /// Safely compare two floating point numbers, handling NaN cases.
    ///
    /// NaN values are treated as equal to each other and greater than all
    /// other values, so sorting candidate scores never panics. A NaN
    /// similarity score thereby sorts behind every real candidate.
    #[inline]
    pub fn safe_float_cmp(a: f32, b: f32) -> Ordering {
        match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater, // NaN > all numbers
            (false, true) => Ordering::Less,    // all numbers < NaN
            (false, false) => {
                // Both are normal numbers, safe to unwrap
                a.partial_cmp(&b).unwrap()
            },
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_safe_float_cmp_normal() {
            assert_eq!(safe_float_cmp(1.0, 2.0), Ordering::Less);
            assert_eq!(safe_float_cmp(2.0, 1.0), Ordering::Greater);
            assert_eq!(safe_float_cmp(1.5, 1.5), Ordering::Equal);
        }

        #[test]
        fn test_safe_float_cmp_nan() {
            assert_eq!(safe_float_cmp(f32::NAN, f32::NAN), Ordering::Equal);
            assert_eq!(safe_float_cmp(f32::NAN, 0.0), Ordering::Greater);
            assert_eq!(safe_float_cmp(0.0, f32::NAN), Ordering::Less);
        }

        #[test]
        fn test_safe_float_cmp_infinity() {
            assert_eq!(safe_float_cmp(f32::INFINITY, f32::INFINITY), Ordering::Equal);
            assert_eq!(safe_float_cmp(f32::INFINITY, 1.0), Ordering::Greater);
            assert_eq!(safe_float_cmp(f32::NEG_INFINITY, f32::INFINITY), Ordering::Less);
        }
    }
}

// Version info
/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        // VERSION is populated from CARGO_PKG_VERSION at compile time
        assert!(VERSION.starts_with("0."));
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "glyph_oxide");
    }
}
