//! Error types for the glyph decoding library.
//!
//! Only configuration problems discovered at startup are fatal. Everything
//! that can go wrong for a single glyph (degenerate outline, no acceptable
//! match, a rejected store write) is handled locally and never surfaces
//! through this module.

/// Result type alias for glyph decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur during glyph decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reference typeface file could not be read
    #[error("Reference typeface not readable: {path}: {reason}")]
    ReferenceFaceUnreadable {
        /// Path of the typeface file
        path: String,
        /// Reason the file could not be read
        reason: String,
    },

    /// Reference typeface file could not be parsed as a font
    #[error("Reference typeface not parseable: {path}: {reason}")]
    ReferenceFaceInvalid {
        /// Path of the typeface file
        path: String,
        /// Parser failure description
        reason: String,
    },

    /// A configured style has no renderable characters in any face
    #[error("No renderable characters for style {0}")]
    StyleNotCovered(String),

    /// No resolution tiers configured
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Stage-1 batch record failed to deserialize
    #[error("Invalid batch record: {0}")]
    InvalidBatch(String),

    /// Mapping store snapshot failed to deserialize
    #[error("Mapping store corrupt: {0}")]
    StoreCorrupt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_face_unreadable_display() {
        let err = Error::ReferenceFaceUnreadable {
            path: "fonts/Bookerly.ttf".to_string(),
            reason: "no such file".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Bookerly.ttf"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_style_not_covered_display() {
        let err = Error::StyleNotCovered("bold-italic".to_string());
        assert!(format!("{}", err).contains("bold-italic"));
    }

    #[test]
    fn test_invalid_config_display() {
        let err = Error::InvalidConfig("empty tier ladder".to_string());
        assert!(format!("{}", err).contains("empty tier ladder"));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
