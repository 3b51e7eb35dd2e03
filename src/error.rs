//! Error taxonomy for edition generation
//!
//! Every variant is fatal for the run. The driver wraps the cause in
//! [`RunAborted`] together with the last edition that was fully persisted.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GenerationError>;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Source unavailable for layer '{layer}': {source}")]
    SourceUnavailable {
        layer: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid element name '{file}' in layer '{layer}'")]
    InvalidElementName { layer: String, file: String },

    #[error("Invalid rarity marker '{marker}' in '{file}' (layer '{layer}')")]
    InvalidRarityMarker {
        layer: String,
        file: String,
        marker: String,
    },

    #[error("Layer '{0}' has no elements")]
    EmptyLayer(String),

    #[error("Combination space exhausted at edition {edition} after {attempts} attempts")]
    CombinationSpaceExhausted { edition: u32, attempts: u32 },

    #[error("Name space exhausted at edition {edition} after {attempts} attempts")]
    NameSpaceExhausted { edition: u32, attempts: u32 },

    #[error("Failed to load '{file}' for layer '{layer}': {reason}")]
    AssetLoadFailure {
        layer: String,
        file: String,
        reason: String,
    },

    #[error("Compositor cannot draw '{file}' of layer '{layer}': {reason}")]
    UnsupportedDrawable {
        layer: String,
        file: String,
        reason: String,
    },

    #[error("Persistence error at edition {edition}: {reason}")]
    Persistence { edition: u32, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A run that stopped before producing every edition.
#[derive(Debug, Error)]
#[error("Run aborted after edition {last_completed}: {cause}")]
pub struct RunAborted {
    /// Last edition whose artifacts were fully persisted (0 if none).
    pub last_completed: u32,
    #[source]
    pub cause: GenerationError,
}

impl GenerationError {
    pub(crate) fn persistence(edition: u32, err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            edition,
            reason: err.to_string(),
        }
    }
}
