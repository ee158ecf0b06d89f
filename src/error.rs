//! Error types for the persona engine

use thiserror::Error;

/// Errors that can occur while loading host-supplied input.
///
/// The engine's runtime paths (scoring, selection, orchestration) never
/// error: malformed rules degrade to non-matches and content resolution
/// always falls back to the default variant. Errors only surface when
/// parsing JSON handed over by the host.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse host payload: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}
