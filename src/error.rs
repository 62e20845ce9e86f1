use thiserror::Error;

/// Rejections raised by interactive graph mutations. A failed mutation never
/// touches the graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EditError {
    #[error("node '{0}' does not exist")]
    UnknownNode(String),
    #[error("group '{0}' does not exist")]
    UnknownGroup(String),
    #[error("edge '{0}' does not exist")]
    UnknownEdge(String),
    #[error("'{0}' is not present in the graph")]
    UnknownEndpoint(String),
    #[error("cannot connect '{0}' to itself")]
    SelfLoop(String),
    #[error("group '{0}' is structural and cannot be deleted")]
    GroupsAreStructural(String),
    #[error("size {width}x{height} is below the minimum {min_width}x{min_height}")]
    SizeBelowFloor {
        width: f64,
        height: f64,
        min_width: f64,
        min_height: f64,
    },
    #[error("zoom factor must be positive, got {0}")]
    InvalidZoom(f64),
    #[error("coordinates ({x}, {y}) are not finite")]
    NonFinitePoint { x: f64, y: f64 },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("layout file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("layout file has an unrecognised shape: {0}")]
    UnrecognisedShape(String),
}

/// Failures surfaced by the content and publish store adapters. Every adapter
/// converts its transport errors into one of these at the call site.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("request failed: {0}")]
    Transient(String),
    #[error("could not encode or decode payload: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<ImportError> for StoreError {
    fn from(err: ImportError) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
