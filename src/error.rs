use thiserror::Error;

pub type Result<T, E = PdfPaintError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PdfPaintError {
    /// The active conformance profile forbids the requested operation.
    #[error("conformance violation: {0}")]
    ConformanceViolation(String),
    #[error("invalid paint: {0}")]
    InvalidPaint(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("font error: {0}")]
    Font(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
