use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("PDF is encrypted and cannot be rewritten")]
    Encrypted,

    #[error("PDF has no pages")]
    MissingPage,

    #[error("Image embedding failed: {0}")]
    Image(String),

    #[error("Metadata rewrite failed: {0}")]
    Metadata(String),

    #[error("PDF operation failed: {0}")]
    Operation(String),

    #[error("Failed to save PDF: {0}")]
    Save(String),

    #[error("Timed out after {0}ms")]
    Timeout(u64),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl From<lopdf::Error> for SigningError {
    fn from(err: lopdf::Error) -> Self {
        SigningError::Operation(err.to_string())
    }
}
