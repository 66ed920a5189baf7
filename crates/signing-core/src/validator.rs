//! Structural PDF validation

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::guard::run_bounded;
use crate::parser::{ParseMode, PdfDocument};

/// Every PDF starts with this
pub const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Shortest input worth looking at (`%PDF-`)
pub const MIN_PDF_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Validation {
    /// Too short or missing the PDF header
    Malformed,
    /// Looks like a PDF but neither a strict nor a permissive parse succeeds
    ValidButUnprocessable,
    Processable,
}

/// Header check only, no parsing
pub fn has_pdf_header(bytes: &[u8]) -> bool {
    bytes.len() >= MIN_PDF_LEN && bytes.starts_with(PDF_MAGIC)
}

#[derive(Debug, Clone, Default)]
pub struct PdfValidator {
    parse_timeout: Option<Duration>,
}

impl PdfValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.parse_timeout = timeout;
        self
    }

    pub fn validate(&self, bytes: &[u8]) -> Validation {
        if !has_pdf_header(bytes) {
            return Validation::Malformed;
        }

        let shared: Arc<[u8]> = Arc::from(bytes);
        for mode in [ParseMode::Strict, ParseMode::IgnoreEncryption] {
            let input = Arc::clone(&shared);
            let parsed = run_bounded("validate", self.parse_timeout, move || {
                PdfDocument::parse(&input, mode).map(|_| ())
            });
            match parsed {
                Ok(()) => return Validation::Processable,
                Err(error) => debug!(mode = ?mode, error = %error, "validation parse failed"),
            }
        }

        Validation::ValidButUnprocessable
    }
}
