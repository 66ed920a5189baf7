//! Document signing core
//!
//! Everything that reads or writes PDF bytes for the signing pipeline:
//!
//! - [`validator`]: three-way structural check of an uploaded file
//! - [`engine`]: ordered overlay strategies that stamp a signature on the last page
//! - [`fallback`]: single-page attestation document for files that cannot be stamped
//!
//! Parsing of untrusted input always runs through [`guard::run_bounded`], so a
//! hostile file costs at most one bounded worker thread.

pub mod content;
pub mod engine;
pub mod error;
pub mod fallback;
pub mod guard;
pub mod image;
pub mod parser;
pub mod payload;
pub mod validator;

pub use engine::{
    PdfSigningEngine, Placement, SignAttempt, SignatureStamp, SignedPdf, StampKind, Strategy,
    StrategyFailure,
};
pub use error::SigningError;
pub use fallback::{Attestation, AttestationRequest, FallbackDocumentSynthesizer};
pub use parser::{ParseMode, PdfDocument};
pub use payload::{PayloadKind, SignaturePayload};
pub use validator::{has_pdf_header, PdfValidator, Validation};
