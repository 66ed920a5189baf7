//! Signature overlay onto an existing PDF
//!
//! The engine walks an ordered list of strategies, each more permissive than
//! the last, and stops at the first one that yields a re-parseable file.
//! Running out of strategies is an expected outcome that callers answer with
//! a synthesized attestation document.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lopdf::{Dictionary, Object};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::content::{add_page_resource, append_page_content, helvetica, image_op, text_op};
use crate::error::SigningError;
use crate::guard::run_bounded;
use crate::image::embed_image;
use crate::parser::{ParseMode, PdfDocument};
use crate::payload::SignaturePayload;

pub const PRODUCER: &str = "signing-core";

/// One way of opening and rewriting the original file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Strict,
    IgnoreEncryption,
    IgnoreEncryptionSkipMetadata,
}

impl Strategy {
    /// Default order, most conservative first
    pub const ORDERED: [Strategy; 3] = [
        Strategy::Strict,
        Strategy::IgnoreEncryption,
        Strategy::IgnoreEncryptionSkipMetadata,
    ];

    pub fn parse_mode(self) -> ParseMode {
        match self {
            Strategy::Strict => ParseMode::Strict,
            Strategy::IgnoreEncryption | Strategy::IgnoreEncryptionSkipMetadata => {
                ParseMode::IgnoreEncryption
            }
        }
    }

    pub fn rewrites_metadata(self) -> bool {
        !matches!(self, Strategy::IgnoreEncryptionSkipMetadata)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Strict => "strict",
            Strategy::IgnoreEncryption => "ignore_encryption",
            Strategy::IgnoreEncryptionSkipMetadata => "ignore_encryption_skip_metadata",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the signature lands, relative to the last page's box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x_ratio: f64,
    pub y_ratio: f64,
    pub image_width: f64,
    pub image_height: f64,
    pub font_size: f64,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x_ratio: 0.70,
            y_ratio: 0.52,
            image_width: 150.0,
            image_height: 60.0,
            font_size: 14.0,
        }
    }
}

/// What gets drawn: the payload, plus the caption drawn when an image payload cannot be embedded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStamp {
    pub payload: SignaturePayload,
    pub caption: String,
}

impl SignatureStamp {
    /// Caption defaults to the payload's literal text
    pub fn new(payload: SignaturePayload) -> Self {
        let caption = payload.literal_text();
        Self { payload, caption }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        let caption = caption.into();
        if !caption.trim().is_empty() {
            self.caption = caption;
        }
        self
    }
}

/// How the signature ended up on the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StampKind {
    Image,
    Text,
}

#[derive(Debug, Clone)]
pub struct SignedPdf {
    pub bytes: Vec<u8>,
    pub strategy: Strategy,
    pub stamp: StampKind,
    pub page_number: u32,
    pub page_count: usize,
    /// Lower-left corner of the stamp in page space
    pub position: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: Strategy,
    pub error: SigningError,
}

#[derive(Debug, Clone)]
pub enum SignAttempt {
    Signed(SignedPdf),
    /// Every strategy failed; the caller should synthesize a fallback document
    StrategiesExhausted(Vec<StrategyFailure>),
}

#[derive(Debug, Clone)]
pub struct PdfSigningEngine {
    strategies: Vec<Strategy>,
    placement: Placement,
    strategy_timeout: Option<Duration>,
}

impl Default for PdfSigningEngine {
    fn default() -> Self {
        Self {
            strategies: Strategy::ORDERED.to_vec(),
            placement: Placement::default(),
            strategy_timeout: None,
        }
    }
}

impl PdfSigningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each strategy attempt; `None` lets attempts run to completion
    pub fn with_strategy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    pub fn with_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<Strategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Overlay the stamp on the last page of `original`
    pub fn sign(&self, original: &[u8], stamp: &SignatureStamp) -> SignAttempt {
        self.sign_at(original, stamp, Utc::now())
    }

    pub fn sign_at(
        &self,
        original: &[u8],
        stamp: &SignatureStamp,
        signed_at: DateTime<Utc>,
    ) -> SignAttempt {
        let original: Arc<[u8]> = Arc::from(original);
        let stamp = Arc::new(stamp.clone());
        let mut failures = Vec::new();

        for &strategy in &self.strategies {
            let bytes = Arc::clone(&original);
            let stamp = Arc::clone(&stamp);
            let placement = self.placement;

            let attempt = run_bounded(strategy.as_str(), self.strategy_timeout, move || {
                apply_strategy(strategy, &bytes, &stamp, placement, signed_at)
            });

            match attempt {
                Ok(signed) => {
                    info!(
                        strategy = %strategy,
                        stamp = ?signed.stamp,
                        page = signed.page_number,
                        "signature overlay applied"
                    );
                    return SignAttempt::Signed(signed);
                }
                Err(error) => {
                    warn!(strategy = %strategy, error = %error, "signing strategy failed");
                    failures.push(StrategyFailure { strategy, error });
                }
            }
        }

        SignAttempt::StrategiesExhausted(failures)
    }
}

fn apply_strategy(
    strategy: Strategy,
    original: &[u8],
    stamp: &SignatureStamp,
    placement: Placement,
    signed_at: DateTime<Utc>,
) -> Result<SignedPdf, SigningError> {
    let mut pdf = PdfDocument::parse(original, strategy.parse_mode())?;
    let page_count = pdf.page_count();
    let (page_number, page_id) = pdf.last_page()?;

    let [box_x, box_y, box_width, box_height] = pdf.page_box(page_id);
    let x = box_x + box_width * placement.x_ratio;
    let y = box_y + box_height * placement.y_ratio;

    let drawn = match stamp.payload.image_bytes() {
        Some(image) => match draw_image(&mut pdf, page_id, image, x, y, placement) {
            Ok(()) => StampKind::Image,
            Err(error) => {
                debug!(strategy = %strategy, error = %error, "image stamp failed, drawing text");
                draw_text(&mut pdf, page_id, &stamp.caption, x, y, placement)?;
                StampKind::Text
            }
        },
        None => {
            draw_text(&mut pdf, page_id, &stamp.payload.literal_text(), x, y, placement)?;
            StampKind::Text
        }
    };

    if strategy.rewrites_metadata() {
        rewrite_info(&mut pdf, signed_at)?;
    }

    let bytes = pdf.save_to_bytes()?;

    // Output must stand on its own as a processable file
    PdfDocument::parse(&bytes, ParseMode::Strict)
        .map_err(|e| SigningError::Save(format!("rewritten file does not re-parse: {}", e)))?;

    Ok(SignedPdf {
        bytes,
        strategy,
        stamp: drawn,
        page_number,
        page_count,
        position: (x, y),
    })
}

fn draw_image(
    pdf: &mut PdfDocument,
    page_id: lopdf::ObjectId,
    image: &[u8],
    x: f64,
    y: f64,
    placement: Placement,
) -> Result<(), SigningError> {
    let embedded = embed_image(pdf.doc_mut(), image)?;
    let name = add_page_resource(
        pdf,
        page_id,
        "XObject",
        "DsSig",
        Object::Reference(embedded.id),
    )?;
    let ops = image_op(&name, x, y, placement.image_width, placement.image_height);
    append_page_content(pdf, page_id, ops.into_bytes())
}

fn draw_text(
    pdf: &mut PdfDocument,
    page_id: lopdf::ObjectId,
    text: &str,
    x: f64,
    y: f64,
    placement: Placement,
) -> Result<(), SigningError> {
    let font_id = pdf.doc_mut().add_object(helvetica(false));
    let name = add_page_resource(pdf, page_id, "Font", "DsFont", Object::Reference(font_id))?;
    let ops = format!(
        "0 0 0 rg\n{}",
        text_op(&name, placement.font_size, x, y, text)
    );
    append_page_content(pdf, page_id, ops.into_bytes())
}

/// Stamp ModDate and Producer into the document information dictionary
fn rewrite_info(pdf: &mut PdfDocument, signed_at: DateTime<Utc>) -> Result<(), SigningError> {
    let mod_date = signed_at.format("D:%Y%m%d%H%M%S+00'00'").to_string();
    let apply = |info: &mut Dictionary| {
        info.set(
            "ModDate",
            Object::String(mod_date.clone().into_bytes(), lopdf::StringFormat::Literal),
        );
        info.set(
            "Producer",
            Object::String(PRODUCER.as_bytes().to_vec(), lopdf::StringFormat::Literal),
        );
    };

    let doc = pdf.doc_mut();
    match doc.trailer.get(b"Info").ok().cloned() {
        Some(Object::Reference(id)) => {
            let info = doc
                .get_object_mut(id)
                .map_err(|e| SigningError::Metadata(e.to_string()))?
                .as_dict_mut()
                .map_err(|_| SigningError::Metadata("Info is not a dictionary".into()))?;
            apply(info);
        }
        Some(Object::Dictionary(mut info)) => {
            apply(&mut info);
            doc.trailer.set("Info", Object::Dictionary(info));
        }
        Some(_) => {
            return Err(SigningError::Metadata(
                "Info is neither a dictionary nor a reference".into(),
            ))
        }
        None => {
            let mut info = Dictionary::new();
            apply(&mut info);
            let info_id = doc.add_object(Object::Dictionary(info));
            doc.trailer.set("Info", Object::Reference(info_id));
        }
    }
    Ok(())
}
