//! Attestation document synthesized when the original cannot be signed in place
//!
//! The output is a fresh single-page A4 file that does not depend on the
//! original bytes at all, so it can be produced for encrypted, truncated or
//! missing originals alike.

use chrono::{DateTime, Utc};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use tracing::warn;

use crate::content::{helvetica, image_op, num, text_op, wrap};
use crate::engine::{StampKind, PRODUCER};
use crate::error::SigningError;
use crate::image::embed_image;
use crate::parser::{ParseMode, PdfDocument};
use crate::payload::SignaturePayload;

pub const A4_WIDTH: f64 = 595.28;
pub const A4_HEIGHT: f64 = 841.89;

const MARGIN: f64 = 56.0;
const WRAP_CHARS: usize = 84;
const SIGNATURE_BOX: (f64, f64) = (150.0, 60.0);

const HEADING: &str = "ELECTRONIC SIGNATURE CERTIFICATE";
const DISCLAIMER: &str = "The original file could not be processed for direct signing. \
This certificate records that the signer named above signed the referenced document \
at the time shown, using the signature reproduced below.";

pub struct AttestationRequest<'a> {
    pub document_title: &'a str,
    pub signer_name: &'a str,
    pub signature: &'a SignaturePayload,
}

#[derive(Debug, Clone)]
pub struct Attestation {
    pub bytes: Vec<u8>,
    pub verification_id: String,
    pub signed_at: DateTime<Utc>,
    pub signature_drawn: StampKind,
}

/// Synthetic verification id for the attestation
pub fn verification_id(at: DateTime<Utc>) -> String {
    format!("VER-{:X}", at.timestamp_millis())
}

#[derive(Debug, Clone, Default)]
pub struct FallbackDocumentSynthesizer;

impl FallbackDocumentSynthesizer {
    pub fn new() -> Self {
        Self
    }

    pub fn synthesize(&self, request: &AttestationRequest<'_>) -> Result<Attestation, SigningError> {
        self.synthesize_at(request, Utc::now())
    }

    pub fn synthesize_at(
        &self,
        request: &AttestationRequest<'_>,
        signed_at: DateTime<Utc>,
    ) -> Result<Attestation, SigningError> {
        let verification_id = verification_id(signed_at);
        let timestamp = signed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();

        let mut doc = Document::with_version("1.7");
        let regular_id = doc.add_object(helvetica(false));
        let bold_id = doc.add_object(helvetica(true));

        let mut xobjects = Dictionary::new();
        let mut ops = String::new();
        let mut cursor = A4_HEIGHT - MARGIN - 18.0;

        ops.push_str("0 0 0 rg\n");
        ops.push_str(&text_op("F2", 18.0, MARGIN, cursor, HEADING));
        cursor -= 40.0;

        let title = format!("Document: {}", request.document_title);
        for line in wrap(&title, WRAP_CHARS) {
            ops.push_str(&text_op("F1", 12.0, MARGIN, cursor, &line));
            cursor -= 18.0;
        }
        ops.push_str(&text_op(
            "F1",
            12.0,
            MARGIN,
            cursor,
            &format!("Signed by: {}", request.signer_name),
        ));
        cursor -= 18.0;
        ops.push_str(&text_op(
            "F1",
            12.0,
            MARGIN,
            cursor,
            &format!("Signed at: {}", timestamp),
        ));
        cursor -= 32.0;

        ops.push_str("0.35 0.35 0.35 rg\n");
        for line in wrap(DISCLAIMER, WRAP_CHARS + 6) {
            ops.push_str(&text_op("F1", 10.0, MARGIN, cursor, &line));
            cursor -= 14.0;
        }
        ops.push_str("0 0 0 rg\n");
        cursor -= 24.0;

        ops.push_str(&text_op("F2", 12.0, MARGIN, cursor, "Signature:"));
        cursor -= SIGNATURE_BOX.1 + 10.0;

        let drawn = match request.signature.image_bytes() {
            Some(image) => match embed_image(&mut doc, image) {
                Ok(embedded) => {
                    xobjects.set("Sig0", Object::Reference(embedded.id));
                    ops.push_str(&image_op(
                        "Sig0",
                        MARGIN,
                        cursor,
                        SIGNATURE_BOX.0,
                        SIGNATURE_BOX.1,
                    ));
                    StampKind::Image
                }
                Err(error) => {
                    warn!(error = %error, "attestation image embedding failed, drawing text");
                    ops.push_str(&signature_text(request.signature, cursor));
                    StampKind::Text
                }
            },
            None => {
                ops.push_str(&signature_text(request.signature, cursor));
                StampKind::Text
            }
        };
        cursor -= 20.0;

        ops.push_str(&format!(
            "0.5 w\n{} {} m\n{} {} l\nS\n",
            num(MARGIN),
            num(cursor),
            num(A4_WIDTH - MARGIN),
            num(cursor)
        ));
        cursor -= 20.0;
        ops.push_str(&text_op(
            "F1",
            9.0,
            MARGIN,
            cursor,
            &format!("Verification ID: {}", verification_id),
        ));

        let content_id = doc.add_object(Stream::new(Dictionary::new(), ops.into_bytes()));
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(A4_WIDTH as f32),
                Object::Real(A4_HEIGHT as f32),
            ],
            "Contents" => Object::Reference(content_id),
            "Resources" => dictionary! {
                "Font" => dictionary! {
                    "F1" => Object::Reference(regular_id),
                    "F2" => Object::Reference(bold_id),
                },
                "XObject" => xobjects,
            },
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        let pdf_date = signed_at.format("D:%Y%m%d%H%M%S+00'00'").to_string();
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal(format!("Signature certificate - {}", request.document_title)),
            "Producer" => Object::string_literal(PRODUCER),
            "CreationDate" => Object::string_literal(pdf_date),
            "Subject" => Object::string_literal(verification_id.clone()),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc.trailer.set("Info", Object::Reference(info_id));

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| SigningError::Save(e.to_string()))?;

        PdfDocument::parse(&buffer, ParseMode::Strict)
            .map_err(|e| SigningError::Save(format!("attestation does not re-parse: {}", e)))?;

        Ok(Attestation {
            bytes: buffer,
            verification_id,
            signed_at,
            signature_drawn: drawn,
        })
    }
}

fn signature_text(signature: &SignaturePayload, y: f64) -> String {
    let text = signature.literal_text();
    let text = if text.is_empty() {
        "(no signature text)".to_string()
    } else {
        text
    };
    text_op("F1", 14.0, MARGIN, y + SIGNATURE_BOX.1 / 2.0, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::fixtures::png_data_uri;
    use crate::validator::{PdfValidator, Validation};

    fn page_text(bytes: &[u8]) -> String {
        let doc = Document::load_mem(bytes).unwrap();
        let (_, page_id) = doc.get_pages().into_iter().next().unwrap();
        String::from_utf8_lossy(&doc.get_page_content(page_id).unwrap()).into_owned()
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T08:15:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_attestation_layout() {
        let payload = SignaturePayload::parse(&png_data_uri());
        let request = AttestationRequest {
            document_title: "Contrato.pdf",
            signer_name: "Ana Lima",
            signature: &payload,
        };
        let attestation = FallbackDocumentSynthesizer::new()
            .synthesize_at(&request, fixed_time())
            .unwrap();

        assert_eq!(attestation.signature_drawn, StampKind::Image);
        assert_eq!(
            PdfValidator::new().validate(&attestation.bytes),
            Validation::Processable
        );

        let doc = Document::load_mem(&attestation.bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);

        let text = page_text(&attestation.bytes);
        assert!(text.contains(HEADING));
        assert!(text.contains("(Document: Contrato.pdf)"));
        assert!(text.contains("(Signed by: Ana Lima)"));
        assert!(text.contains("(Signed at: 2024-06-01 08:15:00 UTC)"));
        assert!(text.contains("could not be processed"));
        assert!(text.contains("/Sig0 Do"));
        assert!(text.contains(&format!("(Verification ID: {})", attestation.verification_id)));
    }

    #[test]
    fn test_verification_id_from_timestamp() {
        let at = fixed_time();
        assert_eq!(verification_id(at), format!("VER-{:X}", at.timestamp_millis()));
    }

    #[test]
    fn test_text_signature() {
        let payload = SignaturePayload::parse("A. Lima");
        let request = AttestationRequest {
            document_title: "Policy",
            signer_name: "Ana Lima",
            signature: &payload,
        };
        let attestation = FallbackDocumentSynthesizer::new().synthesize(&request).unwrap();
        assert_eq!(attestation.signature_drawn, StampKind::Text);
        assert!(page_text(&attestation.bytes).contains("(A. Lima) Tj"));
    }

    #[test]
    fn test_undecodable_image_falls_back_to_raw_text() {
        let payload = SignaturePayload::parse("data:image/png;base64,iVBORw0KGgo=");
        let request = AttestationRequest {
            document_title: "Policy",
            signer_name: "Ana Lima",
            signature: &payload,
        };
        let attestation = FallbackDocumentSynthesizer::new().synthesize(&request).unwrap();
        assert_eq!(attestation.signature_drawn, StampKind::Text);
        assert!(page_text(&attestation.bytes).contains("(data:image/png;base64,iVBORw0KGgo=) Tj"));
    }

    #[test]
    fn test_accented_names_survive() {
        let payload = SignaturePayload::parse("José");
        let request = AttestationRequest {
            document_title: "Año fiscal",
            signer_name: "José Núñez",
            signature: &payload,
        };
        let attestation = FallbackDocumentSynthesizer::new().synthesize(&request).unwrap();
        let text = page_text(&attestation.bytes);
        assert!(text.contains("Jos\\351 N\\372\\361ez"));
    }
}
