//! PDF parsing and page inspection using lopdf

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;

use crate::error::SigningError;

/// Deepest `/Parent` chain followed when resolving inherited page attributes
const MAX_INHERITANCE_DEPTH: usize = 32;

/// US Letter, used when a page tree carries no usable MediaBox
const DEFAULT_MEDIA_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

/// How tolerant the reader is with the incoming file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    /// Plain parse; encrypted files are rejected
    Strict,
    /// Encrypted files are opened with the empty user password
    IgnoreEncryption,
}

/// Wrapper around lopdf::Document with the page helpers the stamper needs
pub struct PdfDocument {
    doc: Document,
    was_encrypted: bool,
}

impl PdfDocument {
    /// Parse raw bytes under the given mode.
    ///
    /// A document only counts as parsed when it has at least one page.
    pub fn parse(bytes: &[u8], mode: ParseMode) -> Result<Self, SigningError> {
        let mut doc = Document::load_mem(bytes).map_err(|e| SigningError::Parse(e.to_string()))?;

        let was_encrypted = doc.trailer.has(b"Encrypt");
        if was_encrypted {
            match mode {
                ParseMode::Strict => return Err(SigningError::Encrypted),
                ParseMode::IgnoreEncryption => {
                    doc.decrypt("").map_err(|e| {
                        SigningError::Parse(format!("empty-password decryption failed: {}", e))
                    })?;
                    // Objects are plaintext now, the handler must not survive the rewrite
                    doc.trailer.remove(b"Encrypt");
                }
            }
        }

        if doc.get_pages().is_empty() {
            return Err(SigningError::MissingPage);
        }

        Ok(Self { doc, was_encrypted })
    }

    /// Whether the source carried an `/Encrypt` dictionary
    pub fn was_encrypted(&self) -> bool {
        self.was_encrypted
    }

    /// Get the number of pages
    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    /// Page number (1-indexed) and object id of the last page
    pub fn last_page(&self) -> Result<(u32, ObjectId), SigningError> {
        self.doc
            .get_pages()
            .into_iter()
            .next_back()
            .ok_or(SigningError::MissingPage)
    }

    /// Page box as [x, y, width, height], following `/Parent` inheritance
    pub fn page_box(&self, page_id: ObjectId) -> [f64; 4] {
        self.inherited_attribute(page_id, b"MediaBox")
            .and_then(|obj| self.parse_rect(&obj).ok())
            .filter(|rect| rect[2] > 0.0 && rect[3] > 0.0)
            .unwrap_or(DEFAULT_MEDIA_BOX)
    }

    /// Look up a page attribute, walking up the page tree when the page itself lacks it
    pub fn inherited_attribute(&self, page_id: ObjectId, key: &[u8]) -> Option<Object> {
        let mut current = page_id;
        for _ in 0..MAX_INHERITANCE_DEPTH {
            let dict = self.doc.get_object(current).ok()?.as_dict().ok()?;
            if let Ok(value) = dict.get(key) {
                return Some(value.clone());
            }
            current = dict.get(b"Parent").ok()?.as_reference().ok()?;
        }
        None
    }

    /// Resolve a possibly indirect dictionary into an owned copy
    pub fn resolve_dict(&self, obj: &Object) -> Option<Dictionary> {
        match obj {
            Object::Dictionary(dict) => Some(dict.clone()),
            Object::Reference(id) => self.doc.get_object(*id).ok()?.as_dict().ok().cloned(),
            _ => None,
        }
    }

    /// Parse a PDF rectangle array into [x, y, width, height]
    fn parse_rect(&self, obj: &Object) -> Result<[f64; 4], SigningError> {
        let arr = match obj {
            Object::Array(a) => a,
            Object::Reference(id) => self
                .doc
                .get_object(*id)?
                .as_array()
                .map_err(|_| SigningError::Operation("MediaBox reference is not an array".into()))?,
            _ => return Err(SigningError::Operation("MediaBox is not an array".into())),
        };

        if arr.len() != 4 {
            return Err(SigningError::Operation(format!(
                "MediaBox has {} elements, expected 4",
                arr.len()
            )));
        }

        let mut values = [0.0f64; 4];
        for (i, obj) in arr.iter().enumerate() {
            values[i] = self.extract_number(obj)?;
        }

        let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
        let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
        Ok([x1, y1, x2 - x1, y2 - y1])
    }

    fn extract_number(&self, obj: &Object) -> Result<f64, SigningError> {
        match obj {
            Object::Integer(i) => Ok(*i as f64),
            Object::Real(r) => Ok(*r as f64),
            Object::Reference(id) => self.extract_number(self.doc.get_object(*id)?),
            _ => Err(SigningError::Operation("Expected number in rectangle".into())),
        }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.doc
    }

    /// Serialize the (possibly modified) document
    pub fn save_to_bytes(&mut self) -> Result<Vec<u8>, SigningError> {
        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| SigningError::Save(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::{dictionary, Document, Object, ObjectId, Stream};

    /// Build a simple PDF with `pages` pages of the given size
    pub fn pdf_with_pages(pages: usize, width: i64, height: i64) -> Document {
        let mut doc = Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::new();
        for n in 0..pages {
            let content = format!("BT /F1 12 Tf 72 720 Td (Page {}) Tj ET", n + 1);
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference(pages_id),
                "Contents" => Object::Reference(content_id),
            });
            kids.push(Object::Reference(page_id));
        }
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages as i64,
                "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => dictionary! {
                            "Type" => "Font",
                            "Subtype" => "Type1",
                            "BaseFont" => "Courier",
                        },
                    },
                },
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));
        doc
    }

    pub fn to_bytes(mut doc: Document) -> Vec<u8> {
        let mut buffer = Vec::new();
        doc.save_to(&mut buffer).unwrap();
        buffer
    }

    pub fn simple_pdf(pages: usize) -> Vec<u8> {
        to_bytes(pdf_with_pages(pages, 612, 792))
    }

    /// A well-formed file whose Encrypt dictionary names a handler nobody implements
    pub fn encrypted_pdf() -> Vec<u8> {
        let mut doc = pdf_with_pages(1, 612, 792);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "AcmeVault",
            "V" => 7,
            "R" => 9,
        });
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        doc.trailer.set(
            "ID",
            vec![
                Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
                Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
            ],
        );
        to_bytes(doc)
    }

    /// Standard handler, RC4 40-bit (R2), opening with the empty user password
    pub fn openable_encrypted_pdf() -> Vec<u8> {
        let mut doc = pdf_with_pages(1, 612, 792);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "Length" => 40,
            "O" => Object::String(vec![0x4f; 32], lopdf::StringFormat::Hexadecimal),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", Object::Reference(encrypt_id));
        doc.trailer.set(
            "ID",
            vec![
                Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
                Object::String(b"0123456789abcdef".to_vec(), lopdf::StringFormat::Hexadecimal),
            ],
        );

        let key = lopdf::encryption::get_encryption_key(&doc, "", false).unwrap();
        let ids: Vec<ObjectId> = doc.objects.keys().copied().filter(|id| *id != encrypt_id).collect();
        for id in ids {
            // RC4 is symmetric
            let Ok(sealed) = lopdf::encryption::decrypt_object(&key, id, doc.get_object(id).unwrap()) else {
                continue;
            };
            match doc.get_object_mut(id).unwrap() {
                Object::Stream(stream) => stream.set_content(sealed),
                Object::String(content, _) => *content = sealed,
                _ => {}
            }
        }
        to_bytes(doc)
    }
}
