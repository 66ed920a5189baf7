//! Signature payload decoding
//!
//! Signatures arrive either as an image data URI
//! (`data:image/png;base64,...`) or as literal typed text.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Longest literal rendition drawn when an image cannot be used
pub const MAX_LITERAL_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadKind {
    /// Decoded image bytes from a data URI
    Image { mime: String, bytes: Vec<u8> },
    /// Anything that is not a decodable image data URI
    Text(String),
}

/// A signature as supplied by the caller, decoded once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignaturePayload {
    raw: String,
    kind: PayloadKind,
}

impl SignaturePayload {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let kind = decode_image_data_uri(trimmed)
            .map(|(mime, bytes)| PayloadKind::Image { mime, bytes })
            .unwrap_or_else(|| PayloadKind::Text(trimmed.to_string()));
        Self {
            raw: trimmed.to_string(),
            kind,
        }
    }

    /// True for input that cannot stand in for a signature at all
    pub fn is_trivial(raw: &str) -> bool {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return true;
        }
        if is_data_uri(trimmed) {
            return match trimmed.split_once(',') {
                Some((_, body)) => body.trim().is_empty(),
                None => true,
            };
        }
        false
    }

    pub fn kind(&self) -> &PayloadKind {
        &self.kind
    }

    pub fn image_bytes(&self) -> Option<&[u8]> {
        match &self.kind {
            PayloadKind::Image { bytes, .. } => Some(bytes),
            PayloadKind::Text(_) => None,
        }
    }

    /// What to draw when the payload is rendered as text
    pub fn literal_text(&self) -> String {
        crate::content::truncate_chars(&self.raw, MAX_LITERAL_CHARS)
    }
}

fn is_data_uri(s: &str) -> bool {
    s.get(..5)
        .map(|prefix| prefix.eq_ignore_ascii_case("data:"))
        .unwrap_or(false)
}

fn decode_image_data_uri(s: &str) -> Option<(String, Vec<u8>)> {
    if !is_data_uri(s) {
        return None;
    }
    let (header, body) = s[5..].split_once(',')?;
    let mut params = header.split(';');
    let mime = params.next()?.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return None;
    }
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return None;
    }
    let compact: String = body.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64.decode(compact).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some((mime, bytes))
}
