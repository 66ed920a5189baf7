//! Content stream text encoding and page resource plumbing

use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};

use crate::error::SigningError;
use crate::parser::PdfDocument;

/// Encode text for a PDF literal string (without the surrounding parentheses).
///
/// Output targets WinAnsiEncoding: Latin-1 characters become octal escapes,
/// anything outside that range is replaced with `?`.
pub fn encode_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' | '\t' => out.push(' '),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c if ('\u{a0}'..='\u{ff}').contains(&c) => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}

/// Format a coordinate without trailing zeros
pub fn num(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// `BT … ET` block drawing one line of text
pub fn text_op(font: &str, size: f64, x: f64, y: f64, text: &str) -> String {
    format!(
        "BT\n/{} {} Tf\n{} {} Td\n({}) Tj\nET\n",
        font,
        num(size),
        num(x),
        num(y),
        encode_text(text)
    )
}

/// Paint an image XObject into a `width` x `height` box at (x, y)
pub fn image_op(name: &str, x: f64, y: f64, width: f64, height: f64) -> String {
    format!(
        "q\n{} 0 0 {} {} {} cm\n/{} Do\nQ\n",
        num(width),
        num(height),
        num(x),
        num(y),
        name
    )
}

/// Standard 14 Helvetica with WinAnsi encoding
pub fn helvetica(bold: bool) -> Dictionary {
    let base_font = if bold { "Helvetica-Bold" } else { "Helvetica" };
    dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base_font,
        "Encoding" => "WinAnsiEncoding",
    }
}

/// Truncate to at most `max` characters, marking the cut with "..."
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Greedy word wrap on character count
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > max_chars && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Register `value` under a fresh name in the page's `/Resources/<category>`.
///
/// The page's effective resources (possibly inherited or indirect) are copied
/// onto the page first, so sibling pages sharing a resource dictionary are untouched.
pub fn add_page_resource(
    pdf: &mut PdfDocument,
    page_id: ObjectId,
    category: &str,
    prefix: &str,
    value: Object,
) -> Result<String, SigningError> {
    let mut resources = pdf
        .inherited_attribute(page_id, b"Resources")
        .and_then(|obj| pdf.resolve_dict(&obj))
        .unwrap_or_else(Dictionary::new);

    let mut entries = resources
        .get(category.as_bytes())
        .ok()
        .and_then(|obj| pdf.resolve_dict(obj))
        .unwrap_or_else(Dictionary::new);

    let mut counter = 0usize;
    let name = loop {
        let candidate = format!("{}{}", prefix, counter);
        if !entries.has(candidate.as_bytes()) {
            break candidate;
        }
        counter += 1;
    };

    entries.set(name.clone(), value);
    resources.set(category, Object::Dictionary(entries));

    page_dict_mut(pdf, page_id)?.set("Resources", Object::Dictionary(resources));
    Ok(name)
}

/// Append a content stream to the page, isolating the existing graphics state
pub fn append_page_content(
    pdf: &mut PdfDocument,
    page_id: ObjectId,
    content: Vec<u8>,
) -> Result<(), SigningError> {
    let existing = pdf
        .doc()
        .get_object(page_id)?
        .as_dict()
        .map_err(|_| SigningError::Operation("Page is not a dictionary".into()))?
        .get(b"Contents")
        .ok()
        .cloned();

    let mut streams = match existing {
        None => Vec::new(),
        Some(Object::Reference(id)) => match pdf.doc().get_object(id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(id)],
        },
        Some(Object::Array(items)) => items,
        Some(_) => {
            return Err(SigningError::Operation(
                "Page Contents is neither a stream reference nor an array".into(),
            ))
        }
    };

    let content = if streams.is_empty() {
        content
    } else {
        let save_id = pdf
            .doc_mut()
            .add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
        streams.insert(0, Object::Reference(save_id));
        [b"\nQ\n".to_vec(), content].concat()
    };

    let stamp_id = pdf
        .doc_mut()
        .add_object(Stream::new(Dictionary::new(), content));
    streams.push(Object::Reference(stamp_id));

    page_dict_mut(pdf, page_id)?.set("Contents", Object::Array(streams));
    Ok(())
}

fn page_dict_mut(pdf: &mut PdfDocument, page_id: ObjectId) -> Result<&mut Dictionary, SigningError> {
    pdf.doc_mut()
        .get_object_mut(page_id)?
        .as_dict_mut()
        .map_err(|_| SigningError::Operation("Page is not a dictionary".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::fixtures::simple_pdf;
    use crate::parser::ParseMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_encode_text_escapes_delimiters() {
        assert_eq!(encode_text("a(b)c\\"), "a\\(b\\)c\\\\");
    }

    #[test]
    fn test_encode_text_latin1_as_octal() {
        assert_eq!(encode_text("José"), "Jos\\351");
        assert_eq!(encode_text("名前"), "??");
    }

    #[test]
    fn test_num_trims_zeros() {
        assert_eq!(num(428.4), "428.4");
        assert_eq!(num(60.0), "60");
        assert_eq!(num(0.0), "0");
        assert_eq!(num(-0.001), "0");
        assert_eq!(num(-0.004), "0");
        assert_eq!(num(-12.5), "-12.5");
    }

    #[test]
    fn test_wrap_respects_width() {
        let lines = wrap("the quick brown fox jumps over the lazy dog", 10);
        assert!(lines.iter().all(|l| l.chars().count() <= 10));
        assert_eq!(lines.join(" "), "the quick brown fox jumps over the lazy dog");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_add_page_resource_keeps_inherited_entries() {
        let mut pdf = PdfDocument::parse(&simple_pdf(1), ParseMode::Strict).unwrap();
        let (_, page_id) = pdf.last_page().unwrap();

        let name = add_page_resource(
            &mut pdf,
            page_id,
            "Font",
            "F",
            Object::Dictionary(helvetica(false)),
        )
        .unwrap();
        // F1 is inherited from the page tree, so F0 is free but F1 must be kept
        assert_eq!(name, "F0");

        let resources = pdf
            .inherited_attribute(page_id, b"Resources")
            .and_then(|obj| pdf.resolve_dict(&obj))
            .unwrap();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
        assert!(fonts.has(b"F0"));
        assert!(fonts.has(b"F1"));
    }

    #[test]
    fn test_append_page_content_wraps_existing() {
        let mut pdf = PdfDocument::parse(&simple_pdf(1), ParseMode::Strict).unwrap();
        let (_, page_id) = pdf.last_page().unwrap();
        append_page_content(&mut pdf, page_id, b"0 0 m 1 1 l S\n".to_vec()).unwrap();

        let contents = pdf
            .doc()
            .get_object(page_id)
            .unwrap()
            .as_dict()
            .unwrap()
            .get(b"Contents")
            .unwrap()
            .as_array()
            .unwrap()
            .clone();
        assert_eq!(contents.len(), 3);

        let merged = pdf.doc().get_page_content(page_id).unwrap();
        let text = String::from_utf8_lossy(&merged);
        assert!(text.starts_with("q"));
        assert!(text.contains("Q\n0 0 m 1 1 l S"));
    }
}
