//! Signature image embedding
//!
//! Supports:
//! - PNG (decoded to 8-bit samples, alpha split into an /SMask, FlateDecode)
//! - JPEG (DCTDecode, passed through without re-encoding)

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use crate::error::SigningError;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// An image XObject added to a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedImage {
    pub id: ObjectId,
    pub width: u32,
    pub height: u32,
}

/// Decoded raster with color and alpha planes separated
struct Raster {
    width: u32,
    height: u32,
    color_space: &'static str,
    pixels: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

/// Add an image XObject for the given PNG or JPEG bytes
pub fn embed_image(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage, SigningError> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        embed_png(doc, bytes)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        embed_jpeg(doc, bytes)
    } else {
        Err(SigningError::Image("unsupported image format".into()))
    }
}

fn embed_png(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage, SigningError> {
    let raster = decode_png(bytes)?;

    let smask = match &raster.alpha {
        Some(alpha) => {
            let mask = Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => raster.width as i64,
                    "Height" => raster.height as i64,
                    "ColorSpace" => "DeviceGray",
                    "BitsPerComponent" => 8,
                    "Filter" => "FlateDecode",
                },
                deflate(alpha)?,
            );
            Some(doc.add_object(mask))
        }
        None => None,
    };

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => raster.width as i64,
        "Height" => raster.height as i64,
        "ColorSpace" => raster.color_space,
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };
    if let Some(mask_id) = smask {
        dict.set("SMask", Object::Reference(mask_id));
    }

    let id = doc.add_object(Stream::new(dict, deflate(&raster.pixels)?));
    Ok(EmbeddedImage {
        id,
        width: raster.width,
        height: raster.height,
    })
}

fn decode_png(bytes: &[u8]) -> Result<Raster, SigningError> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| SigningError::Image(format!("PNG header: {}", e)))?;

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| SigningError::Image(format!("PNG data: {}", e)))?;
    buf.truncate(info.buffer_size());

    if info.bit_depth != png::BitDepth::Eight {
        return Err(SigningError::Image(format!(
            "unsupported PNG bit depth {:?}",
            info.bit_depth
        )));
    }
    if info.width == 0 || info.height == 0 {
        return Err(SigningError::Image("PNG has zero area".into()));
    }

    let (color_space, channels, has_alpha) = match info.color_type {
        png::ColorType::Grayscale => ("DeviceGray", 1usize, false),
        png::ColorType::GrayscaleAlpha => ("DeviceGray", 1, true),
        png::ColorType::Rgb => ("DeviceRGB", 3, false),
        png::ColorType::Rgba => ("DeviceRGB", 3, true),
        png::ColorType::Indexed => {
            return Err(SigningError::Image("indexed PNG was not expanded".into()))
        }
    };

    if !has_alpha {
        return Ok(Raster {
            width: info.width,
            height: info.height,
            color_space,
            pixels: buf,
            alpha: None,
        });
    }

    let stride = channels + 1;
    let pixel_count = buf.len() / stride;
    let mut pixels = Vec::with_capacity(pixel_count * channels);
    let mut alpha = Vec::with_capacity(pixel_count);
    for chunk in buf.chunks_exact(stride) {
        pixels.extend_from_slice(&chunk[..channels]);
        alpha.push(chunk[channels]);
    }

    Ok(Raster {
        width: info.width,
        height: info.height,
        color_space,
        pixels,
        alpha: Some(alpha),
    })
}

fn embed_jpeg(doc: &mut Document, bytes: &[u8]) -> Result<EmbeddedImage, SigningError> {
    let (width, height, components) = jpeg_dimensions(bytes)?;
    let color_space = match components {
        1 => "DeviceGray",
        3 => "DeviceRGB",
        4 => "DeviceCMYK",
        n => {
            return Err(SigningError::Image(format!(
                "unsupported JPEG component count {}",
                n
            )))
        }
    };

    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => color_space,
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    let id = doc.add_object(Stream::new(dict, bytes.to_vec()));
    Ok(EmbeddedImage { id, width, height })
}

/// Width, height and component count from the first SOF marker
fn jpeg_dimensions(bytes: &[u8]) -> Result<(u32, u32, u8), SigningError> {
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return Err(SigningError::Image("corrupt JPEG marker stream".into()));
        }
        let marker = bytes[pos + 1];
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let segment = bytes
                .get(pos + 4..pos + 2 + length)
                .filter(|s| s.len() >= 6)
                .ok_or_else(|| SigningError::Image("truncated JPEG frame header".into()))?;
            let height = u16::from_be_bytes([segment[1], segment[2]]) as u32;
            let width = u16::from_be_bytes([segment[3], segment[4]]) as u32;
            if width == 0 || height == 0 {
                return Err(SigningError::Image("JPEG has zero area".into()));
            }
            return Ok((width, height, segment[5]));
        }
        pos += 2 + length;
    }
    Err(SigningError::Image("no JPEG frame header found".into()))
}

fn deflate(data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|_| encoder.finish())
        .map_err(|e| SigningError::Image(format!("compression failed: {}", e)))
}

#[cfg(test)]
pub(crate) mod fixtures {
    /// Encode a tiny RGBA PNG
    pub fn png_rgba(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut out, width, height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            let data = vec![0x20u8; (width * height * 4) as usize];
            writer.write_image_data(&data).unwrap();
            writer.finish().unwrap();
        }
        out
    }

    pub fn png_data_uri() -> String {
        use base64::Engine;
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png_rgba(1, 1))
        )
    }
}
