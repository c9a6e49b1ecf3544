use std::fs;
use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageOutputFormat;

use crate::error::{Result, SentinelError};

/// Reads an image file and returns its Base64 payload.
///
/// The file is read in one call, so no handle outlives this function. With
/// `normalize` set the bytes are decoded and re-encoded as PNG first.
pub fn encode_image_file(path: &Path, normalize: bool) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| SentinelError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;

    if normalize {
        let png = normalize_to_png(&bytes).map_err(|source| SentinelError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(encode_base64(&png));
    }

    Ok(encode_base64(&bytes))
}

/// Standard padded Base64, the encoding the generate API expects.
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decodes any supported image format and re-encodes it as PNG.
pub fn normalize_to_png(bytes: &[u8]) -> std::result::Result<Vec<u8>, image::ImageError> {
    let image = image::load_from_memory(bytes)?;
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)?;
    Ok(buffer)
}
