//! Source image validation and model classification.

use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::debug;

use sf_core::{ModelChoice, SkinModel};

/// Accepted byte-size bounds for a skin texture.
pub const MIN_IMAGE_BYTES: usize = 100;
pub const MAX_IMAGE_BYTES: usize = 20 * 1024;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Slim-arm probe region: the outer columns of the right-arm texture,
/// transparent on thin-arm skins and painted on full-arm ones.
const SLIM_PROBE_X: std::ops::Range<u32> = 50..54;
const SLIM_PROBE_Y: std::ops::Range<u32> = 16..20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is too small ({size} bytes, minimum {MIN_IMAGE_BYTES})")]
    TooSmall { size: usize },

    #[error("image is too large ({size} bytes, maximum {MAX_IMAGE_BYTES})")]
    TooLarge { size: usize },

    #[error("image is not a PNG")]
    NotPng,

    #[error("image dimensions {width}x{height} are not 64x64 or 64x32")]
    BadDimensions { width: u32, height: u32 },

    #[error("failed to decode PNG: {0}")]
    Decode(String),
}

/// A validated skin texture with its resolved model and content hash.
#[derive(Debug, Clone)]
pub struct ValidatedImage {
    pub width: u32,
    pub height: u32,
    pub model: SkinModel,
    /// SHA-1 of the raw bytes, hex encoded.
    pub hash: String,
}

/// SHA-1 content hash of raw image bytes, hex encoded.
pub fn texture_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Validate raw bytes as a skin texture: size bounds, exact PNG type,
/// 64x64 or 64x32 dimensions. When the requested model is unknown it is
/// classified from the alpha channel of the slim-arm region (only
/// possible on 64x64; 64x32 images are always classic).
pub fn validate(bytes: &[u8], requested: ModelChoice) -> Result<ValidatedImage, ImageError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ImageError::TooSmall { size: bytes.len() });
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge { size: bytes.len() });
    }
    if !bytes.starts_with(&PNG_SIGNATURE) {
        return Err(ImageError::NotPng);
    }

    let mut decoder = png::Decoder::new(std::io::Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let mut buf = vec![0u8; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let (width, height) = (info.width, info.height);
    if !(width == 64 && (height == 64 || height == 32)) {
        return Err(ImageError::BadDimensions { width, height });
    }

    let model = match requested.resolved() {
        Some(model) => model,
        None => classify(&buf, width, height, reader.output_color_type().0),
    };
    debug!(width, height, ?model, "validated skin image");

    Ok(ValidatedImage {
        width,
        height,
        model,
        hash: texture_hash(bytes),
    })
}

fn classify(buf: &[u8], width: u32, height: u32, color: png::ColorType) -> SkinModel {
    // legacy 64x32 layout predates slim arms
    if height != 64 {
        return SkinModel::Classic;
    }
    let samples = color.samples();
    let has_alpha = matches!(
        color,
        png::ColorType::Rgba | png::ColorType::GrayscaleAlpha
    );
    if !has_alpha {
        return SkinModel::Classic;
    }

    for y in SLIM_PROBE_Y {
        for x in SLIM_PROBE_X {
            let idx = ((y * width + x) as usize) * samples + (samples - 1);
            if buf.get(idx).copied().unwrap_or(0) != 0 {
                return SkinModel::Classic;
            }
        }
    }
    SkinModel::Slim
}
