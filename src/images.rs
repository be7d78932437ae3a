//! Picture sniffing and JPEG normalisation.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};
use tracing::debug;

use crate::constants::JPEG_QUALITY;
use crate::error::BotError;

/// What a blob of bytes claims to be, judged by its signature.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    /// JPEG, stored as-is
    Jpeg,
    /// PNG, transcoded to JPEG
    Png,
    /// Anything else. Holds the detected format when there was one.
    Unsupported(Option<ImageFormat>),
}

impl ImageKind {
    /// Classifies bytes by their leading signature.
    pub fn sniff(bytes: &[u8]) -> Self {
        if bytes.len() < 4 {
            return Self::Unsupported(None);
        }
        match image::guess_format(bytes) {
            Ok(ImageFormat::Jpeg) => Self::Jpeg,
            Ok(ImageFormat::Png) => Self::Png,
            Ok(other) => Self::Unsupported(Some(other)),
            Err(_) => Self::Unsupported(None),
        }
    }
}

impl std::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jpeg => write!(f, "JPEG"),
            Self::Png => write!(f, "PNG"),
            Self::Unsupported(Some(format)) => write!(f, "{format:?}"),
            Self::Unsupported(None) => write!(f, "unknown"),
        }
    }
}

/// A picture guaranteed to be JPEG encoded.
#[derive(Clone, Debug)]
pub struct NormalizedImage {
    /// What the input was before normalisation
    pub source: ImageKind,
    /// JPEG bytes
    pub bytes: Vec<u8>,
}

/// Ensures image bytes are a valid JPEG, converting PNG.
pub fn normalize_to_jpeg(bytes: &[u8]) -> Result<NormalizedImage, BotError> {
    let source = ImageKind::sniff(bytes);
    let format = match source {
        ImageKind::Jpeg => ImageFormat::Jpeg,
        ImageKind::Png => ImageFormat::Png,
        ImageKind::Unsupported(_) => {
            debug!("Rejecting {} image", source);
            return Err(BotError::UnsupportedFormat(source));
        }
    };

    let image = image::load_from_memory_with_format(bytes, format).map_err(|err| {
        debug!("Failed to decode {} image: {}", source, err);
        BotError::UnsupportedFormat(source)
    })?;

    if source == ImageKind::Jpeg {
        return Ok(NormalizedImage {
            source,
            bytes: bytes.to_vec(),
        });
    }

    Ok(NormalizedImage {
        source,
        bytes: encode_jpeg(&image.to_rgb8())?,
    })
}

/// Encodes an RGB buffer as JPEG.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, BotError> {
    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
    encoder.encode_image(image)?;
    Ok(output)
}
