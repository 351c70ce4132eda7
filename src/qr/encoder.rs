//! Fixture QR rendering

use crate::error::{Error, Result};
use image::{DynamicImage, Luma};
use qrcode::{EcLevel, QrCode};

// Below this edge length the decoder starts missing modules.
const MIN_RENDER_SIZE: u32 = 400;

/// Renders payloads as QR images
pub struct QrEncoder {
    ec_level: EcLevel,
}

impl QrEncoder {
    /// Encoder with medium error correction
    pub fn new() -> Self {
        Self {
            ec_level: EcLevel::M,
        }
    }

    /// Render a text payload.
    pub fn encode_string(&self, text: &str) -> Result<DynamicImage> {
        self.encode_bytes(text.as_bytes())
    }

    /// Render a raw byte payload.
    pub fn encode_bytes(&self, data: &[u8]) -> Result<DynamicImage> {
        let code = QrCode::with_error_correction_level(data, self.ec_level)
            .map_err(|e| Error::QrEncode(e.to_string()))?;

        let rendered = code
            .render::<Luma<u8>>()
            .min_dimensions(MIN_RENDER_SIZE, MIN_RENDER_SIZE)
            .build();

        Ok(DynamicImage::ImageLuma8(rendered))
    }
}

impl Default for QrEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_fixture_meets_the_size_floor() {
        let img = QrEncoder::new().encode_string("Hello, fieldscan!").unwrap();
        assert!(img.width() >= MIN_RENDER_SIZE);
        assert!(img.height() >= MIN_RENDER_SIZE);
    }
}
