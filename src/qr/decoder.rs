//! Frame-to-symbol decoding via `rqrr`

use crate::error::{Error, Result};
use crate::qr::DecodedSymbol;
use image::DynamicImage;

/// Decodes the first readable QR symbol out of a frame
#[derive(Debug, Default)]
pub struct QrDecoder;

impl QrDecoder {
    /// Decoder with default detection settings
    pub fn new() -> Self {
        Self
    }

    /// Find and decode one symbol in `frame`.
    ///
    /// When a frame holds several symbols, the first readable one wins.
    pub fn decode(&self, frame: &DynamicImage) -> Result<DecodedSymbol> {
        let mut prepared = rqrr::PreparedImage::prepare(frame.to_luma8());
        let grids = prepared.detect_grids();

        if grids.is_empty() {
            return Err(Error::NoQrCodeFound);
        }

        let mut last_failure = None;
        for grid in &grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    tracing::debug!(
                        version = ?meta.version,
                        ecc_level = meta.ecc_level,
                        bytes = content.len(),
                        "Decoded QR symbol"
                    );
                    return Ok(DecodedSymbol::from_string(content));
                }
                Err(err) => last_failure = Some(err),
            }
        }

        Err(Error::QrDecode(format!(
            "{} grid(s) detected, none readable: {:?}",
            grids.len(),
            last_failure
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qr::QrEncoder;

    #[test]
    fn decodes_what_the_encoder_produced() {
        let img = QrEncoder::new()
            .encode_string("fieldscan test payload")
            .unwrap();
        let symbol = QrDecoder::new().decode(&img).unwrap();

        assert_eq!(symbol.as_str(), Some("fieldscan test payload"));
    }

    #[test]
    fn blank_frame_reports_no_code() {
        let blank = DynamicImage::new_luma8(320, 240);
        assert!(matches!(
            QrDecoder::new().decode(&blank),
            Err(Error::NoQrCodeFound)
        ));
    }
}
