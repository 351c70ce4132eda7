//! Rendering of scan and heading output for the CLI

use crate::capture::DetectionResult;
use crate::heading::HeadingDisplay;
use crate::qr::DecodedSymbol;
use hex::encode as hex_encode;
use serde_json::{Value, json};

/// Combined structured and human-readable representation of a report
#[derive(Debug, Clone)]
pub struct RenderedReport {
    /// Structured JSON representation suitable for downstream consumers
    pub json: Value,
    /// Human-readable lines for terminal presentation
    pub human: Vec<String>,
}

/// Render a heading display update.
pub fn render_heading(display: &HeadingDisplay) -> RenderedReport {
    let json = json!({
        "strength": display.strength,
        "strength_ratio": display.strength_ratio,
        "x": display.x,
        "y": display.y,
        "z": display.z,
    });

    let human = vec![
        format!("Field strength: {:.3}", display.strength),
        format!("  Level: {:.1}%", display.strength_ratio * 100.0),
        format!("  X: {}  Y: {}  Z: {}", display.x, display.y, display.z),
    ];

    RenderedReport { json, human }
}

/// Render the result of a completed capture session.
pub fn render_detection(result: &DetectionResult) -> RenderedReport {
    let image = result.image.as_ref().map(|img| {
        json!({
            "width": img.width(),
            "height": img.height(),
        })
    });

    let json = json!({
        "code": result.code,
        "image": image,
    });

    let mut human = vec![
        "QR code detected".to_string(),
        format!("  Code: {}", result.code),
    ];
    if let Some(img) = &result.image {
        human.push(format!("  Still image: {}x{}", img.width(), img.height()));
    }

    RenderedReport { json, human }
}

/// Render a raw decoded symbol (scan-once mode).
pub fn render_symbol(symbol: &DecodedSymbol) -> RenderedReport {
    let json = json!({
        "text": symbol.as_str(),
        "bytes_hex": hex_encode(symbol.as_bytes()),
        "byte_length": symbol.as_bytes().len(),
    });

    let human = match symbol.as_str() {
        Some(text) => vec![format!("QR text: {text}")],
        None => vec![format!(
            "QR binary payload: {}",
            format_hex_snippet(symbol.as_bytes())
        )],
    };

    RenderedReport { json, human }
}

fn format_hex_snippet(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "empty".to_string();
    }

    let hex = hex_encode(bytes);
    const MAX: usize = 64;
    if hex.len() > MAX {
        format!("{}... ({} bytes)", &hex[..MAX], bytes.len())
    } else {
        format!("{} ({} bytes)", hex, bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heading::HeadingSample;

    #[test]
    fn renders_heading_consistently() {
        let display = HeadingSample::new(3.0, 4.0, 0.0).display();
        let rendered = render_heading(&display);

        assert_eq!(rendered.json["strength"], 5.0);
        assert_eq!(rendered.json["strength_ratio"], 0.005);
        assert!(
            rendered
                .human
                .iter()
                .any(|line| line.contains("Field strength: 5.000"))
        );
    }

    #[test]
    fn renders_detection_without_image() {
        let result = DetectionResult {
            code: "hello".to_string(),
            image: None,
        };
        let rendered = render_detection(&result);

        assert_eq!(rendered.json["code"], "hello");
        assert!(rendered.json["image"].is_null());
        assert!(!rendered.human.iter().any(|line| line.contains("Still")));
    }

    #[test]
    fn renders_binary_symbol_as_hex() {
        let symbol = DecodedSymbol::from_bytes(vec![0xDE, 0xAD]);
        let rendered = render_symbol(&symbol);

        assert_eq!(rendered.json["bytes_hex"], "dead");
        assert!(rendered.human[0].contains("dead (2 bytes)"));
    }
}
