//! Rendering of submitted documents into artifacts.
//!
//! HTML documents are printed by headless Chromium (see `chromium`);
//! `SvgToPdfConverter` turns SVG into PDF with TRUE vector fidelity via
//! svg2pdf.

use thiserror::Error;
use tracing::info;

/// Why a render attempt produced no artifact.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("document is not valid UTF-8: {0}")]
    Decode(String),

    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("invalid document dimensions: {width}x{height}")]
    InvalidDimensions { width: f32, height: f32 },

    #[error("render exceeded {0}s timeout")]
    Timeout(u64),

    #[error("renderer panicked: {0}")]
    Panicked(String),

    #[error("failed to start render engine: {0}")]
    Spawn(String),

    #[error("render engine failed (exit {exit_code:?}): {stderr}")]
    Engine {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("render I/O error: {0}")]
    Io(String),
}

/// Turns decoded document content into artifact bytes.
///
/// Implementations may be slow; callers run them off the async executor.
pub trait Renderer: Send + Sync {
    fn render(&self, content: &str) -> Result<Vec<u8>, RenderError>;
}

/// Decodes stored origin bytes into renderable text.
pub fn decode_origin(origin: &[u8]) -> Result<&str, RenderError> {
    std::str::from_utf8(origin).map_err(|e| RenderError::Decode(e.to_string()))
}

/// SVG to PDF converter using svg2pdf for true vector fidelity.
///
/// This converter uses the svg2pdf crate which converts SVG to PDF
/// maintaining complete vector graphics (no rasterization).
pub struct SvgToPdfConverter;

impl SvgToPdfConverter {
    /// Creates a new converter with default options.
    pub fn new() -> Self {
        Self
    }
}

impl Default for SvgToPdfConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for SvgToPdfConverter {
    /// Converts SVG content to PDF bytes.
    ///
    /// # Errors
    ///
    /// - SVG parsing errors (malformed XML, unsupported features)
    /// - Zero or negative document dimensions
    fn render(&self, content: &str) -> Result<Vec<u8>, RenderError> {
        let tree = usvg::Tree::from_str(content, &usvg::Options::default())
            .map_err(|e| RenderError::Parse(e.to_string()))?;

        let size = tree.size();
        if size.width() <= 0.0 || size.height() <= 0.0 {
            return Err(RenderError::InvalidDimensions {
                width: size.width(),
                height: size.height(),
            });
        }

        info!(
            "SVG parsed successfully: {}x{} units",
            size.width(),
            size.height()
        );

        let pdf_data = svg2pdf::to_pdf(
            &tree,
            svg2pdf::ConversionOptions::default(),
            svg2pdf::PageOptions::default(),
        );

        info!("PDF render complete (VECTOR): {} bytes", pdf_data.len());
        Ok(pdf_data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_simple_svg() {
        let converter = SvgToPdfConverter::new();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="100" height="100">
            <rect x="10" y="10" width="80" height="80" fill="blue"/>
        </svg>"#;

        let pdf = converter.render(svg).unwrap();
        assert!(pdf.starts_with(b"%PDF"));
    }

    #[test]
    fn test_invalid_svg() {
        let converter = SvgToPdfConverter::new();
        let result = converter.render("not an svg");

        assert!(matches!(result, Err(RenderError::Parse(_))));
    }

    #[test]
    fn test_zero_dimensions() {
        let converter = SvgToPdfConverter::new();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" width="0" height="0"></svg>"#;

        assert!(converter.render(svg).is_err());
    }

    #[test]
    fn test_decode_origin() {
        assert_eq!(decode_origin(b"<svg/>").unwrap(), "<svg/>");
        assert!(matches!(
            decode_origin(&[0xff, 0xfe, 0x00]),
            Err(RenderError::Decode(_))
        ));
    }
}
