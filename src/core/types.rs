// Shared data types for pages, text blocks and cache records

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Corner of a block's bounding quadrilateral, in image pixel space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    pub x: i32,
    pub y: i32,
}

impl Vertex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Display palette for block outlines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockColor {
    Red,
    Green,
    Blue,
    Yellow,
    Violet,
    Cyan,
}

impl BlockColor {
    pub const PALETTE: [BlockColor; 6] = [
        BlockColor::Red,
        BlockColor::Green,
        BlockColor::Blue,
        BlockColor::Yellow,
        BlockColor::Violet,
        BlockColor::Cyan,
    ];

    pub fn for_ordinal(ordinal: usize) -> Self {
        Self::PALETTE[ordinal % Self::PALETTE.len()]
    }

    /// Opaque RGBA value; renderers lower alpha for the fill
    pub fn rgba(&self) -> [u8; 4] {
        match self {
            BlockColor::Red => [255, 0, 0, 255],
            BlockColor::Green => [0, 255, 0, 255],
            BlockColor::Blue => [0, 0, 255, 255],
            BlockColor::Yellow => [255, 255, 0, 255],
            BlockColor::Violet => [255, 0, 255, 255],
            BlockColor::Cyan => [0, 255, 255, 255],
        }
    }
}

/// Raw detector output for one text region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedText {
    pub text: String,
    pub vertices: [Vertex; 4],
}

/// One detected text region.
///
/// `ordinal` and `color` are fixed at detection time. Translation only ever
/// replaces `translated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub ordinal: usize,
    pub text: String,
    #[serde(default)]
    pub translated: String,
    pub vertices: [Vertex; 4],
    pub color: BlockColor,
}

impl TextBlock {
    pub fn from_detection(ordinal: usize, detected: DetectedText) -> Self {
        Self {
            ordinal,
            text: detected.text,
            translated: String::new(),
            vertices: detected.vertices,
            color: BlockColor::for_ordinal(ordinal),
        }
    }

    /// Axis-aligned width/height of the quadrilateral
    pub fn size(&self) -> (i32, i32) {
        let xs = self.vertices.iter().map(|v| v.x);
        let ys = self.vertices.iter().map(|v| v.y);
        let width = xs.clone().max().unwrap_or(0) - xs.min().unwrap_or(0);
        let height = ys.clone().max().unwrap_or(0) - ys.min().unwrap_or(0);
        (width, height)
    }
}

/// One persisted (fingerprint, service) -> blocks association
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub fingerprint: String,
    pub service: String,
    pub blocks: Vec<TextBlock>,
}

/// Pixel dimensions of a page image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Image data for one page
#[derive(Clone)]
pub struct PageImage {
    /// Where the image came from (path or URL), for logging
    pub source: String,
    /// Content fingerprint over the raw encoded bytes
    pub fingerprint: String,
    /// Encoded bytes sent to the detector (downscaled if the original was too large)
    pub image_bytes: Arc<Vec<u8>>,
    pub dimensions: Dimensions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_cycles_by_ordinal() {
        assert_eq!(BlockColor::for_ordinal(0), BlockColor::Red);
        assert_eq!(BlockColor::for_ordinal(5), BlockColor::Cyan);
        assert_eq!(BlockColor::for_ordinal(6), BlockColor::Red);
        assert_eq!(BlockColor::for_ordinal(8), BlockColor::Blue);
    }

    #[test]
    fn test_block_size() {
        let block = TextBlock::from_detection(
            0,
            DetectedText {
                text: "テスト".to_string(),
                vertices: [
                    Vertex::new(10, 20),
                    Vertex::new(50, 20),
                    Vertex::new(50, 80),
                    Vertex::new(10, 80),
                ],
            },
        );
        assert_eq!(block.size(), (40, 60));
        assert!(block.translated.is_empty());
    }
}
