use serde::{Deserialize, Serialize};

/// Pixel payload of a captured frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePixels {
    /// Canonical RGBA, row-major, `source_width * source_height * 4` bytes.
    Rgba {
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
    /// An already-encoded image (PNG from `screencap`).
    Encoded(Vec<u8>),
}

/// One capture of the remote surface.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: FramePixels,
    /// Resolution the agent reasons in; the compositor resizes to this.
    pub logical_width: u32,
    pub logical_height: u32,
    /// Last injected pointer/touch position in logical coordinates.
    pub indicator: Option<(u32, u32)>,
}

/// Marker drawn at the last input position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorStyle {
    pub diameter: u32,
    pub fill: [u8; 4],
    pub outline: [u8; 4],
    pub outline_width: u32,
}

impl IndicatorStyle {
    /// Opaque 12px red cursor dot.
    pub fn cursor() -> Self {
        Self {
            diameter: 12,
            fill: [255, 0, 0, 255],
            outline: [255, 255, 255, 255],
            outline_width: 2,
        }
    }

    /// Larger, translucent touch marker.
    pub fn touch() -> Self {
        Self {
            diameter: 20,
            fill: [255, 0, 0, 178],
            outline: [255, 255, 255, 255],
            outline_width: 2,
        }
    }
}

/// PNG ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}
