//! Draw the last-input indicator onto a captured frame and encode it as PNG.
//!
//! The frame is first brought to the logical resolution (the one the action
//! vocabulary is bounded by), so the image the decision service sees and the
//! coordinates it answers with share one geometry.
use image::imageops::FilterType;
use image::RgbaImage;

use crate::errors::{PilotError, PilotResult};
use crate::perception::types::{EncodedFrame, Frame, FramePixels, IndicatorStyle};

#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    style: IndicatorStyle,
}

impl Compositor {
    pub fn new(style: IndicatorStyle) -> Self {
        Self { style }
    }

    pub fn composite(&self, frame: &Frame) -> PilotResult<EncodedFrame> {
        let mut canvas = to_logical_canvas(frame)?;
        if let Some(pos) = frame.indicator {
            draw_indicator(&mut canvas, pos, &self.style);
        }
        let (width, height) = canvas.dimensions();
        let png = encode_png(canvas)?;
        Ok(EncodedFrame { png, width, height })
    }
}

fn to_logical_canvas(frame: &Frame) -> PilotResult<RgbaImage> {
    let canvas = match &frame.pixels {
        FramePixels::Rgba { width, height, data } => {
            RgbaImage::from_raw(*width, *height, data.clone()).ok_or_else(|| {
                PilotError::Capture(format!(
                    "RGBA buffer of {} bytes does not match {width}x{height}",
                    data.len()
                ))
            })?
        }
        FramePixels::Encoded(bytes) => image::load_from_memory(bytes)?.to_rgba8(),
    };

    let (w, h) = canvas.dimensions();
    let (lw, lh) = (frame.logical_width, frame.logical_height);
    if lw == 0 || lh == 0 || (w == lw && h == lh) {
        return Ok(canvas);
    }
    tracing::trace!(from = %format!("{w}x{h}"), to = %format!("{lw}x{lh}"), "resizing frame");
    Ok(image::imageops::resize(&canvas, lw, lh, FilterType::Triangle))
}

fn encode_png(canvas: RgbaImage) -> PilotResult<Vec<u8>> {
    let mut out = Vec::new();
    image::DynamicImage::ImageRgba8(canvas)
        .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)?;
    Ok(out)
}

/// Top-left corner of the indicator box, clamped so the box stays inside the frame.
pub fn indicator_origin(pos: (u32, u32), diameter: u32, width: u32, height: u32) -> (u32, u32) {
    let half = i64::from(diameter / 2);
    let max_x = i64::from(width.saturating_sub(diameter));
    let max_y = i64::from(height.saturating_sub(diameter));
    let x = (i64::from(pos.0) - half).clamp(0, max_x);
    let y = (i64::from(pos.1) - half).clamp(0, max_y);
    (x as u32, y as u32)
}

fn draw_indicator(canvas: &mut RgbaImage, pos: (u32, u32), style: &IndicatorStyle) {
    let (w, h) = canvas.dimensions();
    let d = style.diameter;
    let (ox, oy) = indicator_origin(pos, d, w, h);

    let centre = d as f32 / 2.0;
    let radius = centre - 1.0;
    let inner = radius - style.outline_width as f32;

    for dy in 0..d {
        for dx in 0..d {
            let (x, y) = (ox + dx, oy + dy);
            if x >= w || y >= h {
                continue;
            }
            let fx = dx as f32 + 0.5 - centre;
            let fy = dy as f32 + 0.5 - centre;
            let dist = (fx * fx + fy * fy).sqrt();
            if dist > radius {
                continue;
            }
            let col = if dist > inner { style.outline } else { style.fill };
            blend_pixel(canvas, x, y, col);
        }
    }
}

fn blend_pixel(canvas: &mut RgbaImage, x: u32, y: u32, col: [u8; 4]) {
    let p = canvas.get_pixel_mut(x, y);
    let a = col[3] as f32 / 255.0;
    p[0] = (p[0] as f32 * (1.0 - a) + col[0] as f32 * a).round() as u8;
    p[1] = (p[1] as f32 * (1.0 - a) + col[1] as f32 * a).round() as u8;
    p[2] = (p[2] as f32 * (1.0 - a) + col[2] as f32 * a).round() as u8;
    p[3] = 255;
}
