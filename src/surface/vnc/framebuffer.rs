use crate::surface::vnc::protocol::{PixelFormat, Rect, RectBody};

/// Client-side copy of the remote framebuffer, stored in the negotiated
/// wire format and normalised to RGBA on demand.
#[derive(Debug, Clone)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Framebuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self { width, height, format, data: vec![0; len] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        tracing::info!(width, height, "remote desktop resized");
        *self = Self::new(width, height, self.format);
    }

    /// Apply one decoded rectangle. Rectangles reaching past the edge are clipped.
    pub fn apply(&mut self, rect: &Rect) {
        match &rect.body {
            RectBody::DesktopSize => self.resize(u32::from(rect.width), u32::from(rect.height)),
            RectBody::Raw(pixels) => self.blit(rect, pixels),
            RectBody::CopyRect { src_x, src_y } => self.copy_rect(rect, *src_x, *src_y),
        }
    }

    fn clipped(&self, x: u16, y: u16, w: u16, h: u16) -> (usize, usize) {
        let cols = u32::from(w).min(self.width.saturating_sub(u32::from(x)));
        let rows = u32::from(h).min(self.height.saturating_sub(u32::from(y)));
        (cols as usize, rows as usize)
    }

    fn offset(&self, x: usize, y: usize) -> usize {
        (y * self.width as usize + x) * self.format.bytes_per_pixel()
    }

    fn blit(&mut self, rect: &Rect, pixels: &[u8]) {
        let bpp = self.format.bytes_per_pixel();
        let src_stride = usize::from(rect.width) * bpp;
        let (cols, rows) = self.clipped(rect.x, rect.y, rect.width, rect.height);
        for row in 0..rows {
            let src = row * src_stride;
            let Some(line) = pixels.get(src..src + cols * bpp) else {
                break;
            };
            let dst = self.offset(usize::from(rect.x), usize::from(rect.y) + row);
            self.data[dst..dst + cols * bpp].copy_from_slice(line);
        }
    }

    fn copy_rect(&mut self, rect: &Rect, src_x: u16, src_y: u16) {
        let bpp = self.format.bytes_per_pixel();
        let (dst_cols, dst_rows) = self.clipped(rect.x, rect.y, rect.width, rect.height);
        let (src_cols, src_rows) = self.clipped(src_x, src_y, rect.width, rect.height);
        let cols = dst_cols.min(src_cols);
        let rows = dst_rows.min(src_rows);
        if cols == 0 || rows == 0 {
            return;
        }
        // Source and destination may overlap; stage the rows first.
        let mut staged = Vec::with_capacity(cols * rows * bpp);
        for row in 0..rows {
            let src = self.offset(usize::from(src_x), usize::from(src_y) + row);
            staged.extend_from_slice(&self.data[src..src + cols * bpp]);
        }
        for (row, line) in staged.chunks_exact(cols * bpp).enumerate() {
            let dst = self.offset(usize::from(rect.x), usize::from(rect.y) + row);
            self.data[dst..dst + cols * bpp].copy_from_slice(line);
        }
    }

    pub fn to_rgba(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 4);
        for px in self.data.chunks_exact(self.format.bytes_per_pixel()) {
            out.extend_from_slice(&self.format.to_rgba(px));
        }
        out
    }
}
