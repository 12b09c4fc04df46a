// CPU rendering module
// Software fallback that rasterizes frames into shared-memory ARGB8888 buffers

use crate::config::Color;
use crate::image_loader::DecodedImage;
use crate::render::{Frame, Renderer, TextureId, TextureSlab};
use crate::view::ScreenRect;
use anyhow::{ensure, Result};

/// RGBA texture kept in system memory
struct CpuTexture {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

#[derive(Default)]
pub struct CpuRenderer {
    textures: TextureSlab<CpuTexture>,
}

impl Renderer for CpuRenderer {
    fn upload(&mut self, image: &DecodedImage) -> Result<TextureId> {
        let rgba = image.to_rgba();
        ensure!(
            rgba.len() == image.width as usize * image.height as usize * 4,
            "pixel buffer does not match {}x{}",
            image.width,
            image.height
        );
        Ok(self.textures.insert(CpuTexture {
            width: image.width,
            height: image.height,
            rgba,
        }))
    }

    fn release(&mut self, texture: TextureId) {
        self.textures.remove(texture);
    }
}

/// Pixel span of a screen rectangle clipped to the canvas, by pixel centers
fn span(start: f32, len: f32, limit: u32) -> std::ops::Range<u32> {
    let lo = (start - 0.5).ceil().max(0.0);
    let hi = (start + len - 0.5).ceil().clamp(0.0, limit as f32);
    if hi <= lo {
        return 0..0;
    }
    lo as u32..hi as u32
}

/// Premultiplied ARGB8888 in little-endian byte order
fn bgra(premul: [f32; 4]) -> [u8; 4] {
    let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0).round() as u8;
    [q(premul[2]), q(premul[1]), q(premul[0]), q(premul[3])]
}

impl CpuRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rasterize a frame into `canvas` (`width * height * 4` bytes, ARGB8888)
    pub fn draw(&self, frame: &Frame, canvas: &mut [u8], width: u32, height: u32) {
        let clear = frame.background.map(bgra).unwrap_or([0; 4]);
        for pixel in canvas.chunks_exact_mut(4) {
            pixel.copy_from_slice(&clear);
        }

        for item in &frame.items {
            if frame.border_px > 0.0 {
                let border = item.rect.padded(frame.border_px);
                Self::fill(canvas, width, height, &border, item.border);
            }
            if let Some(texture) = self.textures.get(item.texture) {
                Self::blit(canvas, width, height, &item.rect, texture);
            }
        }
    }

    fn fill(canvas: &mut [u8], width: u32, height: u32, rect: &ScreenRect, color: Color) {
        let value = bgra(color.premultiplied(1.0));
        let xs = span(rect.x, rect.width, width);
        for y in span(rect.y, rect.height, height) {
            let row = (y * width) as usize * 4;
            for x in xs.clone() {
                let idx = row + x as usize * 4;
                if let Some(pixel) = canvas.get_mut(idx..idx + 4) {
                    pixel.copy_from_slice(&value);
                }
            }
        }
    }

    /// Nearest-neighbour scale and source-over blend
    fn blit(canvas: &mut [u8], width: u32, height: u32, rect: &ScreenRect, texture: &CpuTexture) {
        if rect.width <= 0.0 || rect.height <= 0.0 || texture.width == 0 || texture.height == 0 {
            return;
        }
        let sx = texture.width as f32 / rect.width;
        let sy = texture.height as f32 / rect.height;
        let xs = span(rect.x, rect.width, width);

        for y in span(rect.y, rect.height, height) {
            let v = (((y as f32 + 0.5 - rect.y) * sy) as u32).min(texture.height - 1);
            let row = (y * width) as usize * 4;
            for x in xs.clone() {
                let u = (((x as f32 + 0.5 - rect.x) * sx) as u32).min(texture.width - 1);
                let src_idx = ((v * texture.width + u) * 4) as usize;
                let dst_idx = row + x as usize * 4;
                let (Some(src), Some(dst)) = (
                    texture.rgba.get(src_idx..src_idx + 4),
                    canvas.get_mut(dst_idx..dst_idx + 4),
                ) else {
                    continue;
                };

                let alpha = src[3] as u32;
                let inv = 255 - alpha;
                // dst is premultiplied BGRA, src is straight RGBA
                let blend = |s: u8, d: u8| ((s as u32 * alpha + d as u32 * inv + 127) / 255) as u8;
                dst[0] = blend(src[2], dst[0]);
                dst[1] = blend(src[1], dst[1]);
                dst[2] = blend(src[0], dst[2]);
                dst[3] = ((alpha * 255 + dst[3] as u32 * inv + 127) / 255) as u8;
            }
        }
    }
}
