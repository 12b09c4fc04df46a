// Rendering interface shared by the GPU and CPU backends
// The board hands textures in and frame snapshots out; backends own the pixels

use crate::config::Color;
use crate::image_loader::DecodedImage;
use crate::interaction::CursorShape;
use crate::shape::VisibleRegion;
use crate::view::ScreenRect;
use anyhow::Result;

/// Handle to a texture owned by a renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

/// Texture ownership contract between the image store and a backend
pub trait Renderer {
    /// Upload decoded pixels, returning a handle the store keeps
    fn upload(&mut self, image: &DecodedImage) -> Result<TextureId>;

    /// Free a texture; unknown handles are ignored
    fn release(&mut self, texture: TextureId);
}

/// Slot storage for backend textures, reusing freed slots
#[derive(Debug)]
pub struct TextureSlab<T> {
    entries: Vec<Option<T>>,
    free: Vec<u32>,
}

impl<T> Default for TextureSlab<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<T> TextureSlab<T> {
    pub fn insert(&mut self, value: T) -> TextureId {
        if let Some(index) = self.free.pop() {
            self.entries[index as usize] = Some(value);
            return TextureId(index);
        }
        self.entries.push(Some(value));
        TextureId(self.entries.len() as u32 - 1)
    }

    pub fn get(&self, id: TextureId) -> Option<&T> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn remove(&mut self, id: TextureId) -> Option<T> {
        let value = self.entries.get_mut(id.0 as usize)?.take();
        if value.is_some() {
            self.free.push(id.0);
        }
        value
    }

    pub fn len(&self) -> usize {
        self.entries.len() - self.free.len()
    }
}

/// One image to draw this frame
#[derive(Debug, Clone, PartialEq)]
pub struct DrawItem {
    pub texture: TextureId,
    /// Screen rectangle of the image itself (no border)
    pub rect: ScreenRect,
    pub border: Color,
}

/// Everything a backend needs to draw one frame, captured from a single board state
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Premultiplied background, `None` for a fully transparent surface
    pub background: Option<[f32; 4]>,
    pub border_px: f32,
    /// Images in draw order, bottom first
    pub items: Vec<DrawItem>,
    pub region: VisibleRegion,
    /// Cursor change requested by this frame's interaction update
    pub cursor: Option<CursorShape>,
}
