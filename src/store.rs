// Image store
// Bounded, insertion-ordered collection of board images; order is draw order and z-order

use crate::error::BoardError;
use crate::image_loader::DecodedImage;
use crate::render::{Renderer, TextureId};
use log::debug;
use std::path::{Path, PathBuf};

/// Smallest scale an image can shrink to
pub const SCALE_FLOOR: f32 = 0.01;

/// Stable handle to an image in a store.
///
/// Handles from before a [`ImageStore::clear`] no longer resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId {
    index: u32,
    generation: u32,
}

/// A loaded reference picture and its placement
#[derive(Debug)]
pub struct Image {
    texture: TextureId,
    width: u32,
    height: u32,
    /// Top-left corner in world space, before scale
    pos_x: i32,
    pos_y: i32,
    scale: f32,
    path: PathBuf,
}

impl Image {
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn position(&self) -> (i32, i32) {
        (self.pos_x, self.pos_y)
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// World-space center, the inverse of the centering applied on load
    pub fn center(&self) -> (i32, i32) {
        (
            self.pos_x.saturating_add(self.width as i32 / 2),
            self.pos_y.saturating_add(self.height as i32 / 2),
        )
    }

    /// Size in world units after scaling
    pub fn scaled_size(&self) -> (f32, f32) {
        (
            self.width as f32 * self.scale,
            self.height as f32 * self.scale,
        )
    }

    pub fn translate(&mut self, dx: i32, dy: i32) {
        self.pos_x = self.pos_x.saturating_add(dx);
        self.pos_y = self.pos_y.saturating_add(dy);
    }

    /// Set the scale, never going below [`SCALE_FLOOR`]
    pub fn set_scale(&mut self, scale: f32) {
        self.scale = scale.max(SCALE_FLOOR);
    }
}

#[derive(Debug)]
pub struct ImageStore {
    images: Vec<Image>,
    capacity: usize,
    generation: u32,
}

impl ImageStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            images: Vec::new(),
            capacity,
            generation: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.images.len() >= self.capacity
    }

    /// Add a decoded image centered on the anchor point, uploading its texture
    pub fn add(
        &mut self,
        renderer: &mut dyn Renderer,
        image: &DecodedImage,
        path: PathBuf,
        anchor: (i32, i32),
        scale: f32,
    ) -> Result<ImageId, BoardError> {
        if self.is_full() {
            return Err(BoardError::CapacityExceeded {
                path,
                limit: self.capacity,
            });
        }
        if let Err(reason) = image.validate() {
            return Err(BoardError::DecodeRejected { path, reason });
        }

        let texture = renderer
            .upload(image)
            .map_err(|e| BoardError::DecodeRejected {
                path: path.clone(),
                reason: format!("texture upload failed: {:#}", e),
            })?;

        let mut entry = Image {
            texture,
            width: image.width,
            height: image.height,
            pos_x: anchor.0.saturating_sub(image.width as i32 / 2),
            pos_y: anchor.1.saturating_sub(image.height as i32 / 2),
            scale: 1.0,
            path,
        };
        entry.set_scale(scale);
        debug!(
            "Stored {} at ({}, {}) scale {}",
            entry.path.display(),
            entry.pos_x,
            entry.pos_y,
            entry.scale
        );

        self.images.push(entry);
        Ok(ImageId {
            index: self.images.len() as u32 - 1,
            generation: self.generation,
        })
    }

    pub fn get(&self, id: ImageId) -> Option<&Image> {
        if id.generation != self.generation {
            return None;
        }
        self.images.get(id.index as usize)
    }

    pub fn get_mut(&mut self, id: ImageId) -> Option<&mut Image> {
        if id.generation != self.generation {
            return None;
        }
        self.images.get_mut(id.index as usize)
    }

    /// Images in draw order, bottom first
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (ImageId, &Image)> + '_ {
        let generation = self.generation;
        self.images.iter().enumerate().map(move |(index, image)| {
            (
                ImageId {
                    index: index as u32,
                    generation,
                },
                image,
            )
        })
    }

    /// Tear down every image, releasing its texture and invalidating all handles
    pub fn clear(&mut self, renderer: &mut dyn Renderer) {
        for image in self.images.drain(..) {
            renderer.release(image.texture);
        }
        self.generation = self.generation.wrapping_add(1);
    }
}
