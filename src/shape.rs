// Shape compositor
// Decides which part of the window is visible and clickable

use crate::store::{ImageId, ImageStore};
use crate::view::{PixelRect, ViewState};

/// Region handed to the windowing system each frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisibleRegion {
    /// The whole window
    Full(PixelRect),
    /// Only these rectangles; may be empty
    Clipped(Vec<PixelRect>),
}

impl VisibleRegion {
    pub fn is_full(&self) -> bool {
        matches!(self, VisibleRegion::Full(_))
    }

    pub fn rects(&self) -> &[PixelRect] {
        match self {
            VisibleRegion::Full(rect) => std::slice::from_ref(rect),
            VisibleRegion::Clipped(rects) => rects,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ShapeCompositor {
    enabled: bool,
    border_px: u32,
}

impl ShapeCompositor {
    pub fn new(enabled: bool, border_px: u32) -> Self {
        Self { enabled, border_px }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Flip custom-shape mode, returning the new setting
    pub fn toggle(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    /// Full window while shaping is off, the board is empty, or a gesture holds focus;
    /// otherwise every image rectangle grown by the border width.
    pub fn visible_region(
        &self,
        store: &ImageStore,
        view: &ViewState,
        focus: Option<ImageId>,
    ) -> VisibleRegion {
        if !self.enabled || store.is_empty() || focus.is_some() {
            return VisibleRegion::Full(view.window_rect());
        }
        let pad = self.border_px as f32;
        VisibleRegion::Clipped(
            store
                .iter()
                .map(|(_, image)| view.image_rect(image, pad).to_pixels())
                .collect(),
        )
    }
}
