// Hit testing
// Finds the topmost image under the pointer

use crate::interaction::PointerState;
use crate::store::{ImageId, ImageStore};
use crate::view::ViewState;

/// Topmost image whose unpadded screen rectangle contains the pointer.
///
/// Returns `None` while the pointer is outside the window.
pub fn find_hover(store: &ImageStore, view: &ViewState, pointer: &PointerState) -> Option<ImageId> {
    if !pointer.inside() {
        return None;
    }
    let (px, py) = pointer.position();
    store
        .iter()
        .rev()
        .find(|(_, image)| view.image_rect(image, 0.0).contains(px, py))
        .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::DecodedImage;
    use crate::render::testing::RecordingRenderer;

    fn square(size: u32) -> DecodedImage {
        DecodedImage {
            width: size,
            height: size,
            channels: 1,
            pixels: vec![0; (size * size) as usize],
        }
    }

    fn pointer_at(x: f64, y: f64) -> PointerState {
        let mut pointer = PointerState::default();
        pointer.enter(x, y);
        pointer
    }

    #[test]
    fn last_inserted_image_wins() {
        let mut renderer = RecordingRenderer::default();
        let mut store = ImageStore::new(4);
        let view = ViewState::new(200, 200);
        // world (0, 0) is screen (100, 100)
        store
            .add(&mut renderer, &square(20), "a.png".into(), (0, 0), 1.0)
            .expect("add failed");
        let top = store
            .add(&mut renderer, &square(20), "b.png".into(), (5, 5), 1.0)
            .expect("add failed");

        assert_eq!(find_hover(&store, &view, &pointer_at(104.0, 104.0)), Some(top));
    }

    #[test]
    fn bottom_image_is_hit_outside_the_overlap() {
        let mut renderer = RecordingRenderer::default();
        let mut store = ImageStore::new(4);
        let view = ViewState::new(200, 200);
        let bottom = store
            .add(&mut renderer, &square(20), "a.png".into(), (0, 0), 1.0)
            .expect("add failed");
        store
            .add(&mut renderer, &square(20), "b.png".into(), (15, 15), 1.0)
            .expect("add failed");

        assert_eq!(find_hover(&store, &view, &pointer_at(91.0, 91.0)), Some(bottom));
        assert_eq!(find_hover(&store, &view, &pointer_at(10.0, 10.0)), None);
    }

    #[test]
    fn edges_are_inclusive_and_follow_zoom() {
        let mut renderer = RecordingRenderer::default();
        let mut store = ImageStore::new(1);
        let mut view = ViewState::new(200, 200);
        let id = store
            .add(&mut renderer, &square(10), "a.png".into(), (5, 5), 1.0)
            .expect("add failed");
        view.set_zoom(2.0);

        // spans screen 100..=120 on both axes
        assert_eq!(find_hover(&store, &view, &pointer_at(120.0, 100.0)), Some(id));
        assert_eq!(find_hover(&store, &view, &pointer_at(120.5, 100.0)), None);
    }

    #[test]
    fn nothing_is_hovered_while_pointer_is_outside() {
        let mut renderer = RecordingRenderer::default();
        let mut store = ImageStore::new(1);
        let view = ViewState::new(200, 200);
        store
            .add(&mut renderer, &square(20), "a.png".into(), (0, 0), 1.0)
            .expect("add failed");
        let mut pointer = pointer_at(100.0, 100.0);
        pointer.leave();

        assert_eq!(find_hover(&store, &view, &pointer), None);
    }
}
