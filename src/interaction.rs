// Interaction engine
// Turns accumulated pointer input into move, scale and pan effects once per input batch

use crate::hit_test::find_hover;
use crate::store::{ImageId, ImageStore};
use crate::view::ViewState;
use log::debug;

/// Scale change per world unit of horizontal drag
pub const SCALE_PER_UNIT: f32 = 0.01;

/// Continuous scroll distance that counts as one zoom step
pub const SCROLL_UNITS_PER_STEP: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
    Tertiary,
}

/// Last known pointer position, buttons and the raw delta since the last resolution
#[derive(Debug, Clone, Default)]
pub struct PointerState {
    x: f64,
    y: f64,
    inside: bool,
    xrel: f64,
    yrel: f64,
    primary: bool,
    secondary: bool,
    tertiary: bool,
}

impl PointerState {
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn inside(&self) -> bool {
        self.inside
    }

    /// Pointer entered the window; jumps without producing a delta
    pub fn enter(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
        self.inside = true;
    }

    pub fn motion_to(&mut self, x: f64, y: f64) {
        self.xrel += x - self.x;
        self.yrel += y - self.y;
        self.x = x;
        self.y = y;
        self.inside = true;
    }

    pub fn leave(&mut self) {
        self.inside = false;
    }

    pub fn set_button(&mut self, button: PointerButton, down: bool) {
        match button {
            PointerButton::Primary => self.primary = down,
            PointerButton::Secondary => self.secondary = down,
            PointerButton::Tertiary => self.tertiary = down,
        }
    }

    /// Take and reset the accumulated raw delta
    fn take_delta(&mut self) -> (f64, f64) {
        let delta = (self.xrel, self.yrel);
        self.xrel = 0.0;
        self.yrel = 0.0;
        delta
    }
}

/// What the pointer is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Action {
    #[default]
    Idle,
    Moving,
    Scaling,
    Panning,
}

impl Action {
    /// Primary beats secondary beats tertiary
    fn from_buttons(pointer: &PointerState) -> Self {
        if pointer.primary {
            Action::Moving
        } else if pointer.secondary {
            Action::Scaling
        } else if pointer.tertiary {
            Action::Panning
        } else {
            Action::Idle
        }
    }

    pub fn cursor(self) -> CursorShape {
        match self {
            Action::Idle => CursorShape::Default,
            Action::Moving => CursorShape::Move,
            Action::Scaling => CursorShape::Scale,
            Action::Panning => CursorShape::Grab,
        }
    }
}

/// Cursor requested by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorShape {
    #[default]
    Default,
    Move,
    Scale,
    Grab,
}

/// Converts vertical scroll into zoom steps, positive zooms in.
///
/// Wheel clicks count one step each. Continuous scrolling (touchpads) is
/// accumulated and yields a step per [`SCROLL_UNITS_PER_STEP`].
#[derive(Debug, Clone, Default)]
pub struct ScrollSteps {
    pending: f64,
}

impl ScrollSteps {
    pub fn feed(&mut self, discrete: i32, absolute: f64) -> i32 {
        if discrete != 0 {
            self.pending = 0.0;
            return discrete.saturating_neg();
        }
        if !absolute.is_finite() {
            return 0;
        }
        self.pending -= absolute;
        let steps = (self.pending / SCROLL_UNITS_PER_STEP).trunc();
        self.pending -= steps * SCROLL_UNITS_PER_STEP;
        steps.clamp(i32::MIN as f64, i32::MAX as f64) as i32
    }

    /// Drop the remainder when a scroll sequence ends
    pub fn stop(&mut self) {
        self.pending = 0.0;
    }
}

#[derive(Debug, Default)]
pub struct InteractionEngine {
    action: Action,
    focus: Option<ImageId>,
    hover: Option<ImageId>,
    /// Raw pixels not yet applied because they fell below one world unit
    residual: (f64, f64),
}

impl InteractionEngine {
    pub fn action(&self) -> Action {
        self.action
    }

    pub fn focus(&self) -> Option<ImageId> {
        self.focus
    }

    pub fn hover(&self) -> Option<ImageId> {
        self.hover
    }

    /// Resolve one input batch.
    ///
    /// Returns the new cursor only when the action changed.
    pub fn resolve(
        &mut self,
        pointer: &mut PointerState,
        view: &mut ViewState,
        store: &mut ImageStore,
    ) -> Option<CursorShape> {
        let action = Action::from_buttons(pointer);
        let cursor = (action != self.action).then(|| action.cursor());
        if cursor.is_some() {
            debug!("Interaction {:?} -> {:?}", self.action, action);
        }
        self.action = action;

        let (dx, dy) = self.normalized_delta(pointer, view.zoom());

        if action == Action::Panning {
            view.pan_by(dx, dy);
        }

        self.hover = find_hover(store, view, pointer);
        if action == Action::Idle {
            self.focus = None;
        } else if self.focus.is_none() {
            // an unfocused gesture picks up the first image it crosses
            self.focus = self.hover;
        }

        if let Some(image) = self.focus.and_then(|id| store.get_mut(id)) {
            match action {
                Action::Moving => image.translate(dx, dy),
                Action::Scaling => image.set_scale(image.scale() + SCALE_PER_UNIT * dx as f32),
                Action::Idle | Action::Panning => {}
            }
        }

        cursor
    }

    /// Zoom-normalize the batch delta, truncating toward zero and keeping the remainder
    fn normalized_delta(&mut self, pointer: &mut PointerState, zoom: f32) -> (i32, i32) {
        let (raw_x, raw_y) = pointer.take_delta();
        if self.action == Action::Idle {
            self.residual = (0.0, 0.0);
            return (0, 0);
        }

        let zoom = zoom as f64;
        let raw_x = raw_x + self.residual.0;
        let raw_y = raw_y + self.residual.1;
        let world_x = (raw_x / zoom).trunc();
        let world_y = (raw_y / zoom).trunc();
        self.residual = (raw_x - world_x * zoom, raw_y - world_y * zoom);

        (saturate(world_x), saturate(world_y))
    }
}

fn saturate(value: f64) -> i32 {
    value.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::DecodedImage;
    use crate::render::testing::RecordingRenderer;
    use crate::store::SCALE_FLOOR;

    struct Fixture {
        pointer: PointerState,
        view: ViewState,
        store: ImageStore,
        engine: InteractionEngine,
        image: ImageId,
    }

    impl Fixture {
        /// One 20x20 image centered on the world origin, screen (100, 100)
        fn new() -> Self {
            let mut renderer = RecordingRenderer::default();
            let mut store = ImageStore::new(4);
            let image = store
                .add(
                    &mut renderer,
                    &DecodedImage {
                        width: 20,
                        height: 20,
                        channels: 3,
                        pixels: vec![0; 20 * 20 * 3],
                    },
                    "a.png".into(),
                    (0, 0),
                    1.0,
                )
                .expect("add failed");
            let mut pointer = PointerState::default();
            pointer.enter(100.0, 100.0);
            Self {
                pointer,
                view: ViewState::new(200, 200),
                store,
                engine: InteractionEngine::default(),
                image,
            }
        }

        fn resolve(&mut self) -> Option<CursorShape> {
            self.engine
                .resolve(&mut self.pointer, &mut self.view, &mut self.store)
        }

        fn position(&self) -> (i32, i32) {
            self.store
                .get(self.image)
                .map(|image| image.position())
                .expect("missing image")
        }

        fn scale(&self) -> f32 {
            self.store
                .get(self.image)
                .map(|image| image.scale())
                .expect("missing image")
        }
    }

    #[test]
    fn cursor_changes_once_per_transition() {
        let mut f = Fixture::new();
        assert_eq!(f.resolve(), None);

        f.pointer.set_button(PointerButton::Primary, true);
        assert_eq!(f.resolve(), Some(CursorShape::Move));
        f.pointer.motion_to(101.0, 100.0);
        assert_eq!(f.resolve(), None);

        f.pointer.set_button(PointerButton::Tertiary, true);
        assert_eq!(f.resolve(), None, "primary still wins");

        f.pointer.set_button(PointerButton::Primary, false);
        assert_eq!(f.resolve(), Some(CursorShape::Grab));

        f.pointer.set_button(PointerButton::Tertiary, false);
        assert_eq!(f.resolve(), Some(CursorShape::Default));
        assert_eq!(f.resolve(), None);
    }

    #[test]
    fn moving_translates_focus_and_clears_on_release() {
        let mut f = Fixture::new();
        f.pointer.set_button(PointerButton::Primary, true);
        f.resolve();
        assert_eq!(f.engine.focus(), Some(f.image));

        f.pointer.motion_to(130.0, 90.0);
        f.resolve();
        assert_eq!(f.position(), (20, -20));

        // focus sticks even after the pointer leaves the image
        f.pointer.motion_to(190.0, 90.0);
        f.resolve();
        assert_eq!(f.position(), (80, -20));

        f.pointer.set_button(PointerButton::Primary, false);
        f.resolve();
        assert_eq!(f.engine.focus(), None);
    }

    #[test]
    fn deltas_are_normalized_by_zoom() {
        let mut f = Fixture::new();
        f.view.set_zoom(2.0);
        f.pointer.set_button(PointerButton::Primary, true);
        f.resolve();

        f.pointer.motion_to(110.0, 104.0);
        f.resolve();
        assert_eq!(f.position(), (-5, -8));
    }

    #[test]
    fn sub_unit_motion_accumulates_while_dragging() {
        let mut f = Fixture::new();
        f.view.set_zoom(4.0);
        f.pointer.set_button(PointerButton::Primary, true);
        f.resolve();

        for x in [102.0, 104.0, 106.0, 108.0] {
            f.pointer.motion_to(x, 100.0);
            f.resolve();
        }
        assert_eq!(f.position(), (-8, -10));

        f.pointer.motion_to(110.0, 100.0);
        f.pointer.set_button(PointerButton::Primary, false);
        f.resolve();
        f.pointer.set_button(PointerButton::Primary, true);
        f.resolve();
        f.pointer.motion_to(112.0, 100.0);
        f.resolve();
        assert_eq!(f.position(), (-8, -10), "remainder is dropped when idle");
    }

    #[test]
    fn scaling_never_reaches_zero() {
        let mut f = Fixture::new();
        f.pointer.set_button(PointerButton::Secondary, true);
        f.resolve();

        let mut x = 100.0;
        for _ in 0..20 {
            x -= 30.0;
            f.pointer.motion_to(x, 100.0);
            f.resolve();
            assert!(f.scale() > 0.0);
        }
        assert_eq!(f.scale(), SCALE_FLOOR);

        f.pointer.motion_to(x + 50.0, 100.0);
        f.resolve();
        assert!((f.scale() - (SCALE_FLOOR + 0.5)).abs() < 1e-6);
    }

    #[test]
    fn panning_moves_origin_without_focus() {
        let mut f = Fixture::new();
        f.pointer.motion_to(5.0, 5.0);
        f.resolve();
        f.pointer.set_button(PointerButton::Tertiary, true);
        f.resolve();
        assert_eq!(f.engine.focus(), None);

        f.pointer.motion_to(15.0, 0.0);
        f.resolve();
        assert_eq!(f.view.origin(), (10, -5));
        assert_eq!(f.position(), (-10, -10));
    }

    #[test]
    fn wheel_clicks_are_one_step_each() {
        let mut scroll = ScrollSteps::default();
        assert_eq!(scroll.feed(-1, -15.0), 1);
        assert_eq!(scroll.feed(2, 30.0), -2);
    }

    #[test]
    fn continuous_scroll_accumulates_into_steps() {
        let mut scroll = ScrollSteps::default();
        let steps: i32 = (0..10).map(|_| scroll.feed(0, -2.0)).sum();
        assert_eq!(steps, 1, "20 units up is one step");

        assert_eq!(scroll.feed(0, 12.0), 0);
        assert_eq!(scroll.feed(0, 12.0), -1);

        scroll.stop();
        assert_eq!(scroll.feed(0, -14.0), 0);
        assert_eq!(scroll.feed(0, f64::NAN), 0);
    }

    #[test]
    fn background_drag_picks_up_the_image_it_crosses() {
        let mut f = Fixture::new();
        f.pointer.motion_to(80.0, 100.0);
        f.resolve();
        f.pointer.set_button(PointerButton::Primary, true);
        f.resolve();
        assert_eq!(f.engine.focus(), None);

        f.pointer.motion_to(90.0, 100.0);
        f.resolve();
        assert_eq!(f.engine.focus(), Some(f.image));
        assert_eq!(f.position(), (0, -10));

        f.pointer.motion_to(95.0, 100.0);
        f.resolve();
        assert_eq!(f.position(), (5, -10));
    }

    #[test]
    fn switching_gestures_takes_the_hovered_image() {
        let mut f = Fixture::new();
        f.pointer.motion_to(5.0, 5.0);
        f.resolve();
        f.pointer.set_button(PointerButton::Tertiary, true);
        f.resolve();
        assert_eq!(f.engine.focus(), None);

        // pan the image under the pointer, then switch to scaling
        f.pointer.motion_to(15.0, 15.0);
        f.resolve();
        f.view.pan_by(-90, -90);
        f.pointer.set_button(PointerButton::Tertiary, false);
        f.pointer.set_button(PointerButton::Secondary, true);
        assert_eq!(f.resolve(), Some(CursorShape::Scale));
        assert_eq!(f.engine.focus(), Some(f.image));

        f.pointer.motion_to(25.0, 15.0);
        f.resolve();
        assert!((f.scale() - 1.1).abs() < 1e-6);
    }
}
