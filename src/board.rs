// Board context
// Owns every piece of board state and runs the per-batch update

use crate::config::Config;
use crate::dnd::DropIngest;
use crate::error::BoardError;
use crate::image_loader::read_image;
use crate::interaction::{InteractionEngine, PointerButton, PointerState};
use crate::render::{DrawItem, Frame, Renderer};
use crate::session::{read_session, write_session};
use crate::shape::ShapeCompositor;
use crate::shortcuts::{default_shortcuts, lookup, BoardAction, ModMask, Shortcut};
use crate::store::{ImageId, ImageStore};
use crate::view::ViewState;
use log::{debug, error, info, warn};
use smithay_client_toolkit::seat::keyboard::Keysym;
use std::path::PathBuf;

/// Request to place an image file on the board, centered on an anchor point
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub path: PathBuf,
    pub anchor: (i32, i32),
    pub scale: f32,
}

impl LoadRequest {
    /// Load at the world origin with scale 1.0
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            anchor: (0, 0),
            scale: 1.0,
        }
    }

    pub fn at(mut self, x: i32, y: i32) -> Self {
        self.anchor = (x, y);
        self
    }

    #[cfg(test)]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

pub struct Board {
    config: Config,
    store: ImageStore,
    view: ViewState,
    pointer: PointerState,
    interaction: InteractionEngine,
    shape: ShapeCompositor,
    drop: DropIngest,
    shortcuts: Vec<Shortcut>,
    session_file: Option<PathBuf>,
    /// Written into the session shebang
    program: String,
}

impl Board {
    pub fn new(config: Config, session_file: Option<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            store: ImageStore::new(config.max_images),
            view: ViewState::new(config.width, config.height),
            pointer: PointerState::default(),
            interaction: InteractionEngine::default(),
            shape: ShapeCompositor::new(config.custom_shape, config.border_px),
            drop: DropIngest::default(),
            shortcuts: default_shortcuts(),
            session_file,
            program: program.into(),
            config,
        }
    }

    #[cfg(test)]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    #[cfg(test)]
    pub fn shape_enabled(&self) -> bool {
        self.shape.enabled()
    }

    /// Read, decode and place one image
    pub fn load_at(
        &mut self,
        renderer: &mut dyn Renderer,
        request: &LoadRequest,
    ) -> Result<ImageId, BoardError> {
        if self.store.is_full() {
            return Err(BoardError::CapacityExceeded {
                path: request.path.clone(),
                limit: self.store.capacity(),
            });
        }
        let decoded = read_image(&request.path)?;
        let id = self.store.add(
            renderer,
            &decoded,
            request.path.clone(),
            request.anchor,
            request.scale,
        )?;
        info!(
            "Loaded {} ({}x{}, {} channels)",
            request.path.display(),
            decoded.width,
            decoded.height,
            decoded.channels
        );
        Ok(id)
    }

    /// Load every request, reporting failures and carrying on; returns how many loaded
    pub fn load_all(&mut self, renderer: &mut dyn Renderer, requests: &[LoadRequest]) -> usize {
        requests
            .iter()
            .filter(|request| match self.load_at(renderer, request) {
                Ok(_) => true,
                Err(e) => {
                    error!("{}", e);
                    false
                }
            })
            .count()
    }

    /// Load the configured session file, if any
    pub fn load_session(&mut self, renderer: &mut dyn Renderer) -> usize {
        let Some(path) = self.session_file.clone() else {
            return 0;
        };
        match read_session(&path) {
            Ok(requests) => {
                let loaded = self.load_all(renderer, &requests);
                info!("Session {}: {} images loaded", path.display(), loaded);
                loaded
            }
            Err(e) if e.is_not_found() => {
                warn!("{}", e);
                0
            }
            Err(e) => {
                error!("{}", e);
                0
            }
        }
    }

    /// Write the board to the configured session file
    pub fn save_session(&self) -> Option<usize> {
        let Some(path) = &self.session_file else {
            warn!("No session file given (-f), board not saved");
            return None;
        };
        match write_session(path, &self.program, &self.store) {
            Ok(count) => {
                info!("Saved {} images to {}", count, path.display());
                Some(count)
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        }
    }

    pub fn pointer_enter(&mut self, x: f64, y: f64) {
        self.pointer.enter(x, y);
    }

    pub fn pointer_motion(&mut self, x: f64, y: f64) {
        self.pointer.motion_to(x, y);
    }

    pub fn pointer_leave(&mut self) {
        self.pointer.leave();
    }

    pub fn pointer_button(&mut self, button: PointerButton, down: bool) {
        self.pointer.set_button(button, down);
    }

    /// Wheel steps, positive zooms in
    pub fn scroll(&mut self, steps: i32) {
        self.view.zoom_steps(steps);
        debug!("Zoom {:.3}", self.view.zoom());
    }

    pub fn resize(&mut self, width: i32, height: i32) {
        self.view.resize(width, height);
    }

    /// Run the binding for a key press, if any. `Quit` is left to the caller.
    pub fn handle_key(&mut self, key: Keysym, mods: ModMask) -> Option<BoardAction> {
        let action = lookup(&self.shortcuts, key, mods, self.config.ignore_mod)?;
        debug!("Key {:?} -> {:?}", key, action);
        self.run_action(action);
        Some(action)
    }

    pub fn run_action(&mut self, action: BoardAction) {
        match action {
            BoardAction::ZoomReset => self.view.reset_zoom(),
            BoardAction::SaveBoard => {
                self.save_session();
            }
            BoardAction::ToggleShape => {
                let enabled = self.shape.toggle();
                info!("Custom shape {}", if enabled { "on" } else { "off" });
            }
            BoardAction::Quit => {}
        }
    }

    pub fn drop_ingest_mut(&mut self) -> &mut DropIngest {
        &mut self.drop
    }

    /// Hand a drop payload to the negotiation and load the files it names
    pub fn accept_drop_payload(&mut self, renderer: &mut dyn Renderer, payload: &[u8]) -> usize {
        let requests = self.drop.deliver(payload);
        self.load_all(renderer, &requests)
    }

    /// Resolve the pending input and snapshot everything the next frame needs
    pub fn frame(&mut self) -> Frame {
        let cursor = self
            .interaction
            .resolve(&mut self.pointer, &mut self.view, &mut self.store);
        let focus = self.interaction.focus();
        let hover = self.interaction.hover();
        let region = self.shape.visible_region(&self.store, &self.view, focus);

        let items = self
            .store
            .iter()
            .map(|(id, image)| DrawItem {
                texture: image.texture(),
                rect: self.view.image_rect(image, 0.0),
                border: if Some(id) == focus {
                    self.config.focus
                } else if Some(id) == hover {
                    self.config.hover
                } else {
                    self.config.normal
                },
            })
            .collect();

        let (width, height) = self.view.size();
        Frame {
            width,
            height,
            background: region
                .is_full()
                .then(|| self.config.background.premultiplied(self.config.background_alpha)),
            border_px: self.config.border_px as f32,
            items,
            region,
            cursor,
        }
    }

    /// Release every texture; the board is empty afterwards
    pub fn teardown(&mut self, renderer: &mut dyn Renderer) {
        self.store.clear(renderer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dnd::{DropAction, DropEnter, DropStatus, DropTransport, SourceId, TypeList};
    use crate::interaction::CursorShape;
    use crate::render::testing::RecordingRenderer;
    use crate::shape::VisibleRegion;
    use image::{Rgba, RgbaImage};
    use std::fs;
    use std::path::Path;
    use tempfile::{tempdir, TempDir};

    fn png(dir: &TempDir, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.path().join(name);
        RgbaImage::from_pixel(width, height, Rgba([200, 10, 10, 255]))
            .save(&path)
            .expect("failed to write png");
        path
    }

    fn board(max_images: usize, session: Option<PathBuf>) -> Board {
        let config = Config {
            max_images,
            width: 200,
            height: 200,
            ..Config::default()
        };
        Board::new(config, session, "refpin")
    }

    #[test]
    fn load_at_centers_and_reports_failures() {
        let dir = tempdir().expect("failed to create temp dir");
        let good = png(&dir, "good.png", 10, 4);
        let junk = dir.path().join("junk.png");
        fs::write(&junk, b"nope").expect("failed to write");
        let mut renderer = RecordingRenderer::default();
        let mut board = board(8, None);

        let id = board
            .load_at(&mut renderer, &LoadRequest::new(&good).at(20, 20))
            .expect("load failed");
        assert_eq!(board.store().get(id).map(|i| i.position()), Some((15, 18)));

        let err = board
            .load_at(&mut renderer, &LoadRequest::new(&junk))
            .unwrap_err();
        assert!(matches!(err, BoardError::DecodeFailure { .. }));
        assert_eq!(board.store().len(), 1);
    }

    #[test]
    fn capacity_is_checked_before_reading() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 2, 2);
        let mut renderer = RecordingRenderer::default();
        let mut board = board(1, None);
        board
            .load_at(&mut renderer, &LoadRequest::new(&a))
            .expect("load failed");

        let err = board
            .load_at(&mut renderer, &LoadRequest::new(dir.path().join("missing.png")))
            .unwrap_err();

        assert!(matches!(err, BoardError::CapacityExceeded { limit: 1, .. }));
        assert_eq!(board.store().len(), 1);
    }

    #[test]
    fn load_all_continues_past_failures() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 2, 2);
        let b = png(&dir, "b.png", 2, 2);
        let mut renderer = RecordingRenderer::default();
        let mut board = board(8, None);

        let loaded = board.load_all(
            &mut renderer,
            &[
                LoadRequest::new(&a),
                LoadRequest::new(dir.path().join("missing.png")),
                LoadRequest::new(&b),
            ],
        );

        assert_eq!(loaded, 2);
        assert_eq!(board.store().len(), 2);
    }

    #[test]
    fn saved_session_reloads_into_a_fresh_board() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 6, 4);
        let b = png(&dir, "b b.png", 3, 3);
        let session = dir.path().join("board.session");
        let mut renderer = RecordingRenderer::default();
        let mut first = board(8, Some(session.clone()));
        first
            .load_at(&mut renderer, &LoadRequest::new(&a).at(-7, 12))
            .expect("load failed");
        first
            .load_at(&mut renderer, &LoadRequest::new(&b).at(40, 1).with_scale(0.5))
            .expect("load failed");

        assert_eq!(first.handle_key(Keysym::s, ModMask::empty()), Some(BoardAction::SaveBoard));

        let mut second = board(8, Some(session));
        assert_eq!(second.load_session(&mut renderer), 2);
        let placed: Vec<_> = second
            .store()
            .iter()
            .map(|(_, image)| (image.path().to_path_buf(), image.center(), image.scale()))
            .collect();
        assert_eq!(placed, [(a, (-7, 12), 1.0), (b, (40, 1), 0.5)]);
    }

    #[test]
    fn missing_session_and_no_session_are_not_fatal() {
        let dir = tempdir().expect("failed to create temp dir");
        let mut renderer = RecordingRenderer::default();

        let mut with_missing = board(8, Some(dir.path().join("absent")));
        assert_eq!(with_missing.load_session(&mut renderer), 0);

        let mut without = board(8, None);
        assert_eq!(without.load_session(&mut renderer), 0);
        assert_eq!(without.save_session(), None);
    }

    #[test]
    fn shortcuts_drive_board_actions() {
        let mut board = board(8, None);
        board.scroll(3);
        assert_ne!(board.view().zoom(), 1.0);

        assert_eq!(
            board.handle_key(Keysym::Home, ModMask::CONTROL),
            Some(BoardAction::ZoomReset)
        );
        assert_eq!(board.view().zoom(), 1.0);

        assert!(board.shape_enabled());
        board.handle_key(Keysym::b, ModMask::empty());
        assert!(!board.shape_enabled());

        assert_eq!(board.handle_key(Keysym::Escape, ModMask::empty()), Some(BoardAction::Quit));
        assert_eq!(board.handle_key(Keysym::z, ModMask::empty()), None);
    }

    #[test]
    fn frame_colours_borders_and_clips_region() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 20, 20);
        let b = png(&dir, "b.png", 20, 20);
        let mut renderer = RecordingRenderer::default();
        let mut board = board(8, None);
        board
            .load_at(&mut renderer, &LoadRequest::new(&a))
            .expect("load failed");
        board
            .load_at(&mut renderer, &LoadRequest::new(&b).at(50, 50))
            .expect("load failed");

        board.pointer_enter(100.0, 100.0);
        let idle = board.frame();
        assert_eq!(idle.cursor, None);
        assert_eq!(idle.items.len(), 2);
        assert_eq!(idle.items[0].border, board.config().hover);
        assert_eq!(idle.items[1].border, board.config().normal);
        assert!(matches!(&idle.region, VisibleRegion::Clipped(rects) if rects.len() == 2));
        assert_eq!(idle.background, None);

        board.pointer_button(PointerButton::Primary, true);
        board.pointer_motion(104.0, 100.0);
        let dragging = board.frame();
        assert_eq!(dragging.cursor, Some(CursorShape::Move));
        assert_eq!(dragging.items[0].border, board.config().focus);
        assert!(dragging.region.is_full());
        assert_eq!(dragging.background, Some([0.1, 0.1, 0.1, 1.0]));
        assert_eq!(dragging.items[0].rect.x, 94.0);
    }

    #[derive(Default)]
    struct Offer {
        requested: Option<(String, u32)>,
    }

    impl DropTransport for Offer {
        fn fetch_type_list(&mut self, _source: SourceId) -> Vec<String> {
            Vec::new()
        }

        fn send_status(&mut self, _source: SourceId, _status: DropStatus) {}

        fn request_payload(&mut self, _source: SourceId, mime: &str, timestamp: u32) {
            self.requested = Some((mime.to_string(), timestamp));
        }
    }

    #[test]
    fn dropped_files_are_loaded_at_origin() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 4, 4);
        let mut renderer = RecordingRenderer::default();
        let mut board = board(8, None);
        let mut offer = Offer::default();

        let ingest = board.drop_ingest_mut();
        ingest.enter(
            DropEnter {
                source: 1,
                version: 3,
                types: TypeList::Inline(vec!["text/uri-list".into()]),
            },
            &mut offer,
        );
        assert!(ingest.position(1, DropAction::Copy, &mut offer));
        assert!(ingest.perform_drop(1, 99, &mut offer));
        assert_eq!(offer.requested, Some(("text/uri-list".to_string(), 99)));

        let payload = format!("file://{}\r\n", a.display());
        assert_eq!(board.accept_drop_payload(&mut renderer, payload.as_bytes()), 1);
        let (_, image) = board.store().iter().next().expect("nothing loaded");
        assert_eq!(image.path(), Path::new(&a));
        assert_eq!(image.center(), (0, 0));
    }

    #[test]
    fn teardown_releases_every_texture() {
        let dir = tempdir().expect("failed to create temp dir");
        let a = png(&dir, "a.png", 2, 2);
        let mut renderer = RecordingRenderer::default();
        let mut board = board(8, None);
        board
            .load_at(&mut renderer, &LoadRequest::new(&a))
            .expect("load failed");

        board.teardown(&mut renderer);

        assert!(board.store().is_empty());
        assert_eq!(renderer.released.len(), 1);
    }
}
