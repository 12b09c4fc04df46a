// Wayland integration module
// Handles all Wayland-specific functionality using smithay-client-toolkit

use crate::board::Board;
use crate::cli::ParsedArgs;
use crate::config::Config;
use crate::cpu_renderer::CpuRenderer;
use crate::dnd::{DropAction, DropEnter, DropStatus, DropTransport, SourceId, TypeList};
use crate::interaction::{CursorShape, PointerButton, ScrollSteps};
use crate::render::{Frame, Renderer};
use crate::shape::VisibleRegion;
use crate::shortcuts::{BoardAction, ModMask};
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    data_device_manager::{
        data_device::{DataDevice, DataDeviceHandler},
        data_offer::{DataOfferHandler, DragOffer},
        data_source::DataSourceHandler,
        DataDeviceManagerState, ReadPipe, WritePipe,
    },
    delegate_compositor, delegate_data_device, delegate_keyboard, delegate_layer,
    delegate_output, delegate_pointer, delegate_registry, delegate_seat, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
        pointer::{
            CursorIcon, PointerData, PointerEvent, PointerEventKind, PointerHandler, ThemeSpec,
            ThemedPointer,
        },
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use std::io::{self, Read};
use wayland_client::{
    globals::registry_queue_init,
    protocol::{
        wl_data_device::WlDataDevice, wl_data_device_manager::DndAction,
        wl_data_source::WlDataSource, wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm,
        wl_surface,
    },
    Connection, Proxy, QueueHandle,
};

/// Mouse button constants
const BTN_LEFT: u32 = 272;
const BTN_RIGHT: u32 = 273;
const BTN_MIDDLE: u32 = 274;

/// Minimum window size
const MIN_SIZE: u32 = 1;

/// Maximum window size to prevent buffer allocation failures
const MAX_SIZE: u32 = 8192;

/// Maximum buffer size (256MB to avoid Wayland buffer issues)
const MAX_BUFFER_SIZE: usize = 256 * 1024 * 1024;

/// Texture owner chosen at startup
enum Backend {
    Gpu(WgpuRenderer),
    Cpu(CpuRenderer),
}

impl Backend {
    fn renderer(&mut self) -> &mut dyn Renderer {
        match self {
            Backend::Gpu(renderer) => renderer,
            Backend::Cpu(renderer) => renderer,
        }
    }
}

/// Maps the drag handshake onto a `wl_data_offer`
struct OfferTransport<'a> {
    offer: &'a DragOffer,
    payload: Option<io::Result<ReadPipe>>,
}

impl<'a> OfferTransport<'a> {
    fn new(offer: &'a DragOffer) -> Self {
        Self {
            offer,
            payload: None,
        }
    }
}

impl DropTransport for OfferTransport<'_> {
    fn fetch_type_list(&mut self, _source: SourceId) -> Vec<String> {
        self.offer.with_mime_types(|types| types.to_vec())
    }

    fn send_status(&mut self, _source: SourceId, status: DropStatus) {
        match status {
            DropStatus::Accept { mime } => {
                self.offer.accept_mime_type(self.offer.serial, Some(mime));
                self.offer.set_actions(DndAction::Copy, DndAction::Copy);
            }
            DropStatus::Reject => {
                self.offer.accept_mime_type(self.offer.serial, None);
                self.offer.set_actions(DndAction::empty(), DndAction::empty());
            }
        }
    }

    fn request_payload(&mut self, _source: SourceId, mime: &str, timestamp: u32) {
        debug!("Requesting {} payload (time {})", mime, timestamp);
        self.payload = Some(self.offer.receive(mime.to_string()));
    }
}

fn drop_action(actions: DndAction) -> DropAction {
    if actions.contains(DndAction::Copy) {
        DropAction::Copy
    } else if actions.contains(DndAction::Move) {
        DropAction::Move
    } else if actions.contains(DndAction::Ask) {
        DropAction::Ask
    } else {
        DropAction::Other
    }
}

fn cursor_icon(shape: CursorShape) -> CursorIcon {
    match shape {
        CursorShape::Default => CursorIcon::Default,
        CursorShape::Move => CursorIcon::Move,
        CursorShape::Scale => CursorIcon::NwseResize,
        CursorShape::Grab => CursorIcon::Grabbing,
    }
}

/// Main Wayland application state
struct WaylandApp {
    // Registry state
    registry_state: RegistryState,
    // Seat state for input handling
    seat_state: SeatState,
    // Output state for display info
    output_state: OutputState,
    // Shared memory for buffer allocation
    shm: Shm,
    // Layer shell for overlay windows
    layer_shell: LayerShell,
    // Compositor state
    compositor_state: CompositorState,
    // Drag and drop, absent on compositors without a data device manager
    data_device_manager: Option<DataDeviceManagerState>,
    data_device: Option<DataDevice>,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut std::ffi::c_void,

    // Board state
    board: Board,
    should_exit: bool,

    // Surface and buffer management
    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    width: u32,
    height: u32,
    configured: bool,

    // Input
    themed_pointer: Option<ThemedPointer<PointerData>>,
    cursor: CursorShape,
    modifiers: ModMask,
    scroll: ScrollSteps,

    // Drag and drop
    drag_source: SourceId,
    drag_actions: DndAction,

    // Last input region handed to the compositor
    applied_region: Option<VisibleRegion>,

    // Redraw flag
    needs_redraw: bool,

    // Rendering
    use_gpu: bool,
    backend: Option<Backend>,
}

impl WaylandApp {
    /// Create a new Wayland application
    fn new(
        registry_state: RegistryState,
        seat_state: SeatState,
        output_state: OutputState,
        shm: Shm,
        layer_shell: LayerShell,
        compositor_state: CompositorState,
        data_device_manager: Option<DataDeviceManagerState>,
        display_ptr: *mut std::ffi::c_void,
        board: Board,
        use_gpu: bool,
    ) -> Self {
        let (width, height) = board.view().size();
        Self {
            registry_state,
            seat_state,
            output_state,
            shm,
            layer_shell,
            compositor_state,
            data_device_manager,
            data_device: None,
            display_ptr,
            board,
            should_exit: false,
            layer_surface: None,
            pool: None,
            buffer: None,
            width,
            height,
            configured: false,
            themed_pointer: None,
            cursor: CursorShape::Default,
            modifiers: ModMask::empty(),
            scroll: ScrollSteps::default(),
            drag_source: 0,
            drag_actions: DndAction::empty(),
            applied_region: None,
            needs_redraw: false,
            use_gpu,
            backend: None,
        }
    }

    /// Initialize the GPU renderer, falling back to CPU rendering
    fn init_backend(&mut self) {
        if self.backend.is_some() {
            return;
        }
        if self.use_gpu {
            match self.init_gpu_renderer() {
                Ok(renderer) => {
                    info!("GPU renderer initialized successfully");
                    self.backend = Some(Backend::Gpu(renderer));
                    return;
                }
                Err(e) => {
                    warn!("Failed to initialize GPU renderer: {:?}", e);
                    warn!("Falling back to CPU rendering");
                    self.use_gpu = false;
                }
            }
        }
        self.backend = Some(Backend::Cpu(CpuRenderer::new()));
    }

    fn init_gpu_renderer(&self) -> Result<WgpuRenderer> {
        let layer_surface = self.layer_surface.as_ref().context("No layer surface")?;

        // Get raw pointers from Wayland objects
        // With wayland-backend client_system feature, ObjectId.as_ptr() is available
        let wl_surface = layer_surface.wl_surface();
        let surface_ptr = wl_surface.id().as_ptr() as *mut std::ffi::c_void;

        info!("Initializing GPU renderer...");
        debug!("  Surface ptr: {:?}", surface_ptr);
        debug!("  Display ptr: {:?}", self.display_ptr);
        info!("  Size: {}x{}", self.width, self.height);

        WgpuRenderer::new(self.display_ptr, surface_ptr, self.width, self.height)
    }

    /// Load the session file and command line images, in that order
    fn load_startup_images(&mut self, args: &ParsedArgs) {
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        self.board.load_session(backend.renderer());
        self.board.load_all(backend.renderer(), &args.requests);
        info!("Board holds {} image(s)", self.board.store().len());
        self.needs_redraw = true;
    }

    /// Resolve pending input into a frame and present it
    fn update(&mut self, conn: &Connection) {
        if !self.configured || self.layer_surface.is_none() {
            return;
        }

        let frame = self.board.frame();

        if let Some(shape) = frame.cursor {
            self.cursor = shape;
            self.apply_cursor(conn);
        }
        if self.applied_region.as_ref() != Some(&frame.region) {
            self.apply_region(&frame.region);
        }

        self.draw(&frame);
        self.needs_redraw = false;
    }

    fn apply_cursor(&self, conn: &Connection) {
        if let Some(pointer) = &self.themed_pointer {
            if let Err(e) = pointer.set_cursor(conn, cursor_icon(self.cursor)) {
                debug!("Failed to set cursor: {}", e);
            }
        }
    }

    /// Hand the visible region to the compositor as the input region
    fn apply_region(&mut self, region: &VisibleRegion) {
        let Some(layer_surface) = &self.layer_surface else {
            return;
        };
        let surface = layer_surface.wl_surface();
        match region {
            VisibleRegion::Full(_) => surface.set_input_region(None),
            VisibleRegion::Clipped(rects) => match Region::new(&self.compositor_state) {
                Ok(wl_region) => {
                    for rect in rects {
                        wl_region.add(rect.x, rect.y, rect.width, rect.height);
                    }
                    surface.set_input_region(Some(wl_region.wl_region()));
                }
                Err(e) => {
                    error!("Failed to create input region: {}", e);
                    return;
                }
            },
        }
        debug!("Input region: {} rect(s)", region.rects().len());
        self.applied_region = Some(region.clone());
    }

    fn draw(&mut self, frame: &Frame) {
        match self.backend.as_mut() {
            Some(Backend::Gpu(renderer)) => match renderer.render(frame) {
                Ok(true) => {
                    // Commit the surface to show the frame
                    if let Some(ref layer_surface) = self.layer_surface {
                        layer_surface.wl_surface().commit();
                    }
                }
                Ok(false) => {
                    // Skipped frame, try again on the next batch
                    self.needs_redraw = true;
                }
                Err(e) => {
                    warn!("GPU render error: {:?}", e);
                }
            },
            Some(Backend::Cpu(_)) => self.draw_cpu(frame),
            None => {}
        }
    }

    /// Draw using CPU (shared memory buffer)
    fn draw_cpu(&mut self, frame: &Frame) {
        // Clamp window size to prevent buffer allocation failures
        let width = frame.width.clamp(MIN_SIZE, MAX_SIZE);
        let height = frame.height.clamp(MIN_SIZE, MAX_SIZE);

        // Calculate buffer size (4 bytes per pixel for ARGB)
        let stride = width as i32 * 4;
        let buffer_size = width as usize * height as usize * 4;

        // Check if buffer size is reasonable
        if buffer_size > MAX_BUFFER_SIZE {
            error!(
                "Buffer size too large: {} bytes, max: {} bytes",
                buffer_size, MAX_BUFFER_SIZE
            );
            return;
        }

        // Initialize pool if needed
        if self.pool.is_none() {
            match SlotPool::new(buffer_size, &self.shm) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    error!(
                        "Failed to create slot pool: {}. Buffer size: {} bytes",
                        e, buffer_size
                    );
                    return;
                }
            }
        }

        let (Some(pool), Some(Backend::Cpu(renderer)), Some(layer_surface)) =
            (self.pool.as_mut(), self.backend.as_ref(), self.layer_surface.as_ref())
        else {
            return;
        };

        // Resize pool if needed
        if pool.len() < buffer_size {
            if let Err(e) = pool.resize(buffer_size) {
                error!("Failed to resize pool to {} bytes: {}", buffer_size, e);
                self.pool = None;
                return;
            }
        }

        // Create buffer
        let (buffer, canvas) = match pool.create_buffer(
            width as i32,
            height as i32,
            stride,
            wl_shm::Format::Argb8888,
        ) {
            Ok(buf) => buf,
            Err(e) => {
                error!("Failed to create buffer {}x{}: {}", width, height, e);
                return;
            }
        };

        renderer.draw(frame, canvas, width, height);

        // Attach and commit
        let surface = layer_surface.wl_surface();
        if let Err(e) = buffer.attach_to(surface) {
            error!("Failed to attach buffer: {}", e);
            return;
        }
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
    }

    fn bind_data_device(&mut self, qh: &QueueHandle<Self>, seat: &wl_seat::WlSeat) {
        if self.data_device.is_some() {
            return;
        }
        if let Some(manager) = &self.data_device_manager {
            self.data_device = Some(manager.get_data_device(qh, seat));
        }
    }

    fn current_drag_offer(&self) -> Option<DragOffer> {
        self.data_device.as_ref()?.data().drag_offer()
    }

    /// Reply to the drag source for the current pointer position
    fn answer_drag_position(&mut self) {
        let Some(offer) = self.current_drag_offer() else {
            return;
        };
        let mut transport = OfferTransport::new(&offer);
        let action = drop_action(self.drag_actions);
        self.board
            .drop_ingest_mut()
            .position(self.drag_source, action, &mut transport);
    }
}

// Implement required traits for smithay-client-toolkit

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
        if self.needs_redraw {
            self.update(conn);
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        // Zero means the compositor leaves the size to us
        if configure.new_size.0 > 0 {
            self.width = configure.new_size.0;
        }
        if configure.new_size.1 > 0 {
            self.height = configure.new_size.1;
        }
        self.board.resize(
            i32::try_from(self.width).unwrap_or(i32::MAX),
            i32::try_from(self.height).unwrap_or(i32::MAX),
        );

        self.configured = true;
        self.needs_redraw = true;
    }
}

impl SeatHandler for WaylandApp {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, seat: wl_seat::WlSeat) {
        debug!("New seat");
        self.bind_data_device(qh, &seat);
    }

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);
        self.bind_data_device(qh, &seat);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
        if capability == Capability::Pointer && self.themed_pointer.is_none() {
            let cursor_surface = self.compositor_state.create_surface(qh);
            match self.seat_state.get_pointer_with_theme(
                qh,
                &seat,
                self.shm.wl_shm(),
                cursor_surface,
                ThemeSpec::default(),
            ) {
                Ok(pointer) => self.themed_pointer = Some(pointer),
                Err(e) => error!("Failed to get pointer: {}", e),
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("Capability removed: {:?}", capability);
        if capability == Capability::Pointer {
            if let Some(pointer) = self.themed_pointer.take() {
                pointer.pointer().release();
            }
        }
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {
        debug!("Seat removed");
    }
}

impl KeyboardHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
        _raw: &[u32],
        _keysyms: &[Keysym],
    ) {
        debug!("Keyboard entered surface");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard left surface");
    }

    fn press_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        event: KeyEvent,
    ) {
        debug!("Key pressed: {:?}", event.keysym);

        match self.board.handle_key(event.keysym, self.modifiers) {
            Some(BoardAction::Quit) => {
                info!("Exit key pressed");
                self.should_exit = true;
            }
            Some(_) => self.needs_redraw = true,
            None => {}
        }
    }

    fn release_key(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        _event: KeyEvent,
    ) {
    }

    fn update_modifiers(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _serial: u32,
        modifiers: Modifiers,
        _layout: u32,
    ) {
        self.modifiers = ModMask::from(&modifiers);
    }
}

impl PointerHandler for WaylandApp {
    fn pointer_frame(
        &mut self,
        conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            let (x, y) = event.position;
            match event.kind {
                PointerEventKind::Enter { .. } => {
                    debug!("Pointer entered");
                    self.board.pointer_enter(x, y);
                    self.apply_cursor(conn);
                }
                PointerEventKind::Leave { .. } => {
                    debug!("Pointer left");
                    self.board.pointer_leave();
                }
                PointerEventKind::Motion { .. } => {
                    self.board.pointer_motion(x, y);
                }
                PointerEventKind::Press { button, .. } | PointerEventKind::Release { button, .. } => {
                    let down = matches!(event.kind, PointerEventKind::Press { .. });
                    let button = match button {
                        BTN_LEFT => PointerButton::Primary,
                        BTN_RIGHT => PointerButton::Secondary,
                        BTN_MIDDLE => PointerButton::Tertiary,
                        other => {
                            debug!("Ignoring pointer button {}", other);
                            continue;
                        }
                    };
                    self.board.pointer_button(button, down);
                }
                PointerEventKind::Axis { vertical, .. } => {
                    // Scroll to zoom, up zooms in
                    let steps = self.scroll.feed(vertical.discrete, vertical.absolute);
                    if steps != 0 {
                        self.board.scroll(steps);
                    }
                    if vertical.stop {
                        self.scroll.stop();
                    }
                }
            }
            self.needs_redraw = true;
        }
    }
}

impl DataDeviceHandler for WaylandApp {
    fn enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
        _x: f64,
        _y: f64,
        _surface: &wl_surface::WlSurface,
    ) {
        let Some(offer) = self.current_drag_offer() else {
            return;
        };
        self.drag_source = self.drag_source.wrapping_add(1);
        let enter = DropEnter {
            source: self.drag_source,
            version: offer.inner().version(),
            types: TypeList::Inline(offer.with_mime_types(|types| types.to_vec())),
        };
        let mut transport = OfferTransport::new(&offer);
        self.board.drop_ingest_mut().enter(enter, &mut transport);
        self.answer_drag_position();
    }

    fn leave(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _data_device: &WlDataDevice) {
        debug!("Drag left in phase {:?}", self.board.drop_ingest_mut().phase());
        self.board.drop_ingest_mut().leave();
        self.drag_actions = DndAction::empty();
    }

    fn motion(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
        _x: f64,
        _y: f64,
    ) {
        self.answer_drag_position();
    }

    fn selection(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
    ) {
    }

    fn drop_performed(
        &mut self,
        conn: &Connection,
        _qh: &QueueHandle<Self>,
        _data_device: &WlDataDevice,
    ) {
        let Some(offer) = self.current_drag_offer() else {
            return;
        };
        debug!(
            "Drop performed, matched type {:?}",
            self.board.drop_ingest_mut().matched_type()
        );
        let mut transport = OfferTransport::new(&offer);
        let requested = self.board.drop_ingest_mut().perform_drop(
            self.drag_source,
            offer.time.unwrap_or(0),
            &mut transport,
        );
        let payload = transport.payload.take();
        self.drag_actions = DndAction::empty();
        if !requested {
            offer.destroy();
            return;
        }

        let mut data = Vec::new();
        let received = match payload {
            Some(Ok(mut pipe)) => {
                // the source only starts writing once the request is sent
                if let Err(e) = conn.flush() {
                    warn!("Failed to flush connection: {}", e);
                }
                pipe.read_to_end(&mut data)
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        };
        offer.finish();
        offer.destroy();

        match received {
            Ok(_) => {
                if let Some(backend) = self.backend.as_mut() {
                    let loaded = self.board.accept_drop_payload(backend.renderer(), &data);
                    info!("Dropped {} image(s)", loaded);
                }
            }
            Err(e) => {
                error!("Failed to read drop payload: {}", e);
                self.board.drop_ingest_mut().leave();
            }
        }
        self.needs_redraw = true;
    }
}

impl DataOfferHandler for WaylandApp {
    fn source_actions(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _offer: &mut DragOffer,
        actions: DndAction,
    ) {
        self.drag_actions = actions;
        self.answer_drag_position();
    }

    fn selected_action(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _offer: &mut DragOffer,
        actions: DndAction,
    ) {
        debug!("Compositor selected drag action {:?}", actions);
    }
}

// We never offer data ourselves
impl DataSourceHandler for WaylandApp {
    fn accept_mime(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _mime: Option<String>,
    ) {
    }

    fn send_request(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _mime: String,
        _fd: WritePipe,
    ) {
    }

    fn cancelled(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _source: &WlDataSource) {}

    fn dnd_dropped(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _source: &WlDataSource) {
    }

    fn dnd_finished(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _source: &WlDataSource) {
    }

    fn action(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _source: &WlDataSource,
        _action: DndAction,
    ) {
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState, SeatState];
}

// Delegate macros
delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_seat!(WaylandApp);
delegate_keyboard!(WaylandApp);
delegate_pointer!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_data_device!(WaylandApp);
delegate_registry!(WaylandApp);

/// Run the board until it is closed
pub fn run(args: ParsedArgs, config: Config) -> Result<()> {
    info!("Connecting to Wayland display");

    // Connect to Wayland display
    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    // Initialize registry and event queue
    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    // Initialize required globals
    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("Failed to bind layer shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;
    let data_device_manager = match DataDeviceManagerState::bind(&globals, &qh) {
        Ok(manager) => Some(manager),
        Err(e) => {
            warn!("Drag and drop unavailable: {}", e);
            None
        }
    };

    // Get the display pointer for GPU rendering
    let display_ptr = conn.backend().display_ptr() as *mut std::ffi::c_void;

    let board = Board::new(config, args.session_file.clone(), args.program.clone());

    // Create application state
    let mut app = WaylandApp::new(
        RegistryState::new(&globals),
        SeatState::new(&globals, &qh),
        OutputState::new(&globals, &qh),
        shm,
        layer_shell,
        compositor_state,
        data_device_manager,
        display_ptr,
        board,
        args.use_gpu,
    );

    // Create the layer surface
    let surface = app.compositor_state.create_surface(&qh);
    let layer_surface = app.layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Overlay,
        Some("refpin"),
        None,
    );
    layer_surface.set_size(app.width, app.height);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::OnDemand);

    // Commit the surface to trigger configure
    layer_surface.commit();

    app.layer_surface = Some(layer_surface);

    while !app.configured {
        event_queue.blocking_dispatch(&mut app)?;
        if app.should_exit {
            return Ok(());
        }
    }

    app.init_backend();
    app.load_startup_images(&args);

    info!("Starting event loop");
    info!("Controls: Left-drag to move, Right-drag to scale, Middle-drag to pan, Scroll to zoom");
    info!("Keys: 0/Home reset zoom, S save session, B toggle shape, Esc/Q quit");

    // Main event loop
    loop {
        if app.needs_redraw {
            app.update(&conn);
        }

        event_queue.blocking_dispatch(&mut app)?;

        if app.should_exit {
            info!("Exiting application");
            break;
        }
    }

    if let Some(backend) = app.backend.as_mut() {
        app.board.teardown(backend.renderer());
    }

    Ok(())
}
