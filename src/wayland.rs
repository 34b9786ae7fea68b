// Wayland integration module
// Hosts the frame in a wlr-layer-shell overlay surface using smithay-client-toolkit

use crate::app::{Arrow, KeyAction, KeyModifiers, OverlayState};
use crate::canvas;
use crate::config::{ConfigFile, Settings};
use crate::image_loader::ImageData;
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState},
    delegate_compositor, delegate_keyboard, delegate_layer, delegate_pointer, delegate_registry,
    delegate_seat, delegate_shm,
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    seat::{
        keyboard::{KeyEvent, KeyboardHandler, Keysym, Modifiers},
        pointer::{PointerEvent, PointerEventKind, PointerHandler},
        Capability, SeatHandler, SeatState,
    },
    shell::{
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use wayland_client::{
    globals::registry_queue_init,
    protocol::{wl_keyboard, wl_output, wl_pointer, wl_seat, wl_shm, wl_surface},
    Connection, Proxy, QueueHandle,
};

/// Left mouse button (linux/input-event-codes.h)
const BTN_LEFT: u32 = 272;

/// Namespace reported to the compositor for the layer surface
const LAYER_NAMESPACE: &str = "seethru";

const ARROW_KEYS: [(Keysym, Arrow); 4] = [
    (Keysym::Left, Arrow::Left),
    (Keysym::Right, Arrow::Right),
    (Keysym::Up, Arrow::Up),
    (Keysym::Down, Arrow::Down),
];

fn key_action(keysym: Keysym) -> Option<KeyAction> {
    if let Some((_, arrow)) = ARROW_KEYS.iter().find(|(k, _)| *k == keysym) {
        Some(KeyAction::Arrow(*arrow))
    } else if keysym == Keysym::h || keysym == Keysym::H {
        Some(KeyAction::ToggleVisibility)
    } else if keysym == Keysym::Escape || keysym == Keysym::q || keysym == Keysym::Q {
        Some(KeyAction::Quit)
    } else {
        None
    }
}

/// Geometry last pushed to the compositor
#[derive(Debug, Clone, Copy, PartialEq)]
struct AppliedGeometry {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

/// The overlay window and its Wayland state
struct FrameWindow {
    registry_state: RegistryState,
    seat_state: SeatState,
    shm: Shm,
    compositor_state: CompositorState,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut std::ffi::c_void,

    image: ImageData,
    state: OverlayState,
    config: ConfigFile,
    modifiers: KeyModifiers,
    should_exit: bool,

    // GPU rendering; the renderer must drop before the layer surface
    use_gpu: bool,
    gpu_renderer: Option<WgpuRenderer>,
    gpu_initialized: bool,

    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    applied: Option<AppliedGeometry>,
    configured: bool,
}

impl FrameWindow {
    fn geometry(&self) -> AppliedGeometry {
        AppliedGeometry {
            x: self.state.x,
            y: self.state.y,
            width: self.state.width,
            height: self.state.height,
        }
    }

    /// Push position and size to the compositor if they changed.
    /// Returns true when the size changed and the frame needs a redraw.
    fn apply_geometry(&mut self) -> bool {
        let target = self.geometry();
        if self.applied == Some(target) {
            return false;
        }
        let Some(layer_surface) = self.layer_surface.as_ref() else {
            return false;
        };

        let resized = self
            .applied
            .map_or(true, |prev| (prev.width, prev.height) != (target.width, target.height));

        layer_surface.set_margin(target.y, 0, 0, target.x);
        if resized {
            layer_surface.set_size(target.width, target.height);
        }
        layer_surface.commit();
        self.applied = Some(target);

        debug!(
            "Geometry: ({}, {}) {}x{}",
            target.x, target.y, target.width, target.height
        );
        resized
    }

    fn persist(&self) {
        self.config.save_or_warn(&self.state.settings());
    }

    fn handle_key(&mut self, keysym: Keysym) {
        let Some(action) = key_action(keysym) else {
            return;
        };

        let outcome = self.state.handle_key(action, self.modifiers);
        if outcome.quit {
            info!("Exit key pressed");
            self.should_exit = true;
            return;
        }
        if self.apply_geometry() || outcome.redraw {
            self.draw();
        }
        if outcome.persist {
            self.persist();
        }
    }

    /// Initialize GPU renderer from the layer surface
    fn init_gpu_renderer(&mut self) {
        self.gpu_initialized = true;

        let Some(layer_surface) = self.layer_surface.as_ref() else {
            warn!("Cannot init GPU: no layer surface");
            self.use_gpu = false;
            return;
        };

        if self.display_ptr.is_null() {
            warn!("Display pointer is null, falling back to CPU rendering");
            self.use_gpu = false;
            return;
        }

        let surface_ptr = layer_surface.wl_surface().id().as_ptr() as *mut std::ffi::c_void;
        let renderer = WgpuRenderer::new(
            self.display_ptr,
            surface_ptr,
            self.state.width,
            self.state.height,
        )
        .and_then(|mut renderer| {
            renderer.upload_texture(&self.image)?;
            Ok(renderer)
        });

        match renderer {
            Ok(renderer) => {
                info!("GPU renderer initialized");
                self.gpu_renderer = Some(renderer);
            }
            Err(e) => {
                warn!("Failed to initialize GPU renderer: {:?}", e);
                warn!("Falling back to CPU rendering");
                self.use_gpu = false;
            }
        }
    }

    /// Draw the frame with the current geometry and opacity
    fn draw(&mut self) {
        if !self.configured || self.layer_surface.is_none() {
            return;
        }

        if self.use_gpu && self.gpu_renderer.is_some() {
            if self.draw_gpu() {
                return;
            }
            warn!("GPU rendering failed, falling back to CPU");
        }

        self.draw_cpu();
    }

    fn draw_gpu(&mut self) -> bool {
        let width = self.state.width;
        let height = self.state.height;
        let opacity = self.state.opacity();
        let image_height = self.image.fitted_height(width);

        let Some(renderer) = self.gpu_renderer.as_mut() else {
            return false;
        };

        renderer.resize(width, height);
        renderer.update_uniforms(opacity, image_height);

        match renderer.render() {
            Ok(true) => {
                if let Some(layer_surface) = self.layer_surface.as_ref() {
                    layer_surface.wl_surface().commit();
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("GPU render error: {:?}", e);
                false
            }
        }
    }

    /// Draw into a shared memory buffer
    fn draw_cpu(&mut self) {
        let width = self.state.width;
        let height = self.state.height;
        let stride = width as i32 * 4;
        let buffer_size = stride as usize * height as usize;

        if self.pool.is_none() {
            match SlotPool::new(buffer_size, &self.shm) {
                Ok(pool) => self.pool = Some(pool),
                Err(e) => {
                    error!("Failed to create slot pool of {} bytes: {}", buffer_size, e);
                    return;
                }
            }
        }
        let Some(pool) = self.pool.as_mut() else {
            return;
        };

        if pool.len() < buffer_size {
            if let Err(e) = pool.resize(buffer_size) {
                error!("Failed to resize pool to {} bytes: {}", buffer_size, e);
                self.pool = None;
                return;
            }
        }

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

        canvas::render_fitted(&self.image, canvas, width, height, self.state.opacity());

        let Some(layer_surface) = self.layer_surface.as_ref() else {
            return;
        };
        let surface = layer_surface.wl_surface();
        if let Err(e) = buffer.attach_to(surface) {
            error!("Failed to attach buffer: {:?}", e);
            return;
        }
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
    }
}

impl CompositorHandler for FrameWindow {
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
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
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

impl LayerShellHandler for FrameWindow {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.should_exit = true;
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        // The frame owns its size; ask again if the compositor suggests another
        let (width, height) = configure.new_size;
        if (width, height) != (0, 0) && (width, height) != (self.state.width, self.state.height) {
            debug!(
                "Compositor suggested {}x{}, keeping {}x{}",
                width, height, self.state.width, self.state.height
            );
            layer.set_size(self.state.width, self.state.height);
            layer.commit();
        }

        self.configured = true;

        if self.use_gpu && !self.gpu_initialized {
            self.init_gpu_renderer();
        }

        self.draw();
    }
}

impl SeatHandler for FrameWindow {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}

    fn new_capability(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        seat: wl_seat::WlSeat,
        capability: Capability,
    ) {
        debug!("New capability: {:?}", capability);

        if capability == Capability::Keyboard {
            if let Err(e) = self.seat_state.get_keyboard(qh, &seat, None) {
                error!("Failed to get keyboard: {}", e);
            }
        }
        if capability == Capability::Pointer {
            if let Err(e) = self.seat_state.get_pointer(qh, &seat) {
                error!("Failed to get pointer: {}", e);
            }
        }
    }

    fn remove_capability(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _seat: wl_seat::WlSeat,
        _capability: Capability,
    ) {
    }

    fn remove_seat(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _seat: wl_seat::WlSeat) {}
}

impl KeyboardHandler for FrameWindow {
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
        debug!("Keyboard focus gained");
    }

    fn leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _keyboard: &wl_keyboard::WlKeyboard,
        _surface: &wl_surface::WlSurface,
        _serial: u32,
    ) {
        debug!("Keyboard focus lost");
        self.modifiers = KeyModifiers::default();
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
        self.handle_key(event.keysym);
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
        self.modifiers = KeyModifiers {
            shift: modifiers.shift,
            alt: modifiers.alt,
            meta: modifiers.logo || modifiers.ctrl,
        };
    }
}

impl PointerHandler for FrameWindow {
    fn pointer_frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _pointer: &wl_pointer::WlPointer,
        events: &[PointerEvent],
    ) {
        for event in events {
            match event.kind {
                PointerEventKind::Press { button, .. } if button == BTN_LEFT => {
                    self.state.begin_drag(event.position);
                }
                PointerEventKind::Motion { .. } => {
                    if self.state.drag_to(event.position) && self.apply_geometry() {
                        self.draw();
                    }
                }
                PointerEventKind::Release { button, .. } if button == BTN_LEFT => {
                    if self.state.end_drag() {
                        self.persist();
                    }
                }
                PointerEventKind::Leave { .. } => {
                    if self.state.end_drag() {
                        self.persist();
                    }
                }
                _ => {}
            }
        }
    }
}

impl ShmHandler for FrameWindow {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for FrameWindow {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![SeatState];
}

delegate_compositor!(FrameWindow);
delegate_layer!(FrameWindow);
delegate_seat!(FrameWindow);
delegate_keyboard!(FrameWindow);
delegate_pointer!(FrameWindow);
delegate_shm!(FrameWindow);
delegate_registry!(FrameWindow);

/// Open the frame and run until it is closed
pub fn run(image: ImageData, config: ConfigFile, settings: Settings, use_gpu: bool) -> Result<()> {
    info!("Connecting to Wayland display");

    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh)
        .context("Failed to bind layer shell (compositor needs wlr-layer-shell)")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;

    let display_ptr = conn.backend().display_ptr() as *mut std::ffi::c_void;

    let state = OverlayState::new(&settings);
    info!(
        "Frame at ({}, {}) size {}x{} opacity {:.2}",
        state.x,
        state.y,
        state.width,
        state.height,
        state.opacity()
    );

    let mut window = FrameWindow {
        registry_state: RegistryState::new(&globals),
        seat_state: SeatState::new(&globals, &qh),
        shm,
        compositor_state,
        display_ptr,
        image,
        state,
        config,
        modifiers: KeyModifiers::default(),
        should_exit: false,
        use_gpu,
        gpu_renderer: None,
        gpu_initialized: false,
        layer_surface: None,
        pool: None,
        buffer: None,
        applied: None,
        configured: false,
    };

    // Overlay layer keeps the frame above regular windows, without decorations
    let surface = window.compositor_state.create_surface(&qh);
    let layer_surface = layer_shell.create_layer_surface(
        &qh,
        surface,
        Layer::Overlay,
        Some(LAYER_NAMESPACE),
        None,
    );
    layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
    layer_surface.set_keyboard_interactivity(KeyboardInteractivity::OnDemand);
    window.layer_surface = Some(layer_surface);

    // First commit triggers the initial configure
    window.apply_geometry();

    info!("Controls: drag to move, arrows move (Shift x10), Alt+arrows resize");
    info!("Ctrl/Super+arrows change opacity, H hides/shows, Esc or Q quits");

    loop {
        event_queue.blocking_dispatch(&mut window)?;

        if window.should_exit {
            info!("Exiting");
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_mapping() {
        assert_eq!(key_action(Keysym::Right), Some(KeyAction::Arrow(Arrow::Right)));
        assert_eq!(key_action(Keysym::Up), Some(KeyAction::Arrow(Arrow::Up)));
        assert_eq!(key_action(Keysym::h), Some(KeyAction::ToggleVisibility));
        assert_eq!(key_action(Keysym::H), Some(KeyAction::ToggleVisibility));
        assert_eq!(key_action(Keysym::x), None);
    }

    #[test]
    fn test_quit_keys_ignore_case() {
        for keysym in [Keysym::Escape, Keysym::q, Keysym::Q] {
            assert_eq!(key_action(keysym), Some(KeyAction::Quit));
        }
    }
}
