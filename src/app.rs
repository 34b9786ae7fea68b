// Application state module
// The frame's window state machine, independent of any display protocol

use crate::config::Settings;
use log::{debug, info};

/// Minimum window edge length
pub const MIN_SIZE: u32 = 50;

/// Maximum window edge length to keep buffer allocations sane
pub const MAX_SIZE: u32 = 4096;

/// Opacity change per unit step
const OPACITY_STEP: f32 = 0.1;

/// Step multiplier while shift is held
const FAST_STEP: i32 = 10;

/// Arrow key directions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Left,
    Right,
    Up,
    Down,
}

impl Arrow {
    /// Unit vector in window coordinates (y grows downwards)
    fn delta(self) -> (i32, i32) {
        match self {
            Arrow::Left => (-1, 0),
            Arrow::Right => (1, 0),
            Arrow::Up => (0, -1),
            Arrow::Down => (0, 1),
        }
    }
}

/// Modifier keys relevant to arrow handling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyModifiers {
    pub shift: bool,
    pub alt: bool,
    /// Logo or Ctrl
    pub meta: bool,
}

/// What an arrow press does, decided once from the modifier set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Resize,
    AdjustOpacity,
    Move,
}

impl KeyMode {
    /// Alt wins over meta; anything else moves
    pub fn from_modifiers(modifiers: KeyModifiers) -> Self {
        if modifiers.alt {
            KeyMode::Resize
        } else if modifiers.meta {
            KeyMode::AdjustOpacity
        } else {
            KeyMode::Move
        }
    }
}

/// Keys the frame reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Arrow(Arrow),
    ToggleVisibility,
    Quit,
}

/// What the window has to do after a key press
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOutcome {
    /// State changed and must be written to the settings file
    pub persist: bool,
    /// Opacity changed; geometry changes are redrawn by the window itself
    pub redraw: bool,
    pub quit: bool,
}

/// Opacity toggle state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    Normal { opacity: f32 },
    Hidden { saved_opacity: f32 },
}

/// Mouse drag state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    Dragging {
        /// Pointer position inside the window when the button went down
        offset: (f64, f64),
        /// Whether the window has moved since the press
        moved: bool,
    },
}

/// Main window state
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    visibility: Visibility,
    drag: DragState,
}

impl OverlayState {
    /// Create state from persisted settings, bringing out-of-range values
    /// back into bounds
    pub fn new(settings: &Settings) -> Self {
        Self {
            x: settings.x,
            y: settings.y,
            width: settings.width.clamp(MIN_SIZE, MAX_SIZE),
            height: settings.height.clamp(MIN_SIZE, MAX_SIZE),
            visibility: Visibility::Normal {
                opacity: clamp_opacity(settings.opacity),
            },
            drag: DragState::Idle,
        }
    }

    /// Opacity currently applied to the window
    pub fn opacity(&self) -> f32 {
        match self.visibility {
            Visibility::Normal { opacity } => opacity,
            Visibility::Hidden { .. } => 0.0,
        }
    }

    /// State to persist. While hidden, the remembered opacity is written so
    /// the next launch starts visible.
    pub fn settings(&self) -> Settings {
        let opacity = match self.visibility {
            Visibility::Normal { opacity } => opacity,
            Visibility::Hidden { saved_opacity } => saved_opacity,
        };
        Settings {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            opacity,
        }
    }

    /// Apply a key press. Every state change asks for an immediate save.
    pub fn handle_key(&mut self, action: KeyAction, modifiers: KeyModifiers) -> KeyOutcome {
        match action {
            KeyAction::Arrow(arrow) => {
                let mode = self.handle_arrow(arrow, modifiers);
                debug!("{:?} {:?} with {:?}", mode, arrow, modifiers);
                KeyOutcome {
                    persist: true,
                    redraw: mode == KeyMode::AdjustOpacity,
                    quit: false,
                }
            }
            KeyAction::ToggleVisibility => {
                self.toggle_visibility();
                KeyOutcome {
                    persist: true,
                    redraw: true,
                    quit: false,
                }
            }
            KeyAction::Quit => KeyOutcome {
                quit: true,
                ..KeyOutcome::default()
            },
        }
    }

    /// Handle an arrow key press and return the mode that was applied
    pub fn handle_arrow(&mut self, arrow: Arrow, modifiers: KeyModifiers) -> KeyMode {
        let step = if modifiers.shift { FAST_STEP } else { 1 };
        let (dx, dy) = arrow.delta();
        let (dx, dy) = (dx * step, dy * step);

        let mode = KeyMode::from_modifiers(modifiers);
        match mode {
            KeyMode::Resize => {
                self.width = resize_edge(self.width, dx);
                self.height = resize_edge(self.height, dy);
                debug!("Resized to {}x{}", self.width, self.height);
            }
            KeyMode::AdjustOpacity => {
                self.adjust_opacity(OPACITY_STEP * (dx + dy) as f32);
            }
            KeyMode::Move => {
                self.x = self.x.saturating_add(dx);
                self.y = self.y.saturating_add(dy);
                debug!("Moved to ({}, {})", self.x, self.y);
            }
        }
        mode
    }

    /// Add `delta` to the visible opacity, clamped to [0, 1]. Adjusting while
    /// hidden starts from the remembered value and shows the window again.
    pub fn adjust_opacity(&mut self, delta: f32) {
        let base = match self.visibility {
            Visibility::Normal { opacity } => opacity,
            Visibility::Hidden { saved_opacity } => saved_opacity,
        };
        let opacity = clamp_opacity(base + delta);
        self.visibility = Visibility::Normal { opacity };
        info!("opacity = {:.2}", opacity);
    }

    /// Flip between the current opacity and fully transparent
    pub fn toggle_visibility(&mut self) {
        self.visibility = match self.visibility {
            Visibility::Normal { opacity } => {
                info!("Hiding frame (saved opacity {:.2})", opacity);
                Visibility::Hidden {
                    saved_opacity: opacity,
                }
            }
            Visibility::Hidden { saved_opacity } => {
                info!("Showing frame at opacity {:.2}", saved_opacity);
                Visibility::Normal {
                    opacity: saved_opacity,
                }
            }
        };
    }

    /// Left button pressed at window-local `pos`
    pub fn begin_drag(&mut self, pos: (f64, f64)) {
        self.drag = DragState::Dragging {
            offset: pos,
            moved: false,
        };
    }

    /// Pointer moved to window-local `pos`. The screen position is
    /// `origin + pos`, and the new origin keeps the grab offset under the
    /// pointer. Returns true when the window moved.
    pub fn drag_to(&mut self, pos: (f64, f64)) -> bool {
        let DragState::Dragging { offset, .. } = self.drag else {
            return false;
        };

        let dx = (pos.0 - offset.0).round() as i32;
        let dy = (pos.1 - offset.1).round() as i32;
        if dx == 0 && dy == 0 {
            return false;
        }

        self.x = self.x.saturating_add(dx);
        self.y = self.y.saturating_add(dy);
        self.drag = DragState::Dragging {
            offset,
            moved: true,
        };
        true
    }

    /// Button released or pointer lost. Returns true when the drag moved the
    /// window and the new position should be persisted.
    pub fn end_drag(&mut self) -> bool {
        let moved = matches!(self.drag, DragState::Dragging { moved: true, .. });
        self.drag = DragState::Idle;
        moved
    }
}

fn clamp_opacity(opacity: f32) -> f32 {
    if opacity.is_nan() {
        return Settings::default().opacity;
    }
    opacity.clamp(0.0, 1.0)
}

fn resize_edge(length: u32, delta: i32) -> u32 {
    (length as i64 + delta as i64).clamp(MIN_SIZE as i64, MAX_SIZE as i64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use tempfile::TempDir;

    const NONE: KeyModifiers = KeyModifiers {
        shift: false,
        alt: false,
        meta: false,
    };
    const SHIFT: KeyModifiers = KeyModifiers {
        shift: true,
        ..NONE
    };
    const ALT: KeyModifiers = KeyModifiers { alt: true, ..NONE };
    const META: KeyModifiers = KeyModifiers { meta: true, ..NONE };
    const ALT_SHIFT: KeyModifiers = KeyModifiers {
        alt: true,
        shift: true,
        meta: false,
    };
    const META_SHIFT: KeyModifiers = KeyModifiers {
        meta: true,
        shift: true,
        alt: false,
    };

    fn state() -> OverlayState {
        OverlayState::new(&Settings::default())
    }

    #[test]
    fn test_initial_state_from_defaults() {
        let s = state();
        assert_eq!((s.x, s.y, s.width, s.height), (100, 100, 720, 1000));
        assert_eq!(s.opacity(), 0.55);
        assert_eq!(s.drag, DragState::Idle);
        assert_eq!(s.settings(), Settings::default());
    }

    #[test]
    fn test_loaded_values_are_brought_into_range() {
        let s = OverlayState::new(&Settings {
            width: 1,
            height: 100_000,
            opacity: 3.0,
            ..Settings::default()
        });
        assert_eq!((s.width, s.height), (MIN_SIZE, MAX_SIZE));
        assert_eq!(s.opacity(), 1.0);

        let s = OverlayState::new(&Settings {
            opacity: f32::NAN,
            ..Settings::default()
        });
        assert_eq!(s.opacity(), 0.55);
    }

    #[test]
    fn test_mode_precedence() {
        assert_eq!(KeyMode::from_modifiers(NONE), KeyMode::Move);
        assert_eq!(KeyMode::from_modifiers(SHIFT), KeyMode::Move);
        assert_eq!(KeyMode::from_modifiers(META), KeyMode::AdjustOpacity);
        assert_eq!(KeyMode::from_modifiers(ALT), KeyMode::Resize);
        let both = KeyModifiers {
            alt: true,
            meta: true,
            shift: true,
        };
        assert_eq!(KeyMode::from_modifiers(both), KeyMode::Resize);
    }

    #[test]
    fn test_arrows_move_window() {
        let mut s = state();
        s.handle_arrow(Arrow::Right, NONE);
        s.handle_arrow(Arrow::Up, NONE);
        assert_eq!((s.x, s.y), (101, 99));

        s.handle_arrow(Arrow::Left, NONE);
        s.handle_arrow(Arrow::Down, NONE);
        assert_eq!((s.x, s.y), (100, 100));
    }

    #[test]
    fn test_shift_right_moves_ten_pixels() {
        let mut s = state();
        let mode = s.handle_arrow(Arrow::Right, SHIFT);
        assert_eq!(mode, KeyMode::Move);
        assert_eq!(s.x, 110);
        assert_eq!(s.settings().x, 110);
    }

    #[test]
    fn test_alt_arrows_resize() {
        let mut s = state();
        s.handle_arrow(Arrow::Right, ALT);
        s.handle_arrow(Arrow::Up, ALT);
        assert_eq!((s.width, s.height), (721, 999));
        assert_eq!((s.x, s.y), (100, 100));

        s.handle_arrow(Arrow::Left, ALT_SHIFT);
        s.handle_arrow(Arrow::Down, ALT_SHIFT);
        assert_eq!((s.width, s.height), (711, 1009));
    }

    #[test]
    fn test_resize_stays_within_bounds() {
        let mut s = OverlayState::new(&Settings {
            width: MIN_SIZE,
            height: MAX_SIZE,
            ..Settings::default()
        });
        s.handle_arrow(Arrow::Left, ALT_SHIFT);
        s.handle_arrow(Arrow::Down, ALT_SHIFT);
        assert_eq!((s.width, s.height), (MIN_SIZE, MAX_SIZE));
    }

    #[test]
    fn test_meta_arrows_adjust_opacity() {
        let mut s = state();
        s.handle_arrow(Arrow::Right, META);
        assert!((s.opacity() - 0.65).abs() < 1e-5);
        s.handle_arrow(Arrow::Up, META);
        s.handle_arrow(Arrow::Up, META);
        assert!((s.opacity() - 0.45).abs() < 1e-5);
        s.handle_arrow(Arrow::Down, META);
        assert!((s.opacity() - 0.55).abs() < 1e-5);
        assert_eq!((s.x, s.y, s.width, s.height), (100, 100, 720, 1000));
    }

    #[test]
    fn test_opacity_clamps_at_both_ends() {
        let mut s = state();
        for _ in 0..25 {
            s.handle_arrow(Arrow::Right, META);
            assert!((0.0..=1.0).contains(&s.opacity()));
        }
        assert_eq!(s.opacity(), 1.0);

        for _ in 0..25 {
            s.handle_arrow(Arrow::Left, META);
            assert!((0.0..=1.0).contains(&s.opacity()));
        }
        assert_eq!(s.opacity(), 0.0);

        s.handle_arrow(Arrow::Down, META_SHIFT);
        assert_eq!(s.opacity(), 1.0);
        s.handle_arrow(Arrow::Up, META_SHIFT);
        assert_eq!(s.opacity(), 0.0);
    }

    #[test]
    fn test_toggle_is_involutive() {
        for v in [0.0, 0.1, 0.25, 0.55, 0.999, 1.0] {
            let mut s = OverlayState::new(&Settings {
                opacity: v,
                ..Settings::default()
            });
            s.toggle_visibility();
            assert_eq!(s.opacity(), 0.0);
            assert_eq!(s.visibility, Visibility::Hidden { saved_opacity: v });
            s.toggle_visibility();
            assert_eq!(s.visibility, Visibility::Normal { opacity: v });
        }
    }

    #[test]
    fn test_hidden_state_persists_saved_opacity() {
        let mut s = state();
        s.toggle_visibility();
        assert_eq!(s.settings().opacity, 0.55);
    }

    #[test]
    fn test_adjust_while_hidden_restores_from_saved() {
        let mut s = state();
        s.toggle_visibility();
        s.handle_arrow(Arrow::Right, META);
        assert!((s.opacity() - 0.65).abs() < 1e-5);
        assert!(matches!(s.visibility, Visibility::Normal { .. }));
    }

    #[test]
    fn test_drag_keeps_grab_offset_under_pointer() {
        let mut s = state();
        s.begin_drag((30.0, 40.0));

        // Pointer moved 5px right, 2px down on screen
        assert!(s.drag_to((35.0, 42.0)));
        assert_eq!((s.x, s.y), (105, 102));

        // The surface followed, so local coordinates are back at the offset
        assert!(!s.drag_to((30.0, 40.0)));
        assert_eq!((s.x, s.y), (105, 102));

        assert!(s.drag_to((10.0, 40.0)));
        assert_eq!((s.x, s.y), (85, 102));

        assert!(s.end_drag());
        assert_eq!(s.drag, DragState::Idle);
    }

    #[test]
    fn test_motion_without_press_is_ignored() {
        let mut s = state();
        assert!(!s.drag_to((500.0, 500.0)));
        assert_eq!((s.x, s.y), (100, 100));
        assert!(!s.end_drag());
    }

    #[test]
    fn test_click_without_motion_does_not_persist() {
        let mut s = state();
        s.begin_drag((10.0, 10.0));
        assert!(!s.drag_to((10.2, 9.8)));
        assert!(!s.end_drag());
    }

    #[test]
    fn test_moves_saturate_at_coordinate_limits() {
        let mut s = OverlayState::new(&Settings {
            x: i32::MAX,
            y: i32::MIN,
            ..Settings::default()
        });
        s.handle_arrow(Arrow::Right, SHIFT);
        s.handle_arrow(Arrow::Up, NONE);
        assert_eq!((s.x, s.y), (i32::MAX, i32::MIN));

        s.begin_drag((10.0, 10.0));
        assert!(s.drag_to((15.0, 5.0)));
        assert_eq!((s.x, s.y), (i32::MAX, i32::MIN));
    }

    #[test]
    fn test_every_key_change_requests_save() {
        let mut s = state();
        for modifiers in [NONE, SHIFT, ALT, META, ALT_SHIFT, META_SHIFT] {
            let outcome = s.handle_key(KeyAction::Arrow(Arrow::Left), modifiers);
            assert!(outcome.persist, "arrow with {:?} must be saved", modifiers);
            assert!(!outcome.quit);
        }

        let outcome = s.handle_key(KeyAction::ToggleVisibility, NONE);
        assert_eq!(
            outcome,
            KeyOutcome {
                persist: true,
                redraw: true,
                quit: false
            }
        );

        let outcome = s.handle_key(KeyAction::Quit, NONE);
        assert!(outcome.quit);
        assert!(!outcome.persist);
    }

    #[test]
    fn test_opacity_keys_redraw_and_moves_do_not() {
        let mut s = state();
        assert!(s.handle_key(KeyAction::Arrow(Arrow::Up), META).redraw);
        assert!(!s.handle_key(KeyAction::Arrow(Arrow::Up), NONE).redraw);
    }

    #[test]
    fn test_shift_right_is_written_to_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = ConfigFile::new(temp_dir.path().join("frame.conf"));
        let mut s = OverlayState::new(&config.load());

        let outcome = s.handle_key(KeyAction::Arrow(Arrow::Right), SHIFT);
        assert!(outcome.persist);
        config.save(&s.settings()).expect("Failed to save settings");

        let reloaded = config.load();
        assert_eq!(reloaded.x, 110);
        assert_eq!(reloaded, s.settings());
    }
}
