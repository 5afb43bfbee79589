use crate::viewer::view::ViewState;
use crate::viewer::window::{WindowId, WindowState};

/// Zoom step applied per wheel notch when nothing else is configured.
pub const DEFAULT_ZOOM_FACTOR: f32 = 1.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    Other(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Control,
    Alt,
    Char(char),
    Other(u32),
}

/// Pixel coordinates are window-relative with the origin at the top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ButtonPress { button: MouseButton, x: i32, y: i32 },
    ButtonRelease { button: MouseButton, x: i32, y: i32 },
    Motion { x: i32, y: i32 },
    KeyPress { key: Key },
    KeyRelease { key: Key },
    Configure { width: u32, height: u32 },
    Expose,
    CloseRequested,
    FocusIn,
    FocusOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub window: WindowId,
    pub kind: InputKind,
}

impl InputEvent {
    pub fn new(window: WindowId, kind: InputKind) -> Self {
        Self { window, kind }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PanAnchor {
    x: i32,
    y: i32,
    center: [f32; 2],
}

/// Rotation captured when a modifier went down. The pointer origin is
/// filled in by the first motion when the press arrived before any pointer
/// position was known.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RotationAnchor {
    origin: Option<(i32, i32)>,
    angle: f32,
}

/// Pointer and modifier state carried between events for one window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interaction {
    pointer: Option<(i32, i32)>,
    pan: Option<PanAnchor>,
    tilt: Option<RotationAnchor>,
    spin: Option<RotationAnchor>,
}

impl Interaction {
    pub fn is_dragging(&self) -> bool {
        self.pan.is_some()
    }

    pub fn control_held(&self) -> bool {
        self.tilt.is_some()
    }

    pub fn alt_held(&self) -> bool {
        self.spin.is_some()
    }

    fn begin_pan(&mut self, view: &ViewState, x: i32, y: i32) {
        self.pointer = Some((x, y));
        self.pan = Some(PanAnchor {
            x,
            y,
            center: view.params().center,
        });
    }

    fn anchor_rotation(&self, angle: f32) -> RotationAnchor {
        RotationAnchor {
            origin: self.pointer,
            angle,
        }
    }
}

/// Applies one input event to `window`. Returns whether the view
/// parameters changed. Close and focus events are the caller's business and
/// leave the window untouched.
pub fn handle_input(window: &mut WindowState, kind: InputKind, zoom_factor: f32) -> bool {
    match kind {
        InputKind::ButtonPress {
            button: MouseButton::Left,
            x,
            y,
        } => {
            window.interaction.begin_pan(&window.view, x, y);
            false
        }
        InputKind::ButtonRelease {
            button: MouseButton::Left,
            ..
        } => {
            window.interaction.pan = None;
            false
        }
        InputKind::ButtonPress {
            button: MouseButton::WheelUp,
            x,
            y,
        } => zoom_about(window, x, y, zoom_factor),
        InputKind::ButtonPress {
            button: MouseButton::WheelDown,
            x,
            y,
        } => zoom_about(window, x, y, 1.0 / zoom_factor),
        InputKind::Motion { x, y } => motion_to(window, x, y),
        InputKind::KeyPress { key } => match key {
            Key::Control => {
                if window.interaction.tilt.is_none() {
                    let angle = window.view.params().rotation_x;
                    window.interaction.tilt = Some(window.interaction.anchor_rotation(angle));
                }
                false
            }
            Key::Alt => {
                if window.interaction.spin.is_none() {
                    let angle = window.view.params().rotation_z;
                    window.interaction.spin = Some(window.interaction.anchor_rotation(angle));
                }
                false
            }
            Key::Char('r') | Key::Char('R') => {
                let before = window.view.params();
                window.reset_view();
                window.view.params() != before
            }
            _ => false,
        },
        InputKind::KeyRelease { key } => {
            match key {
                Key::Control => window.interaction.tilt = None,
                Key::Alt => window.interaction.spin = None,
                _ => {}
            }
            false
        }
        InputKind::Configure { width, height } => {
            window.viewport.width = width;
            window.viewport.height = height;
            window.view.mark_dirty();
            false
        }
        InputKind::Expose => {
            window.view.mark_dirty();
            false
        }
        _ => false,
    }
}

/// Pans while a left drag is active, then tilts while Control is held and
/// spins while Alt is held. Any combination may apply to one motion.
fn motion_to(window: &mut WindowState, x: i32, y: i32) -> bool {
    window.interaction.pointer = Some((x, y));
    let mut params = window.view.params();

    if let Some(anchor) = window.interaction.pan {
        let bounds = window.scene.as_ref().map(|scene| scene.bounds());
        let scale = window.view.pixels_per_model_unit(window.viewport, bounds);
        if scale > 0.0 {
            // Screen y grows downward, model y grows upward.
            let delta = window
                .view
                .unproject_delta(scale, (x - anchor.x) as f32, (anchor.y - y) as f32);
            params.center = [anchor.center[0] - delta[0], anchor.center[1] - delta[1]];
        }
    }
    if let Some(tilt) = window.interaction.tilt.as_mut() {
        let (_, origin_y) = *tilt.origin.get_or_insert((x, y));
        params.rotation_x = tilt.angle - (origin_y - y) as f32;
    }
    if let Some(spin) = window.interaction.spin.as_mut() {
        let (origin_x, _) = *spin.origin.get_or_insert((x, y));
        params.rotation_z = spin.angle + (origin_x - x) as f32;
    }
    window.view.apply(params)
}

fn zoom_about(window: &mut WindowState, x: i32, y: i32, factor: f32) -> bool {
    window.interaction.pointer = Some((x, y));
    let bounds = window.scene.as_ref().map(|scene| scene.bounds());
    let point = (x as f32, y as f32);
    let mut params = window.view.params();
    params.zoom *= factor;
    if !(params.zoom.is_finite() && params.zoom > 0.0) {
        return false;
    }

    let before = window.view.screen_to_model(window.viewport, bounds, point);
    let mut zoomed = window.view.clone();
    zoomed.apply(params);
    let after = zoomed.screen_to_model(window.viewport, bounds, point);
    if let (Some(before), Some(after)) = (before, after) {
        params.center[0] += before[0] - after[0];
        params.center[1] += before[1] - after[1];
    }
    window.view.apply(params)
}
