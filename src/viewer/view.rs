//! Camera parameters for one window and the screen/model conversions the
//! interaction handlers and the render pass share.

use crate::viewer::error::ViewerError;
use crate::viewer::scene::Bounds;

const DEG_TO_RAD: f32 = std::f32::consts::PI / 180.0;
/// Smallest |cos(rotation_x)| used when undoing the X tilt, so a view
/// tilted edge-on does not divide by zero.
const MIN_TILT_COS: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn half_extent(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewParams {
    pub center: [f32; 2],
    pub zoom: f32,
    /// Degrees; unbounded.
    pub rotation_x: f32,
    /// Degrees; unbounded.
    pub rotation_z: f32,
}

impl ViewParams {
    pub fn validate(&self) -> Result<(), ViewerError> {
        if !(self.zoom.is_finite() && self.zoom > 0.0) {
            return Err(ViewerError::invalid(format!(
                "zoom must be a positive finite number, got {}",
                self.zoom
            )));
        }
        let finite = self.center.iter().all(|v| v.is_finite())
            && self.rotation_x.is_finite()
            && self.rotation_z.is_finite();
        if !finite {
            return Err(ViewerError::invalid("view parameters must be finite"));
        }
        Ok(())
    }
}

impl Default for ViewParams {
    fn default() -> Self {
        Self {
            center: [0.0, 0.0],
            zoom: 1.0,
            rotation_x: 0.0,
            rotation_z: 0.0,
        }
    }
}

/// Model-space rectangle visible through the viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub x_min: f32,
    pub x_max: f32,
    pub y_min: f32,
    pub y_max: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    params: ViewParams,
    dirty: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            params: ViewParams::default(),
            dirty: true,
        }
    }
}

impl ViewState {
    pub fn params(&self) -> ViewParams {
        self.params
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called only once a render of this view has completed.
    pub fn clean(&mut self) {
        self.dirty = false;
    }

    pub fn set_params(&mut self, params: ViewParams) -> Result<(), ViewerError> {
        params.validate()?;
        self.params = params;
        self.dirty = true;
        Ok(())
    }

    /// Replaces the parameters and reports whether anything changed. Dirty
    /// is raised only on change.
    pub fn apply(&mut self, params: ViewParams) -> bool {
        if params == self.params {
            return false;
        }
        self.params = params;
        self.dirty = true;
        true
    }

    /// Frames `bounds` (or the origin when no data is attached).
    pub fn reset_to_bounds(&mut self, bounds: Option<Bounds>) {
        self.params = ViewParams {
            center: bounds.map(|b| b.midpoint()).unwrap_or([0.0, 0.0]),
            ..ViewParams::default()
        };
        self.dirty = true;
    }

    /// Scale that fits the data into the viewport at zoom 1. Zero when there
    /// is nothing to fit.
    pub fn pixels_per_model_unit(&self, viewport: Viewport, bounds: Option<Bounds>) -> f32 {
        let Some(bounds) = bounds else {
            return 0.0;
        };
        let (model_w, model_h) = (bounds.width(), bounds.height());
        if viewport.width == 0 || viewport.height == 0 || model_w <= 0.0 || model_h <= 0.0 {
            return 0.0;
        }
        let view_aspect = viewport.width as f32 / viewport.height as f32;
        let data_aspect = model_w / model_h;
        if view_aspect > data_aspect {
            viewport.height as f32 / (model_h / self.params.zoom)
        } else {
            viewport.width as f32 / (model_w / self.params.zoom)
        }
    }

    pub fn visible_extent(&self, viewport: Viewport, bounds: Option<Bounds>) -> Option<Extent> {
        let scale = self.pixels_per_model_unit(viewport, bounds);
        if scale <= 0.0 {
            return None;
        }
        let (half_w, half_h) = viewport.half_extent();
        let [cx, cy] = self.params.center;
        Some(Extent {
            x_min: cx - half_w / scale,
            x_max: cx + half_w / scale,
            y_min: cy - half_h / scale,
            y_max: cy + half_h / scale,
        })
    }

    /// Model point under the window pixel `point` (origin top-left, y down).
    pub fn screen_to_model(
        &self,
        viewport: Viewport,
        bounds: Option<Bounds>,
        point: (f32, f32),
    ) -> Option<[f32; 2]> {
        let scale = self.pixels_per_model_unit(viewport, bounds);
        if scale <= 0.0 {
            return None;
        }
        let (half_w, half_h) = viewport.half_extent();
        let offset = self.unproject_delta(scale, point.0 - half_w, half_h - point.1);
        let [cx, cy] = self.params.center;
        Some([cx + offset[0], cy + offset[1]])
    }

    /// Converts a pixel displacement (x right, y up) into a model-space
    /// displacement under the current tilt and spin.
    pub fn unproject_delta(&self, scale: f32, dx: f32, dy: f32) -> [f32; 2] {
        let cos_x = (self.params.rotation_x * DEG_TO_RAD).cos();
        let cos_x = if cos_x.abs() < MIN_TILT_COS {
            MIN_TILT_COS.copysign(cos_x)
        } else {
            cos_x
        };
        let (sin_z, cos_z) = (self.params.rotation_z * DEG_TO_RAD).sin_cos();
        let u = dx / scale;
        let v = dy / scale / cos_x;
        [u * cos_z + v * sin_z, -u * sin_z + v * cos_z]
    }
}
