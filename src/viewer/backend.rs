//! Seams to the windowing provider and the renderer. Both are driven only
//! from the owner thread.

use crate::viewer::input::InputEvent;
use crate::viewer::scene::SceneHandle;
use crate::viewer::view::{Extent, ViewParams, Viewport};
use crate::viewer::window::{WindowId, WindowSpec, WindowState};
use anyhow::Result;

pub trait WindowBackend {
    /// Creates the window and its graphics context. An error is fatal to
    /// this window only.
    fn create_context(&mut self, id: WindowId, spec: &WindowSpec) -> Result<()>;

    fn destroy_context(&mut self, id: WindowId);

    fn has_pending_events(&mut self) -> bool;

    /// Returns every event pending right now without waiting for more.
    fn poll_events(&mut self) -> Vec<InputEvent>;

    fn present(&mut self, id: WindowId) -> Result<()>;
}

/// Everything the renderer needs to draw one frame of one window.
#[derive(Debug, Clone)]
pub struct FrameContext<'a> {
    pub window: WindowId,
    pub params: ViewParams,
    pub viewport: Viewport,
    /// Zero when no scene is attached.
    pub pixels_per_unit: f32,
    pub extent: Option<Extent>,
    pub scene: Option<&'a SceneHandle>,
}

impl<'a> FrameContext<'a> {
    pub fn for_window(window: &'a WindowState) -> Self {
        let bounds = window.scene.as_ref().map(SceneHandle::bounds);
        Self {
            window: window.id,
            params: window.view.params(),
            viewport: window.viewport,
            pixels_per_unit: window.view.pixels_per_model_unit(window.viewport, bounds),
            extent: window.view.visible_extent(window.viewport, bounds),
            scene: window.scene.as_ref(),
        }
    }
}

pub trait Renderer: Send {
    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()>;
}

/// Factory run on the owner thread while it is starting up.
pub type BackendFactory = Box<dyn FnOnce() -> Result<Box<dyn WindowBackend>> + Send>;
