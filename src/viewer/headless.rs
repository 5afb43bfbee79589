//! Display-free backend and renderer used by tests and batch runs.

use crate::viewer::backend::{FrameContext, Renderer, WindowBackend};
use crate::viewer::input::InputEvent;
use crate::viewer::view::ViewParams;
use crate::viewer::window::{WindowId, WindowSpec};
use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct ProbeState {
    pending: VecDeque<InputEvent>,
    open: BTreeSet<WindowId>,
    fail_next: Option<String>,
    created: usize,
    destroyed: usize,
    presented: usize,
}

/// Test-side view of a [`HeadlessBackend`]. Cloneable and usable from any
/// thread.
#[derive(Debug, Clone, Default)]
pub struct HeadlessProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl HeadlessProbe {
    pub fn push_event(&self, event: InputEvent) {
        self.lock().pending.push_back(event);
    }

    pub fn push_events(&self, events: impl IntoIterator<Item = InputEvent>) {
        self.lock().pending.extend(events);
    }

    pub fn pending_events(&self) -> usize {
        self.lock().pending.len()
    }

    /// Makes the next `create_context` fail with `reason`.
    pub fn fail_next_context(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    pub fn open_windows(&self) -> Vec<WindowId> {
        self.lock().open.iter().copied().collect()
    }

    pub fn created(&self) -> usize {
        self.lock().created
    }

    pub fn destroyed(&self) -> usize {
        self.lock().destroyed
    }

    pub fn presented(&self) -> usize {
        self.lock().presented
    }

    fn lock(&self) -> MutexGuard<'_, ProbeState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Default)]
pub struct HeadlessBackend {
    probe: HeadlessProbe,
}

impl HeadlessBackend {
    pub fn new() -> (Self, HeadlessProbe) {
        let probe = HeadlessProbe::default();
        (Self::with_probe(probe.clone()), probe)
    }

    pub fn with_probe(probe: HeadlessProbe) -> Self {
        Self { probe }
    }
}

impl WindowBackend for HeadlessBackend {
    fn create_context(&mut self, id: WindowId, spec: &WindowSpec) -> Result<()> {
        let mut state = self.probe.lock();
        if let Some(reason) = state.fail_next.take() {
            return Err(anyhow!("{reason}"));
        }
        if spec.width == 0 || spec.height == 0 {
            return Err(anyhow!("zero-sized window '{}'", spec.title));
        }
        state.open.insert(id);
        state.created += 1;
        Ok(())
    }

    fn destroy_context(&mut self, id: WindowId) {
        let mut state = self.probe.lock();
        if state.open.remove(&id) {
            state.destroyed += 1;
        }
    }

    fn has_pending_events(&mut self) -> bool {
        !self.probe.lock().pending.is_empty()
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        self.probe.lock().pending.drain(..).collect()
    }

    fn present(&mut self, id: WindowId) -> Result<()> {
        let mut state = self.probe.lock();
        if !state.open.contains(&id) {
            return Err(anyhow!("present on closed window {id}"));
        }
        state.presented += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    pub window: WindowId,
    pub params: ViewParams,
    pub pixels_per_unit: f32,
}

/// Renderer that only remembers what it was asked to draw.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    frames: Arc<Mutex<Vec<RenderRecord>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RenderRecord> {
        self.frames
            .lock()
            .map(|frames| frames.clone())
            .unwrap_or_default()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.lock().map(|frames| frames.len()).unwrap_or(0)
    }

    pub fn last_frame(&self, window: WindowId) -> Option<RenderRecord> {
        self.frames
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|frame| frame.window == window)
            .cloned()
    }
}

impl Renderer for RecordingRenderer {
    fn render(&mut self, frame: &FrameContext<'_>) -> Result<()> {
        let mut frames = self
            .frames
            .lock()
            .map_err(|_| anyhow!("render log lock poisoned"))?;
        frames.push(RenderRecord {
            window: frame.window,
            params: frame.params,
            pixels_per_unit: frame.pixels_per_unit,
        });
        Ok(())
    }
}
