use crate::viewer::error::ViewerError;
use crate::viewer::service::ViewerHandle;
use crate::viewer::view::ViewParams;
use crate::viewer::window::WindowId;
use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Slowly spins a window's view from outside the owner thread, e.g. for
/// unattended demos.
#[derive(Debug, Clone)]
pub struct AutoNavigator {
    handle: ViewerHandle,
    window: WindowId,
    zoom: f32,
    tilt: f32,
    spin_step: f32,
    pause: Duration,
    stop: Arc<AtomicBool>,
}

impl AutoNavigator {
    pub fn new(handle: ViewerHandle, window: WindowId) -> Self {
        Self {
            handle,
            window,
            zoom: 3.0,
            tilt: -70.0,
            spin_step: 0.01,
            pause: Duration::from_millis(10),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn zoom(mut self, zoom: f32) -> Self {
        self.zoom = zoom;
        self
    }

    pub fn tilt(mut self, degrees: f32) -> Self {
        self.tilt = degrees;
        self
    }

    pub fn spin_step(mut self, degrees: f32) -> Self {
        self.spin_step = degrees;
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Setting the returned flag ends `run` after the current step.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Reads the current view, applies zoom and tilt, advances the spin and
    /// queues the result.
    pub fn step(&self) -> Result<ViewParams, ViewerError> {
        let mut params = self.handle.view_params(self.window)?;
        params.zoom = self.zoom;
        params.rotation_x = self.tilt;
        params.rotation_z += self.spin_step;
        self.handle.set_view_params(self.window, params)?;
        Ok(params)
    }

    /// Steps until stopped, the window closes or the viewer stops. Returns
    /// the number of applied steps.
    pub fn run(&self) -> u64 {
        let mut steps = 0;
        while !self.stop.load(Ordering::Acquire) {
            match self.handle.is_window_active(self.window) {
                Ok(true) => {}
                Ok(false) => break,
                Err(err) => {
                    tracing::debug!(%err, "auto navigation stopped");
                    break;
                }
            }
            match self.step() {
                Ok(_) => steps += 1,
                Err(ViewerError::QueueFull { .. }) => {}
                Err(err) => {
                    tracing::debug!(%err, "auto navigation stopped");
                    break;
                }
            }
            thread::sleep(self.pause);
        }
        steps
    }

    pub fn spawn(self) -> Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name("auto-navigate".to_string())
            .spawn(move || self.run())
            .context("spawn auto navigation thread")
    }
}
