use crate::viewer::input::DEFAULT_ZOOM_FACTOR;
use crate::viewer::queue::DEFAULT_QUEUE_CAPACITY;
use crate::viewer::window::WindowSpec;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const VIEWER_SETTINGS_FILE_NAME: &str = "viewer_settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewerSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Zoom multiplier per wheel notch.
    #[serde(default = "default_zoom_factor")]
    pub zoom_factor: f32,
    /// Upper bound on how long an idle owner waits for a new command.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,
    /// Log the average render time every this many renders. 0 disables.
    #[serde(default = "default_render_stats_interval")]
    pub render_stats_interval: u32,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub default_window: WindowSpec,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_zoom_factor() -> f32 {
    DEFAULT_ZOOM_FACTOR
}

fn default_idle_wait_ms() -> u64 {
    4
}

fn default_render_stats_interval() -> u32 {
    100
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            zoom_factor: default_zoom_factor(),
            idle_wait_ms: default_idle_wait_ms(),
            render_stats_interval: default_render_stats_interval(),
            debug_logging: false,
            log_file: None,
            default_window: WindowSpec::default(),
        }
    }
}

impl ViewerSettings {
    /// Replaces values the viewer cannot run with by their defaults.
    pub fn sanitize(&mut self) {
        if self.queue_capacity == 0 {
            tracing::warn!("queue_capacity of 0 is not usable; using default");
            self.queue_capacity = default_queue_capacity();
        }
        if !(self.zoom_factor.is_finite() && self.zoom_factor > 1.0) {
            tracing::warn!(
                zoom_factor = self.zoom_factor,
                "zoom_factor must be greater than 1; using default"
            );
            self.zoom_factor = default_zoom_factor();
        }
        if self.default_window.width == 0 || self.default_window.height == 0 {
            self.default_window = WindowSpec::default();
        }
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }
}

pub fn settings_path_from_exe_path(exe_path: &Path) -> Result<PathBuf> {
    let parent = exe_path
        .parent()
        .ok_or_else(|| anyhow!("executable path has no parent: {}", exe_path.display()))?;
    Ok(parent.join(VIEWER_SETTINGS_FILE_NAME))
}

pub fn resolve_settings_path() -> Result<PathBuf> {
    let exe_path = std::env::current_exe().context("resolve current executable")?;
    settings_path_from_exe_path(&exe_path)
}

pub fn load() -> Result<ViewerSettings> {
    load_from_path(&resolve_settings_path()?)
}

pub fn save(settings: &ViewerSettings) -> Result<PathBuf> {
    let path = resolve_settings_path()?;
    save_to_path(&path, settings)?;
    Ok(path)
}

/// Missing and blank files yield the defaults.
pub fn load_from_path(path: &Path) -> Result<ViewerSettings> {
    if !path.exists() {
        return Ok(ViewerSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("read viewer settings file {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(ViewerSettings::default());
    }

    let mut loaded: ViewerSettings = serde_json::from_str(&content)
        .with_context(|| format!("deserialize viewer settings file {}", path.display()))?;
    loaded.sanitize();
    Ok(loaded)
}

pub fn save_to_path(path: &Path, settings: &ViewerSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create viewer settings parent folder {}", parent.display()))?;
    }

    let mut sanitized = settings.clone();
    sanitized.sanitize();
    let json = serde_json::to_string_pretty(&sanitized).context("serialize viewer settings")?;
    std::fs::write(path, json)
        .with_context(|| format!("write viewer settings file {}", path.display()))
}
