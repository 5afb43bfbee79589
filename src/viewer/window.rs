use crate::viewer::error::ViewerError;
use crate::viewer::input::Interaction;
use crate::viewer::scene::SceneHandle;
use crate::viewer::view::{Viewport, ViewState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId(u64);

impl WindowId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Placement and decoration requested for a new window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_x")]
    pub x: i32,
    #[serde(default = "default_y")]
    pub y: i32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default)]
    pub borderless: bool,
}

impl WindowSpec {
    pub fn new(title: impl Into<String>, x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            x,
            y,
            width,
            height,
            borderless: false,
        }
    }

    pub fn borderless(mut self, borderless: bool) -> Self {
        self.borderless = borderless;
        self
    }

    pub fn viewport(&self) -> Viewport {
        Viewport {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
        }
    }
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: default_title(),
            x: default_x(),
            y: default_y(),
            width: default_width(),
            height: default_height(),
            borderless: false,
        }
    }
}

fn default_title() -> String {
    "nvn".to_string()
}

fn default_x() -> i32 {
    100
}

fn default_y() -> i32 {
    100
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

/// Everything the owner thread keeps per open window.
#[derive(Debug)]
pub struct WindowState {
    pub id: WindowId,
    pub title: String,
    pub borderless: bool,
    pub viewport: Viewport,
    pub view: ViewState,
    pub scene: Option<SceneHandle>,
    pub interaction: Interaction,
}

impl WindowState {
    pub fn new(id: WindowId, spec: &WindowSpec) -> Self {
        Self {
            id,
            title: spec.title.clone(),
            borderless: spec.borderless,
            viewport: spec.viewport(),
            view: ViewState::default(),
            scene: None,
            interaction: Interaction::default(),
        }
    }

    /// Attaches a scene and frames its bounds.
    pub fn show_scene(&mut self, scene: SceneHandle) {
        self.view.reset_to_bounds(Some(scene.bounds()));
        self.scene = Some(scene);
    }

    pub fn reset_view(&mut self) {
        let bounds = self.scene.as_ref().map(SceneHandle::bounds);
        self.view.reset_to_bounds(bounds);
    }
}

/// Open windows of one owner thread, keyed by id, plus input focus.
#[derive(Debug, Default)]
pub struct WindowSet {
    windows: BTreeMap<WindowId, WindowState>,
    focused: Option<WindowId>,
    next_id: u64,
}

impl WindowSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands out the id the next window will use. Ids are never reused.
    pub fn allocate_id(&mut self) -> WindowId {
        self.next_id += 1;
        WindowId::new(self.next_id)
    }

    pub fn insert(&mut self, window: WindowState) {
        self.windows.insert(window.id, window);
    }

    pub fn remove(&mut self, id: WindowId) -> Option<WindowState> {
        if self.focused == Some(id) {
            self.focused = None;
        }
        self.windows.remove(&id)
    }

    pub fn get(&self, id: WindowId) -> Option<&WindowState> {
        self.windows.get(&id)
    }

    pub fn get_mut(&mut self, id: WindowId) -> Option<&mut WindowState> {
        self.windows.get_mut(&id)
    }

    pub fn require_mut(&mut self, id: WindowId) -> Result<&mut WindowState, ViewerError> {
        self.windows
            .get_mut(&id)
            .ok_or(ViewerError::UnknownWindow(id))
    }

    pub fn contains(&self, id: WindowId) -> bool {
        self.windows.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn ids(&self) -> Vec<WindowId> {
        self.windows.keys().copied().collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut WindowState> {
        self.windows.values_mut()
    }

    /// The window whose view takes part in group reconciliation: the lowest
    /// open id.
    pub fn primary(&self) -> Option<WindowId> {
        self.windows.keys().next().copied()
    }

    pub fn focused(&self) -> Option<WindowId> {
        self.focused
    }

    pub fn set_focus(&mut self, id: Option<WindowId>) {
        self.focused = id.filter(|id| self.windows.contains_key(id));
    }

    /// Window that should receive input addressed to `target`.
    pub fn route_input(&self, target: WindowId) -> Option<WindowId> {
        self.focused
            .or(Some(target))
            .filter(|id| self.windows.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::scene::{Bounds, StaticScene};

    #[test]
    fn default_spec_matches_stock_window() {
        let spec = WindowSpec::default();
        assert_eq!(spec.title, "nvn");
        assert_eq!((spec.x, spec.y, spec.width, spec.height), (100, 100, 640, 480));
        assert!(!spec.borderless);
    }

    #[test]
    fn spec_deserializes_with_missing_fields() {
        let spec: WindowSpec = serde_json::from_str(r#"{"title":"grid","width":800}"#)
            .expect("partial spec should parse");
        assert_eq!(spec.title, "grid");
        assert_eq!(spec.width, 800);
        assert_eq!(spec.height, 480);
    }

    #[test]
    fn showing_a_scene_frames_its_bounds() {
        let mut window = WindowState::new(WindowId::new(1), &WindowSpec::default());
        let scene = SceneHandle::new(StaticScene::new(Bounds::new(
            [0.0, 0.0, 0.0],
            [200.0, 100.0, 0.0],
        )));
        window.view.clean();
        window.show_scene(scene);
        assert_eq!(window.view.params().center, [100.0, 50.0]);
        assert!(window.view.is_dirty());
    }

    fn set_with(count: usize) -> (WindowSet, Vec<WindowId>) {
        let mut set = WindowSet::new();
        let ids = (0..count)
            .map(|_| {
                let id = set.allocate_id();
                set.insert(WindowState::new(id, &WindowSpec::default()));
                id
            })
            .collect();
        (set, ids)
    }

    #[test]
    fn primary_is_lowest_open_id() {
        let (mut set, ids) = set_with(3);
        assert_eq!(set.primary(), Some(ids[0]));
        set.remove(ids[0]);
        assert_eq!(set.primary(), Some(ids[1]));
        let next = set.allocate_id();
        assert!(next > ids[2], "ids are not reused");
    }

    #[test]
    fn input_follows_focus_when_present() {
        let (mut set, ids) = set_with(2);
        assert_eq!(set.route_input(ids[1]), Some(ids[1]));
        set.set_focus(Some(ids[0]));
        assert_eq!(set.route_input(ids[1]), Some(ids[0]));
        set.remove(ids[0]);
        assert_eq!(set.focused(), None);
        assert_eq!(set.route_input(ids[1]), Some(ids[1]));
        assert_eq!(set.route_input(WindowId::new(99)), None);
    }

    #[test]
    fn focus_on_unknown_window_is_ignored() {
        let (mut set, _) = set_with(1);
        set.set_focus(Some(WindowId::new(42)));
        assert_eq!(set.focused(), None);
    }

    #[test]
    fn require_mut_reports_unknown_window() {
        let (mut set, _) = set_with(1);
        let err = set.require_mut(WindowId::new(7)).unwrap_err();
        assert_eq!(err, ViewerError::UnknownWindow(WindowId::new(7)));
    }
}
