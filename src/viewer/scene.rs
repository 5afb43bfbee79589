use std::sync::Arc;

/// Axis-aligned model-space bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Bounds {
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f32 {
        self.max[0] - self.min[0]
    }

    pub fn height(&self) -> f32 {
        self.max[1] - self.min[1]
    }

    pub fn midpoint(&self) -> [f32; 2] {
        [
            self.min[0] + self.width() / 2.0,
            self.min[1] + self.height() / 2.0,
        ]
    }
}

/// Displayable dataset as seen by the viewer core. Loading and drawing the
/// data are the renderer's business; the core only needs the framing.
pub trait Scene: Send + Sync {
    fn bounds(&self) -> Bounds;
}

/// Shared handle to a scene. Two handles are equal only when they point at
/// the same scene.
#[derive(Clone)]
pub struct SceneHandle(Arc<dyn Scene>);

impl SceneHandle {
    pub fn new(scene: impl Scene + 'static) -> Self {
        Self::from_arc(Arc::new(scene))
    }

    pub fn from_arc(scene: Arc<dyn Scene>) -> Self {
        Self(scene)
    }

    pub fn bounds(&self) -> Bounds {
        self.0.bounds()
    }

    pub fn scene(&self) -> &dyn Scene {
        self.0.as_ref()
    }
}

impl PartialEq for SceneHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneHandle")
            .field("bounds", &self.0.bounds())
            .finish()
    }
}

/// Scene with fixed bounds and no data, for framing-only use and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticScene {
    bounds: Bounds,
}

impl StaticScene {
    pub fn new(bounds: Bounds) -> Self {
        Self { bounds }
    }
}

impl Scene for StaticScene {
    fn bounds(&self) -> Bounds {
        self.bounds
    }
}
