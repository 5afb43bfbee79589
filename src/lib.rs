pub mod logging;
pub mod settings;
pub mod viewer;

pub use settings::ViewerSettings;
pub use viewer::{Viewer, ViewerError, ViewerHandle};
