use nvn_viewer::viewer::{
    AutoNavigator, Bounds, HeadlessProbe, SceneHandle, StaticScene, ViewerBuilder,
};
use nvn_viewer::{logging, settings};
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Unattended run against the display-free backend: opens the configured
/// window over a unit grid, spins it for a while and reports loop stats.
fn main() -> anyhow::Result<()> {
    let settings = settings::load()?;
    logging::init(settings.debug_logging, settings.log_file.clone());

    let viewer = ViewerBuilder::from_settings(&settings)
        .headless(HeadlessProbe::default())
        .spawn()?;
    let window = viewer.create_window(settings.default_window.clone())?;
    let grid = StaticScene::new(Bounds::new([0.0, 0.0, 0.0], [1.0, 1.0, 0.0]));
    viewer.show_scene(window, SceneHandle::new(grid))?;

    let navigator = AutoNavigator::new(viewer.handle(), window);
    let stop = navigator.stop_flag();
    let runner = navigator.spawn()?;
    std::thread::sleep(Duration::from_secs(2));
    stop.store(true, Ordering::Release);
    let steps = runner
        .join()
        .map_err(|_| anyhow::anyhow!("auto navigation thread panicked"))?;

    let stats = viewer.stats();
    tracing::info!(steps, ?stats, "viewer run finished");
    viewer.shutdown()
}
