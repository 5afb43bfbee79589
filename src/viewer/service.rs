use crate::settings::ViewerSettings;
use crate::viewer::backend::{BackendFactory, Renderer, WindowBackend};
use crate::viewer::command::{Arg, Command, CommandResult, Reply, Request};
use crate::viewer::error::ViewerError;
use crate::viewer::exchange::{Exchange, SoloExchange};
use crate::viewer::headless::{HeadlessBackend, HeadlessProbe, RecordingRenderer};
use crate::viewer::owner::{CustomHandler, LoopConfig, LoopStatsSnapshot, OwnerLoop, OwnerShared};
use crate::viewer::queue::{CommandQueue, EnqueueError, DEFAULT_QUEUE_CAPACITY};
use crate::viewer::reconcile::Reconciler;
use crate::viewer::scene::SceneHandle;
use crate::viewer::state::OwnerLifecycle;
use crate::viewer::view::ViewParams;
use crate::viewer::window::{WindowId, WindowSet, WindowSpec};
use anyhow::{anyhow, bail, Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

const OWNER_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const OWNER_THREAD_NAME: &str = "viewer-owner";

pub struct ViewerBuilder {
    config: LoopConfig,
    queue_capacity: usize,
    backend: Option<BackendFactory>,
    renderer: Option<Box<dyn Renderer>>,
    exchange: Option<Box<dyn Exchange>>,
    handlers: Vec<(String, CustomHandler)>,
    thread_name: String,
}

impl Default for ViewerBuilder {
    fn default() -> Self {
        Self {
            config: LoopConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            backend: None,
            renderer: None,
            exchange: None,
            handlers: Vec::new(),
            thread_name: OWNER_THREAD_NAME.to_string(),
        }
    }
}

impl ViewerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &ViewerSettings) -> Self {
        let mut settings = settings.clone();
        settings.sanitize();
        Self {
            config: LoopConfig::from_settings(&settings),
            queue_capacity: settings.queue_capacity,
            ..Self::default()
        }
    }

    pub fn config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// The factory runs on the owner thread, so the backend itself need not
    /// be `Send`.
    pub fn backend<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> Result<Box<dyn WindowBackend>> + Send + 'static,
    {
        self.backend = Some(Box::new(factory));
        self
    }

    pub fn headless(self, probe: HeadlessProbe) -> Self {
        self.backend(move || {
            Ok(Box::new(HeadlessBackend::with_probe(probe)) as Box<dyn WindowBackend>)
        })
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn exchange(mut self, exchange: impl Exchange + 'static) -> Self {
        self.exchange = Some(Box::new(exchange));
        self
    }

    /// Registers a custom operation. Names are checked when spawning.
    pub fn handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: FnMut(&mut WindowSet, &[Arg]) -> CommandResult + Send + 'static,
    {
        self.handlers.push((name.into(), Box::new(handler)));
        self
    }

    /// Starts the owner thread and waits until its backend is up.
    pub fn spawn(self) -> Result<Viewer> {
        for (name, _) in &self.handlers {
            Request::custom(name.clone(), Vec::new())
                .with_context(|| format!("register viewer operation '{name}'"))?;
        }
        let Some(factory) = self.backend else {
            bail!("no window backend configured for the viewer");
        };

        let queue = Arc::new(CommandQueue::new(self.queue_capacity));
        let shared = Arc::new(OwnerShared::new());
        let startup = OwnerStartup {
            queue: Arc::clone(&queue),
            shared: Arc::clone(&shared),
            factory,
            renderer: self
                .renderer
                .unwrap_or_else(|| Box::new(RecordingRenderer::new())),
            exchange: self.exchange.unwrap_or_else(|| Box::new(SoloExchange)),
            handlers: self.handlers,
            config: self.config,
        };
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let thread = thread::Builder::new()
            .name(self.thread_name)
            .spawn(move || run_owner_thread(startup, ready_tx))
            .context("spawn viewer owner thread")?;

        let handle = ViewerHandle { queue, shared };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Viewer {
                handle,
                thread: Some(thread),
            }),
            Ok(Err(reason)) => {
                let _ = thread.join();
                Err(anyhow!("viewer backend failed to start: {reason}"))
            }
            Err(_) => {
                let _ = thread.join();
                Err(anyhow!("viewer owner thread exited during startup"))
            }
        }
    }
}

struct OwnerStartup {
    queue: Arc<CommandQueue<Command>>,
    shared: Arc<OwnerShared>,
    factory: BackendFactory,
    renderer: Box<dyn Renderer>,
    exchange: Box<dyn Exchange>,
    handlers: Vec<(String, CustomHandler)>,
    config: LoopConfig,
}

fn run_owner_thread(startup: OwnerStartup, ready: mpsc::Sender<Result<(), String>>) {
    let queue = Arc::clone(&startup.queue);
    let shared = Arc::clone(&startup.shared);

    let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
        let OwnerStartup {
            queue,
            shared,
            factory,
            renderer,
            exchange,
            handlers,
            config,
        } = startup;

        let backend = match factory() {
            Ok(backend) => backend,
            Err(err) => {
                tracing::error!(?err, "viewer backend failed to start");
                shared.lifecycle_cell().transition(OwnerLifecycle::Stopped);
                queue.close();
                let _ = ready.send(Err(format!("{err:#}")));
                return;
            }
        };
        let mut owner = match OwnerLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shared),
            backend,
            renderer,
            Reconciler::new(exchange),
            config,
        ) {
            Ok(owner) => owner,
            Err(err) => {
                shared.lifecycle_cell().transition(OwnerLifecycle::Stopped);
                queue.close();
                let _ = ready.send(Err(format!("{err:#}")));
                return;
            }
        };
        for (name, handler) in handlers {
            owner.register(name, handler);
        }
        let _ = ready.send(Ok(()));
        owner.run();
    }));

    if let Err(payload) = outcome {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "unknown panic payload".to_string()
        };
        tracing::error!(%message, "viewer owner thread panicked");
        queue.close();
        // Dropping the commands releases every caller waiting on them.
        let abandoned = queue.drain();
        for _ in &abandoned {
            shared.stats().record_dropped();
        }
        shared.lifecycle_cell().force_stopped();
    }
}

/// Cheap producer handle. Any thread may hold one.
#[derive(Debug, Clone)]
pub struct ViewerHandle {
    queue: Arc<CommandQueue<Command>>,
    shared: Arc<OwnerShared>,
}

impl ViewerHandle {
    pub fn lifecycle(&self) -> OwnerLifecycle {
        self.shared.lifecycle()
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle() == OwnerLifecycle::Running
    }

    pub fn stats(&self) -> LoopStatsSnapshot {
        self.shared.stats().snapshot()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Asks the owner to drain and stop. Further commands are rejected.
    pub fn request_stop(&self) {
        self.shared.request_stop();
        self.queue.close();
    }

    /// Runs `request` on the owner thread and blocks until it has finished.
    /// Waits for queue space rather than dropping.
    pub fn call(&self, request: Request) -> CommandResult {
        if self.shared.is_owner_thread() {
            return Err(ViewerError::OwnerThreadReentry);
        }
        if !self.lifecycle().accepts_commands() {
            return Err(ViewerError::OwnerStopped);
        }
        request.validate()?;
        let (command, completion) = Command::with_completion(request);
        self.queue
            .enqueue_blocking(command)
            .map_err(|err| self.rejected(err))?;
        completion.wait()
    }

    /// Queues `request` without waiting. A full queue drops it.
    pub fn post(&self, request: Request) -> Result<(), ViewerError> {
        request.validate()?;
        self.queue
            .enqueue(Command::new(request))
            .map_err(|err| self.rejected(err))
    }

    /// Like [`post`](Self::post), but an identical queued request absorbs
    /// this one.
    pub fn post_unique(&self, request: Request) -> Result<(), ViewerError> {
        request.validate()?;
        self.queue
            .enqueue_unique_or_drop(Command::new(request))
            .map_err(|err| self.rejected(err))
    }

    /// Raw queue access for callers building their own commands.
    pub fn submit(&self, command: Command) -> Result<(), EnqueueError<Command>> {
        self.queue.enqueue(command)
    }

    pub fn submit_unique(&self, command: Command) -> Result<(), EnqueueError<Command>> {
        self.queue.enqueue_unique_or_drop(command)
    }

    /// Waits for queue space. On the owner thread nothing would free a
    /// slot, so there it does not wait and a full queue reports `Full`.
    pub fn submit_blocking(&self, command: Command) -> Result<(), EnqueueError<Command>> {
        if self.shared.is_owner_thread() {
            return self.queue.enqueue(command);
        }
        self.queue.enqueue_blocking(command)
    }

    pub fn create_window(&self, spec: WindowSpec) -> Result<WindowId, ViewerError> {
        match self.call(Request::CreateWindow(spec))? {
            Reply::Window(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub fn destroy_window(&self, id: WindowId) -> Result<(), ViewerError> {
        self.call(Request::DestroyWindow(id)).map(|_| ())
    }

    pub fn is_window_active(&self, id: WindowId) -> Result<bool, ViewerError> {
        match self.call(Request::IsWindowActive(id))? {
            Reply::Active(active) => Ok(active),
            other => Err(unexpected(other)),
        }
    }

    /// Asks for a redraw. Bursts collapse into one pending refresh.
    pub fn refresh(&self, id: WindowId) -> Result<(), ViewerError> {
        self.post_unique(Request::Refresh(id))
    }

    pub fn reset_view(&self, id: WindowId) -> Result<(), ViewerError> {
        self.post(Request::ResetView(id))
    }

    pub fn show_scene(&self, id: WindowId, scene: SceneHandle) -> Result<(), ViewerError> {
        self.call(Request::ShowScene(id, scene)).map(|_| ())
    }

    pub fn view_params(&self, id: WindowId) -> Result<ViewParams, ViewerError> {
        match self.call(Request::GetViewParams(id))? {
            Reply::View(params) => Ok(params),
            other => Err(unexpected(other)),
        }
    }

    pub fn set_view_params(&self, id: WindowId, params: ViewParams) -> Result<(), ViewerError> {
        self.post(Request::SetViewParams(id, params))
    }

    pub fn call_custom(&self, name: &str, args: Vec<Arg>) -> CommandResult {
        self.call(Request::custom(name, args)?)
    }

    pub fn post_custom(&self, name: &str, args: Vec<Arg>) -> Result<(), ViewerError> {
        self.post(Request::custom(name, args)?)
    }

    fn rejected(&self, err: EnqueueError<Command>) -> ViewerError {
        match err {
            EnqueueError::Full(command) => {
                self.shared.stats().record_dropped();
                tracing::warn!(operation = %command.name(), "queue full - command dropped");
                ViewerError::QueueFull {
                    operation: command.request().label(),
                }
            }
            EnqueueError::Duplicate(command) => {
                tracing::debug!(operation = %command.name(), "dropped non-unique command");
                ViewerError::Duplicate {
                    operation: command.request().label(),
                }
            }
            EnqueueError::Closed(_) => ViewerError::OwnerStopped,
        }
    }
}

fn unexpected(reply: Reply) -> ViewerError {
    ViewerError::invalid(format!("unexpected reply {reply:?}"))
}

/// Owns the viewer's owner thread. Dropping it stops and joins the thread.
pub struct Viewer {
    handle: ViewerHandle,
    thread: Option<JoinHandle<()>>,
}

impl Viewer {
    pub fn builder() -> ViewerBuilder {
        ViewerBuilder::new()
    }

    pub fn handle(&self) -> ViewerHandle {
        self.handle.clone()
    }

    /// Stops the owner thread and blocks until it has exited. In a group
    /// this waits for peers still in a reconciliation round.
    pub fn shutdown(mut self) -> Result<()> {
        self.handle.request_stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| anyhow!("viewer owner thread panicked while joining")),
            None => Ok(()),
        }
    }

    fn join_with_timeout(&mut self) {
        let Some(handle) = self.thread.take() else {
            return;
        };

        let (done_tx, done_rx) = mpsc::channel();
        thread::spawn(move || {
            let _ = done_tx.send(handle.join());
        });

        match done_rx.recv_timeout(OWNER_JOIN_TIMEOUT) {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("viewer owner thread panicked while joining"),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                tracing::error!("viewer owner thread join timed out")
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                tracing::error!("viewer owner thread join channel disconnected")
            }
        }
    }
}

impl std::ops::Deref for Viewer {
    type Target = ViewerHandle;

    fn deref(&self) -> &ViewerHandle {
        &self.handle
    }
}

impl Drop for Viewer {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.handle.request_stop();
            self.join_with_timeout();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn headless_viewer() -> (Viewer, HeadlessProbe) {
        let probe = HeadlessProbe::default();
        let viewer = Viewer::builder()
            .headless(probe.clone())
            .spawn()
            .expect("spawn viewer");
        (viewer, probe)
    }

    #[test]
    fn spawn_without_backend_fails() {
        let err = Viewer::builder().spawn().err().expect("no backend");
        assert!(err.to_string().contains("no window backend"));
    }

    #[test]
    fn backend_factory_failure_is_reported_by_spawn() {
        let err = Viewer::builder()
            .backend(|| Err(anyhow!("display unavailable")))
            .spawn()
            .err()
            .expect("factory failure");
        assert!(format!("{err:#}").contains("display unavailable"));
    }

    #[test]
    fn invalid_handler_name_is_rejected_at_spawn() {
        let result = Viewer::builder()
            .headless(HeadlessProbe::default())
            .handler("x".repeat(64), |_: &mut WindowSet, _: &[Arg]| Ok(Reply::Done))
            .spawn();
        assert!(result.is_err());
    }

    #[test]
    fn shutdown_destroys_windows_and_stops() {
        let (viewer, probe) = headless_viewer();
        let handle = viewer.handle();
        let id = handle.create_window(WindowSpec::default()).expect("window");
        assert!(handle.is_window_active(id).expect("active query"));

        viewer.shutdown().expect("shutdown");
        assert_eq!(handle.lifecycle(), OwnerLifecycle::Stopped);
        assert!(probe.open_windows().is_empty());
        assert_eq!(
            handle.create_window(WindowSpec::default()),
            Err(ViewerError::OwnerStopped)
        );
        assert_eq!(handle.refresh(id), Err(ViewerError::OwnerStopped));
    }

    #[test]
    fn dropping_the_viewer_stops_the_owner() {
        let (viewer, _probe) = headless_viewer();
        let handle = viewer.handle();
        drop(viewer);
        assert_eq!(handle.lifecycle(), OwnerLifecycle::Stopped);
    }

    #[test]
    fn reentrant_call_from_owner_thread_fails_fast() {
        let slot: Arc<std::sync::Mutex<Option<ViewerHandle>>> = Arc::default();
        let saw_reentry = Arc::new(AtomicBool::new(false));
        let viewer = {
            let slot = Arc::clone(&slot);
            let saw_reentry = Arc::clone(&saw_reentry);
            Viewer::builder()
                .headless(HeadlessProbe::default())
                .handler("Reenter", move |_: &mut WindowSet, _: &[Arg]| {
                    let handle = slot.lock().ok().and_then(|guard| guard.clone());
                    if let Some(handle) = handle {
                        let result = handle.is_window_active(WindowId::new(1));
                        saw_reentry.store(
                            result == Err(ViewerError::OwnerThreadReentry),
                            Ordering::SeqCst,
                        );
                    }
                    Ok(Reply::Done)
                })
                .spawn()
                .expect("spawn viewer")
        };
        *slot.lock().expect("slot") = Some(viewer.handle());

        viewer.call_custom("Reenter", Vec::new()).expect("custom call");
        assert!(saw_reentry.load(Ordering::SeqCst));
        *slot.lock().expect("slot") = None;
        viewer.shutdown().expect("shutdown");
    }

    #[test]
    fn blocking_submit_from_owner_thread_reports_full() {
        let slot: Arc<std::sync::Mutex<Option<ViewerHandle>>> = Arc::default();
        let viewer = {
            let slot = Arc::clone(&slot);
            Viewer::builder()
                .queue_capacity(1)
                .headless(HeadlessProbe::default())
                .handler("Flood", move |_: &mut WindowSet, _: &[Arg]| {
                    let handle = slot.lock().ok().and_then(|guard| guard.clone());
                    let Some(handle) = handle else {
                        return Err(ViewerError::invalid("no handle"));
                    };
                    let refresh = |n| Command::new(Request::Refresh(WindowId::new(n)));
                    let _ = handle.submit(refresh(1));
                    let full = handle
                        .submit_blocking(refresh(2))
                        .map_or_else(|err| err.is_full(), |_| false);
                    Ok(Reply::Active(full))
                })
                .spawn()
                .expect("spawn viewer")
        };
        *slot.lock().expect("slot") = Some(viewer.handle());

        assert_eq!(
            viewer.call_custom("Flood", Vec::new()),
            Ok(Reply::Active(true))
        );
        *slot.lock().expect("slot") = None;
        viewer.shutdown().expect("shutdown");
    }

    #[test]
    fn panicking_handler_stops_owner_and_releases_callers() {
        let viewer = Viewer::builder()
            .headless(HeadlessProbe::default())
            .handler("Explode", |_: &mut WindowSet, _: &[Arg]| -> CommandResult {
                panic!("handler blew up")
            })
            .spawn()
            .expect("spawn viewer");
        let handle = viewer.handle();

        assert_eq!(
            handle.call_custom("Explode", Vec::new()),
            Err(ViewerError::OwnerStopped)
        );
        viewer.shutdown().expect("join after panic");
        assert_eq!(handle.lifecycle(), OwnerLifecycle::Stopped);
        assert_eq!(
            handle.view_params(WindowId::new(1)),
            Err(ViewerError::OwnerStopped)
        );
    }

    #[test]
    fn invalid_requests_are_rejected_before_queueing() {
        let (viewer, _probe) = headless_viewer();
        let bad = ViewParams {
            zoom: -1.0,
            ..ViewParams::default()
        };
        assert_eq!(
            viewer.set_view_params(WindowId::new(1), bad).unwrap_err().code(),
            1
        );
        assert_eq!(viewer.queued(), 0);
    }
}
