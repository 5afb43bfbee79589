//! The loop run by the single thread that owns every window.
//!
//! Each iteration does exactly one unit of work, chosen in strict priority
//! order: all pending input events, else one queued command, else an idle
//! step (reconciliation round, then rendering of dirty windows).

use crate::settings::ViewerSettings;
use crate::viewer::backend::{FrameContext, Renderer, WindowBackend};
use crate::viewer::command::{Arg, Command, CommandResult, Reply, Request};
use crate::viewer::error::{status_code, ViewerError};
use crate::viewer::input::{handle_input, InputEvent, InputKind, DEFAULT_ZOOM_FACTOR};
use crate::viewer::queue::CommandQueue;
use crate::viewer::reconcile::{MergeOutcome, Reconciler, RoundRecord};
use crate::viewer::state::{LifecycleCell, OwnerLifecycle};
use crate::viewer::window::{WindowId, WindowSet, WindowSpec, WindowState};
use anyhow::{ensure, Result};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Input batches handled while draining before input is ignored, so a
/// source that never goes quiet cannot hold up shutdown.
const DRAIN_INPUT_BATCH_LIMIT: usize = 64;

/// Handler for a custom operation, registered by name before the owner
/// starts.
pub type CustomHandler = Box<dyn FnMut(&mut WindowSet, &[Arg]) -> CommandResult + Send>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopConfig {
    pub zoom_factor: f32,
    pub idle_wait: Duration,
    pub render_stats_interval: u32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            zoom_factor: DEFAULT_ZOOM_FACTOR,
            idle_wait: Duration::from_millis(4),
            render_stats_interval: 100,
        }
    }
}

impl LoopConfig {
    pub fn from_settings(settings: &ViewerSettings) -> Self {
        Self {
            zoom_factor: settings.zoom_factor,
            idle_wait: settings.idle_wait(),
            render_stats_interval: settings.render_stats_interval,
        }
    }
}

#[derive(Debug, Default)]
pub struct LoopStats {
    input_batches: AtomicU64,
    input_events: AtomicU64,
    commands: AtomicU64,
    idle_rounds: AtomicU64,
    renders: AtomicU64,
    dropped_commands: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStatsSnapshot {
    pub input_batches: u64,
    pub input_events: u64,
    pub commands: u64,
    pub idle_rounds: u64,
    pub renders: u64,
    pub dropped_commands: u64,
}

impl LoopStats {
    pub fn snapshot(&self) -> LoopStatsSnapshot {
        LoopStatsSnapshot {
            input_batches: self.input_batches.load(Ordering::Relaxed),
            input_events: self.input_events.load(Ordering::Relaxed),
            commands: self.commands.load(Ordering::Relaxed),
            idle_rounds: self.idle_rounds.load(Ordering::Relaxed),
            renders: self.renders.load(Ordering::Relaxed),
            dropped_commands: self.dropped_commands.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_commands.fetch_add(1, Ordering::Relaxed);
    }

    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// State shared between the owner thread and every handle.
#[derive(Debug)]
pub struct OwnerShared {
    lifecycle: LifecycleCell,
    stop_requested: AtomicBool,
    owner_thread: OnceCell<ThreadId>,
    stats: LoopStats,
}

impl Default for OwnerShared {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleCell::new(OwnerLifecycle::Starting),
            stop_requested: AtomicBool::new(false),
            owner_thread: OnceCell::new(),
            stats: LoopStats::default(),
        }
    }
}

impl OwnerShared {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle(&self) -> OwnerLifecycle {
        self.lifecycle.get()
    }

    pub(crate) fn lifecycle_cell(&self) -> &LifecycleCell {
        &self.lifecycle
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Records the calling thread as the owner. Fails if another thread
    /// already owns this context.
    pub fn bind_owner_thread(&self) -> bool {
        let current = thread::current().id();
        *self.owner_thread.get_or_init(|| current) == current
    }

    pub fn is_owner_thread(&self) -> bool {
        self.owner_thread.get() == Some(&thread::current().id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Drained a batch of this many input events.
    Input(usize),
    Command,
    Idle { rendered: usize },
}

#[derive(Debug)]
struct RenderClock {
    interval: u32,
    count: u32,
    total: Duration,
}

impl RenderClock {
    fn new(interval: u32) -> Self {
        Self {
            interval,
            count: 0,
            total: Duration::ZERO,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        if self.interval == 0 {
            return;
        }
        self.count += 1;
        self.total += elapsed;
        if self.count >= self.interval {
            let average = self.total / self.count;
            tracing::info!(
                renders = self.count,
                average_ms = average.as_secs_f64() * 1000.0,
                "average render time"
            );
            self.count = 0;
            self.total = Duration::ZERO;
        }
    }
}

pub struct OwnerLoop {
    queue: Arc<CommandQueue<Command>>,
    shared: Arc<OwnerShared>,
    backend: Box<dyn WindowBackend>,
    renderer: Box<dyn Renderer>,
    reconciler: Reconciler,
    handlers: HashMap<String, CustomHandler>,
    config: LoopConfig,
    windows: WindowSet,
    modified_since_round: bool,
    render_clock: RenderClock,
}

impl OwnerLoop {
    /// Must be called on the thread that will run the loop.
    pub fn new(
        queue: Arc<CommandQueue<Command>>,
        shared: Arc<OwnerShared>,
        backend: Box<dyn WindowBackend>,
        renderer: Box<dyn Renderer>,
        reconciler: Reconciler,
        config: LoopConfig,
    ) -> Result<Self> {
        ensure!(
            shared.bind_owner_thread(),
            "viewer context is already owned by another thread"
        );
        Ok(Self {
            queue,
            shared,
            backend,
            renderer,
            reconciler,
            handlers: HashMap::new(),
            render_clock: RenderClock::new(config.render_stats_interval),
            config,
            windows: WindowSet::new(),
            modified_since_round: false,
        })
    }

    pub fn register(&mut self, name: impl Into<String>, handler: CustomHandler) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn windows(&self) -> &WindowSet {
        &self.windows
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Whether input changed the primary view since the last round.
    pub fn modified_since_round(&self) -> bool {
        self.modified_since_round
    }

    /// Runs until a stop is requested, then drains.
    pub fn run(mut self) {
        self.shared.lifecycle.transition(OwnerLifecycle::Running);
        tracing::info!(
            rank = self.reconciler.rank(),
            group = self.reconciler.group_size(),
            "viewer owner thread running"
        );
        while !self.shared.stop_requested() {
            if let Step::Idle { rendered: 0 } = self.step() {
                self.queue.wait_for_item(self.config.idle_wait);
            }
        }
        self.drain();
    }

    /// One loop iteration.
    pub fn step(&mut self) -> Step {
        if let Some(step) = self.service_pending() {
            return step;
        }
        let rendered = self.idle();
        Step::Idle { rendered }
    }

    /// Closes the queue, services what is left, destroys every remaining
    /// window and stops.
    pub fn drain(&mut self) {
        self.shared.lifecycle.transition(OwnerLifecycle::Draining);
        self.queue.close();
        let mut input_batches = 0;
        loop {
            if input_batches < DRAIN_INPUT_BATCH_LIMIT && self.service_input().is_some() {
                input_batches += 1;
                continue;
            }
            if !self.service_command() {
                break;
            }
        }
        if input_batches == DRAIN_INPUT_BATCH_LIMIT {
            tracing::warn!("input still pending at shutdown; ignoring the rest");
        }
        for id in self.windows.ids() {
            self.destroy_window(id);
        }
        self.shared.lifecycle.transition(OwnerLifecycle::Stopped);
        tracing::info!("viewer owner thread stopped");
    }

    fn service_pending(&mut self) -> Option<Step> {
        if let Some(count) = self.service_input() {
            return Some(Step::Input(count));
        }
        self.service_command().then_some(Step::Command)
    }

    fn service_input(&mut self) -> Option<usize> {
        if !self.backend.has_pending_events() {
            return None;
        }
        let events = self.backend.poll_events();
        let count = events.len();
        for event in events {
            self.handle_event(event);
        }
        LoopStats::bump(&self.shared.stats.input_batches, 1);
        LoopStats::bump(&self.shared.stats.input_events, count as u64);
        Some(count)
    }

    fn service_command(&mut self) -> bool {
        match self.queue.dequeue() {
            Some(command) => {
                self.execute(command);
                true
            }
            None => false,
        }
    }

    fn handle_event(&mut self, event: InputEvent) {
        let target = match event.kind {
            InputKind::CloseRequested => {
                if self.windows.contains(event.window) {
                    tracing::debug!(window = %event.window, "window close requested");
                    self.destroy_window(event.window);
                }
                return;
            }
            InputKind::FocusIn => {
                self.windows.set_focus(Some(event.window));
                return;
            }
            InputKind::FocusOut => {
                if self.windows.focused() == Some(event.window) {
                    self.windows.set_focus(None);
                }
                return;
            }
            InputKind::Configure { .. } | InputKind::Expose => {
                Some(event.window).filter(|id| self.windows.contains(*id))
            }
            _ => self.windows.route_input(event.window),
        };
        let Some(target) = target else {
            tracing::trace!(window = %event.window, "input for unknown window ignored");
            return;
        };
        let primary = self.windows.primary();
        if let Some(window) = self.windows.get_mut(target) {
            let changed = handle_input(window, event.kind, self.config.zoom_factor);
            if changed && primary == Some(target) {
                self.modified_since_round = true;
            }
        }
    }

    fn execute(&mut self, command: Command) {
        let (request, responder) = command.into_parts();
        let operation = request.name().to_string();
        let result = self.dispatch(request);
        if let Err(err) = &result {
            let code = status_code(&result);
            tracing::warn!(%operation, code, %err, "viewer command failed");
        }
        LoopStats::bump(&self.shared.stats.commands, 1);
        if let Some(responder) = responder {
            responder.send(result);
        }
    }

    fn dispatch(&mut self, request: Request) -> CommandResult {
        request.validate()?;
        match request {
            Request::CreateWindow(spec) => self.create_window(spec).map(Reply::Window),
            Request::DestroyWindow(id) => {
                if !self.windows.contains(id) {
                    return Err(ViewerError::UnknownWindow(id));
                }
                self.destroy_window(id);
                Ok(Reply::Done)
            }
            Request::Refresh(id) => {
                self.windows.require_mut(id)?.view.mark_dirty();
                Ok(Reply::Done)
            }
            Request::ResetView(id) => {
                self.windows.require_mut(id)?.reset_view();
                Ok(Reply::Done)
            }
            Request::ShowScene(id, scene) => {
                self.windows.require_mut(id)?.show_scene(scene);
                Ok(Reply::Done)
            }
            Request::GetViewParams(id) => {
                let window = self.windows.get(id).ok_or(ViewerError::UnknownWindow(id))?;
                Ok(Reply::View(window.view.params()))
            }
            Request::SetViewParams(id, params) => {
                self.windows.require_mut(id)?.view.set_params(params)?;
                Ok(Reply::Done)
            }
            Request::IsWindowActive(id) => Ok(Reply::Active(self.windows.contains(id))),
            Request::Custom { name, args } => match self.handlers.get_mut(&name) {
                Some(handler) => handler(&mut self.windows, &args),
                None => {
                    tracing::warn!(operation = %name, "unknown viewer operation");
                    Err(ViewerError::invalid(format!("unknown operation '{name}'")))
                }
            },
        }
    }

    fn create_window(&mut self, spec: WindowSpec) -> Result<WindowId, ViewerError> {
        debug_assert!(self.shared.is_owner_thread());
        let id = self.windows.allocate_id();
        if let Err(err) = self.backend.create_context(id, &spec) {
            tracing::error!(title = %spec.title, ?err, "unable to acquire a graphics context");
            return Err(ViewerError::ContextAcquisitionFailed {
                title: spec.title,
                reason: format!("{err:#}"),
            });
        }
        self.windows.insert(WindowState::new(id, &spec));
        tracing::debug!(window = %id, title = %spec.title, "window created");
        Ok(id)
    }

    fn destroy_window(&mut self, id: WindowId) {
        debug_assert!(self.shared.is_owner_thread());
        if self.windows.remove(id).is_some() {
            self.backend.destroy_context(id);
            tracing::debug!(window = %id, "window destroyed");
        }
    }

    fn idle(&mut self) -> usize {
        LoopStats::bump(&self.shared.stats.idle_rounds, 1);
        let primary = self.windows.primary();
        let local = match primary.and_then(|id| self.windows.get(id)) {
            Some(window) => RoundRecord::new(self.modified_since_round, window.view.params()),
            None => RoundRecord::idle(),
        };
        self.modified_since_round = false;

        let outcome = self.reconciler.round(local);
        if let Some(window) = primary.and_then(|id| self.windows.get_mut(id)) {
            match outcome {
                MergeOutcome::Drive => window.view.mark_dirty(),
                MergeOutcome::Adopt(params) => {
                    if let Err(err) = window.view.set_params(params) {
                        tracing::warn!(%err, "ignoring invalid view from group");
                    }
                }
                MergeOutcome::Unchanged => {}
            }
        }
        self.render_dirty()
    }

    fn render_dirty(&mut self) -> usize {
        debug_assert!(self.shared.is_owner_thread());
        let mut rendered = 0;
        for window in self.windows.iter_mut() {
            if !window.view.is_dirty() {
                continue;
            }
            let started = Instant::now();
            let frame = FrameContext::for_window(window);
            if let Err(err) = self.renderer.render(&frame) {
                tracing::warn!(window = %window.id, ?err, "render failed");
                continue;
            }
            if let Err(err) = self.backend.present(window.id) {
                tracing::warn!(window = %window.id, ?err, "present failed");
            }
            window.view.clean();
            rendered += 1;
            self.render_clock.record(started.elapsed());
        }
        LoopStats::bump(&self.shared.stats.renders, rendered as u64);
        rendered
    }
}

impl std::fmt::Debug for OwnerLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnerLoop")
            .field("windows", &self.windows.ids())
            .field("queued", &self.queue.len())
            .field("reconciler", &self.reconciler)
            .field("modified_since_round", &self.modified_since_round)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewer::exchange::SoloExchange;
    use crate::viewer::headless::{HeadlessBackend, HeadlessProbe, RecordingRenderer};
    use crate::viewer::input::{Key, MouseButton};
    use crate::viewer::scene::{Bounds, Scene, SceneHandle, StaticScene};
    use crate::viewer::view::ViewParams;

    struct Fixture {
        owner: OwnerLoop,
        queue: Arc<CommandQueue<Command>>,
        shared: Arc<OwnerShared>,
        probe: HeadlessProbe,
        renderer: RecordingRenderer,
    }

    fn fixture() -> Fixture {
        let queue = Arc::new(CommandQueue::new(8));
        let shared = Arc::new(OwnerShared::new());
        let (backend, probe) = HeadlessBackend::new();
        let renderer = RecordingRenderer::new();
        let owner = OwnerLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shared),
            Box::new(backend),
            Box::new(renderer.clone()),
            Reconciler::new(Box::new(SoloExchange)),
            LoopConfig::default(),
        )
        .expect("owner loop");
        Fixture {
            owner,
            queue,
            shared,
            probe,
            renderer,
        }
    }

    fn run_sync(f: &mut Fixture, request: Request) -> CommandResult {
        let (command, completion) = Command::with_completion(request);
        f.queue.enqueue(command).expect("enqueue");
        assert_eq!(f.owner.step(), Step::Command);
        completion.wait()
    }

    fn open_window(f: &mut Fixture) -> WindowId {
        match run_sync(f, Request::CreateWindow(WindowSpec::new("t", 0, 0, 200, 200))) {
            Ok(Reply::Window(id)) => id,
            other => panic!("unexpected reply {other:?}"),
        }
    }

    fn scene() -> SceneHandle {
        SceneHandle::new(StaticScene::new(Bounds::new(
            [0.0, 0.0, 0.0],
            [100.0, 100.0, 0.0],
        )))
    }

    #[test]
    fn synchronous_command_completes_with_handler_result() {
        let mut f = fixture();
        let (command, mut completion) =
            Command::with_completion(Request::CreateWindow(WindowSpec::default()));
        f.queue.enqueue(command).unwrap();
        assert!(!completion.is_complete());

        f.owner.step();
        assert!(completion.is_complete());
        let id = match completion.wait() {
            Ok(Reply::Window(id)) => id,
            other => panic!("unexpected reply {other:?}"),
        };
        assert!(f.owner.windows().contains(id));
        assert_eq!(f.probe.open_windows(), vec![id]);
    }

    #[test]
    fn failed_context_reports_failure_and_loop_continues() {
        let mut f = fixture();
        f.probe.fail_next_context("no display");
        let err = run_sync(&mut f, Request::CreateWindow(WindowSpec::default())).unwrap_err();
        assert_eq!(err.code(), 4);
        assert!(f.owner.windows().is_empty());

        let id = open_window(&mut f);
        assert_eq!(
            run_sync(&mut f, Request::IsWindowActive(id)),
            Ok(Reply::Active(true))
        );
    }

    #[test]
    fn input_is_served_before_commands() {
        let mut f = fixture();
        let id = open_window(&mut f);
        f.queue.enqueue(Command::new(Request::Refresh(id))).unwrap();
        f.probe.push_events([
            InputEvent::new(id, InputKind::Expose),
            InputEvent::new(id, InputKind::Expose),
        ]);

        assert_eq!(f.owner.step(), Step::Input(2));
        assert_eq!(f.owner.step(), Step::Command);
        assert!(matches!(f.owner.step(), Step::Idle { .. }));
    }

    #[test]
    fn idle_renders_dirty_windows_once() {
        let mut f = fixture();
        let id = open_window(&mut f);
        assert_eq!(f.owner.step(), Step::Idle { rendered: 1 });
        assert_eq!(f.owner.step(), Step::Idle { rendered: 0 });
        assert_eq!(f.renderer.frame_count(), 1);
        assert_eq!(f.probe.presented(), 1);
        assert!(!f.owner.windows().get(id).unwrap().view.is_dirty());
    }

    #[test]
    fn view_params_round_trip_through_commands() {
        let mut f = fixture();
        let id = open_window(&mut f);
        run_sync(&mut f, Request::ShowScene(id, scene())).unwrap();
        let params = ViewParams {
            center: [10.0, 20.0],
            zoom: 3.0,
            rotation_x: -70.0,
            rotation_z: 1.5,
        };
        run_sync(&mut f, Request::SetViewParams(id, params)).unwrap();
        assert_eq!(
            run_sync(&mut f, Request::GetViewParams(id)),
            Ok(Reply::View(params))
        );
        run_sync(&mut f, Request::ResetView(id)).unwrap();
        assert_eq!(
            run_sync(&mut f, Request::GetViewParams(id)),
            Ok(Reply::View(ViewParams {
                center: [50.0, 50.0],
                ..ViewParams::default()
            }))
        );
    }

    #[test]
    fn commands_for_unknown_windows_fail_without_stopping() {
        let mut f = fixture();
        let ghost = WindowId::new(77);
        assert_eq!(
            run_sync(&mut f, Request::Refresh(ghost)),
            Err(ViewerError::UnknownWindow(ghost))
        );
        assert_eq!(
            run_sync(&mut f, Request::IsWindowActive(ghost)),
            Ok(Reply::Active(false))
        );
    }

    #[test]
    fn unknown_custom_operation_is_invalid() {
        let mut f = fixture();
        let request = Request::custom("Nope", Vec::new()).unwrap();
        assert_eq!(run_sync(&mut f, request).unwrap_err().code(), 1);
    }

    #[test]
    fn custom_handlers_dispatch_by_exact_name() {
        let mut f = fixture();
        f.owner.register(
            "CountWindows",
            Box::new(|windows: &mut WindowSet, _args: &[Arg]| {
                Ok(Reply::Value(Arg::Int(windows.len() as i64)))
            }),
        );
        open_window(&mut f);
        let request = Request::custom("CountWindows", Vec::new()).unwrap();
        assert_eq!(run_sync(&mut f, request), Ok(Reply::Value(Arg::Int(1))));
        let request = Request::custom("countwindows", Vec::new()).unwrap();
        assert!(run_sync(&mut f, request).is_err());
    }

    #[test]
    fn close_request_destroys_the_window() {
        let mut f = fixture();
        let id = open_window(&mut f);
        f.probe.push_event(InputEvent::new(id, InputKind::CloseRequested));
        f.owner.step();
        assert!(!f.owner.windows().contains(id));
        assert_eq!(f.probe.destroyed(), 1);
    }

    #[test]
    fn input_follows_focus() {
        let mut f = fixture();
        let first = open_window(&mut f);
        let second = open_window(&mut f);
        run_sync(&mut f, Request::ShowScene(first, scene())).unwrap();
        run_sync(&mut f, Request::ShowScene(second, scene())).unwrap();

        f.probe.push_events([
            InputEvent::new(second, InputKind::FocusIn),
            InputEvent::new(
                first,
                InputKind::ButtonPress {
                    button: MouseButton::WheelUp,
                    x: 100,
                    y: 100,
                },
            ),
        ]);
        f.owner.step();
        let zoom = |f: &Fixture, id| f.owner.windows().get(id).unwrap().view.params().zoom;
        assert_eq!(zoom(&f, first), 1.0);
        assert!(zoom(&f, second) > 1.0);
        assert!(!f.owner.modified_since_round(), "second is not primary");
    }

    #[test]
    fn primary_input_marks_round_as_modified_and_round_clears_it() {
        let mut f = fixture();
        let id = open_window(&mut f);
        run_sync(&mut f, Request::ShowScene(id, scene())).unwrap();
        f.probe.push_event(InputEvent::new(
            id,
            InputKind::ButtonPress {
                button: MouseButton::WheelDown,
                x: 10,
                y: 10,
            },
        ));
        f.owner.step();
        assert!(f.owner.modified_since_round());
        assert!(matches!(f.owner.step(), Step::Idle { .. }));
        assert!(!f.owner.modified_since_round());
        assert_eq!(f.owner.reconciler().rounds(), 1);
    }

    #[test]
    fn drain_services_queue_then_destroys_windows() {
        let mut f = fixture();
        let id = open_window(&mut f);
        let (command, completion) = Command::with_completion(Request::IsWindowActive(id));
        f.queue.enqueue(command).unwrap();

        f.owner.drain();
        assert_eq!(completion.wait(), Ok(Reply::Active(true)));
        assert!(f.owner.windows().is_empty());
        assert!(f.probe.open_windows().is_empty());
        assert!(f.queue.is_closed());
        assert_eq!(f.shared.lifecycle(), OwnerLifecycle::Stopped);
    }

    #[test]
    fn second_thread_cannot_bind_the_same_context() {
        let f = fixture();
        let shared = Arc::clone(&f.shared);
        let bound_elsewhere = thread::spawn(move || shared.bind_owner_thread())
            .join()
            .expect("binder thread");
        assert!(!bound_elsewhere);
        assert!(f.shared.is_owner_thread());
    }

    #[test]
    fn stats_count_each_kind_of_step() {
        let mut f = fixture();
        let id = open_window(&mut f);
        f.probe.push_event(InputEvent::new(id, InputKind::Expose));
        f.owner.step();
        f.owner.step();
        let stats = f.shared.stats().snapshot();
        assert_eq!(stats.commands, 1);
        assert_eq!(stats.input_batches, 1);
        assert_eq!(stats.input_events, 1);
        assert_eq!(stats.idle_rounds, 1);
        assert_eq!(stats.renders, 1);
    }

    #[test]
    fn control_motion_on_primary_drives_the_next_round() {
        let mut f = fixture();
        let id = open_window(&mut f);
        run_sync(&mut f, Request::ShowScene(id, scene())).unwrap();
        f.probe.push_events([
            InputEvent::new(id, InputKind::KeyPress { key: Key::Control }),
            InputEvent::new(id, InputKind::Motion { x: 50, y: 100 }),
            InputEvent::new(id, InputKind::Motion { x: 50, y: 70 }),
        ]);
        assert_eq!(f.owner.step(), Step::Input(3));
        assert!(f.owner.modified_since_round());
        let params = f.owner.windows().get(id).unwrap().view.params();
        assert_eq!(params.rotation_x, -30.0);
    }

    fn shared_scene() -> Arc<dyn Scene> {
        Arc::new(StaticScene::new(Bounds::new([0.0; 3], [10.0, 10.0, 0.0])))
    }

    #[test]
    fn arguments_are_released_after_a_handled_command() {
        let mut f = fixture();
        f.owner.register(
            "Inspect",
            Box::new(|_: &mut WindowSet, args: &[Arg]| {
                Ok(Reply::Active(matches!(args, [Arg::Scene(_)])))
            }),
        );
        let scene = shared_scene();
        let handle = SceneHandle::from_arc(Arc::clone(&scene));
        let request = Request::custom("Inspect", vec![Arg::Scene(handle)]).unwrap();
        let (command, completion) = Command::with_completion(request);
        f.queue.enqueue(command).unwrap();
        assert_eq!(Arc::strong_count(&scene), 2);

        assert_eq!(f.owner.step(), Step::Command);
        assert_eq!(completion.wait(), Ok(Reply::Active(true)));
        assert_eq!(Arc::strong_count(&scene), 1);
    }

    #[test]
    fn arguments_are_released_after_a_failed_command() {
        let mut f = fixture();
        let scene = shared_scene();
        let ghost = WindowId::new(42);
        let handle = SceneHandle::from_arc(Arc::clone(&scene));
        let (command, completion) =
            Command::with_completion(Request::ShowScene(ghost, handle.clone()));
        f.queue.enqueue(command).unwrap();
        f.queue.enqueue(Command::new(Request::ShowScene(ghost, handle))).unwrap();
        assert_eq!(Arc::strong_count(&scene), 3);

        f.owner.step();
        f.owner.step();
        assert_eq!(completion.wait(), Err(ViewerError::UnknownWindow(ghost)));
        assert_eq!(Arc::strong_count(&scene), 1);
    }

    /// Backend whose input source never goes quiet.
    struct StormBackend;

    impl WindowBackend for StormBackend {
        fn create_context(&mut self, _id: WindowId, _spec: &WindowSpec) -> Result<()> {
            Ok(())
        }

        fn destroy_context(&mut self, _id: WindowId) {}

        fn has_pending_events(&mut self) -> bool {
            true
        }

        fn poll_events(&mut self) -> Vec<InputEvent> {
            vec![InputEvent::new(WindowId::new(1), InputKind::Expose)]
        }

        fn present(&mut self, _id: WindowId) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn drain_finishes_under_endless_input() {
        let queue = Arc::new(CommandQueue::new(4));
        let shared = Arc::new(OwnerShared::new());
        let mut owner = OwnerLoop::new(
            Arc::clone(&queue),
            Arc::clone(&shared),
            Box::new(StormBackend),
            Box::new(RecordingRenderer::new()),
            Reconciler::new(Box::new(SoloExchange)),
            LoopConfig::default(),
        )
        .expect("owner loop");
        let (command, completion) =
            Command::with_completion(Request::CreateWindow(WindowSpec::default()));
        queue.enqueue(command).unwrap();

        owner.drain();
        assert!(matches!(completion.wait(), Ok(Reply::Window(_))));
        assert!(owner.windows().is_empty());
        assert_eq!(shared.lifecycle(), OwnerLifecycle::Stopped);
        assert_eq!(
            shared.stats().snapshot().input_batches,
            DRAIN_INPUT_BATCH_LIMIT as u64
        );
    }

    #[test]
    fn render_clock_resets_after_each_report() {
        let mut clock = RenderClock::new(2);
        clock.record(Duration::from_millis(2));
        assert_eq!(clock.count, 1);
        clock.record(Duration::from_millis(4));
        assert_eq!(clock.count, 0);
        assert_eq!(clock.total, Duration::ZERO);

        let mut disabled = RenderClock::new(0);
        disabled.record(Duration::from_millis(1));
        assert_eq!(disabled.count, 0);
    }
}
