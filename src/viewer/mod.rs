//! Owner-thread viewer core: the command relay onto the thread that owns
//! every window, the loop that arbitrates input, commands and idle work,
//! and the group protocol that keeps views in step across processes.

pub mod backend;
pub mod command;
pub mod error;
pub mod exchange;
pub mod headless;
pub mod input;
pub mod navigate;
pub mod owner;
pub mod queue;
pub mod reconcile;
pub mod scene;
pub mod service;
pub mod state;
pub mod view;
pub mod window;

pub use backend::{FrameContext, Renderer, WindowBackend};
pub use command::{Arg, Command, Completion, Reply, Request};
pub use error::ViewerError;
pub use exchange::{Exchange, LocalGroup, SoloExchange};
pub use headless::{HeadlessBackend, HeadlessProbe, RecordingRenderer};
pub use input::{InputEvent, InputKind, Key, MouseButton};
pub use navigate::AutoNavigator;
pub use owner::{LoopConfig, LoopStatsSnapshot, OwnerLoop, OwnerShared, Step};
pub use queue::{CommandQueue, EnqueueError};
pub use reconcile::{merge_round, MergeOutcome, Reconciler, RoundRecord};
pub use scene::{Bounds, Scene, SceneHandle, StaticScene};
pub use service::{Viewer, ViewerBuilder, ViewerHandle};
pub use state::OwnerLifecycle;
pub use view::{ViewParams, ViewState, Viewport};
pub use window::{WindowId, WindowSet, WindowSpec, WindowState};
