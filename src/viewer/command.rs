//! Requests marshaled onto the owner thread and the one-shot reply that
//! releases a synchronous caller.

use crate::viewer::error::ViewerError;
use crate::viewer::queue::Coalesce;
use crate::viewer::scene::SceneHandle;
use crate::viewer::view::ViewParams;
use crate::viewer::window::{WindowId, WindowSpec};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError};

pub const MAX_ARGUMENTS: usize = 8;
pub const MAX_OPERATION_NAME_LEN: usize = 31;

/// Argument value for custom operations. Caller and handler agree on count
/// and types per operation name.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Window(WindowId),
    Scene(SceneHandle),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    CreateWindow(WindowSpec),
    DestroyWindow(WindowId),
    Refresh(WindowId),
    ResetView(WindowId),
    ShowScene(WindowId, SceneHandle),
    GetViewParams(WindowId),
    SetViewParams(WindowId, ViewParams),
    IsWindowActive(WindowId),
    Custom { name: String, args: Vec<Arg> },
}

impl Request {
    /// Validated constructor for custom operations.
    pub fn custom(name: impl Into<String>, args: Vec<Arg>) -> Result<Self, ViewerError> {
        let request = Self::Custom {
            name: name.into(),
            args,
        };
        request.validate()?;
        Ok(request)
    }

    /// Operation name used for dispatch and logging.
    pub fn name(&self) -> &str {
        match self {
            Self::Custom { name, .. } => name.as_str(),
            other => other.label(),
        }
    }

    /// Static label of the request kind; custom operations share one.
    pub fn label(&self) -> &'static str {
        match self {
            Self::CreateWindow(_) => "CreateWindow",
            Self::DestroyWindow(_) => "DestroyWindow",
            Self::Refresh(_) => "Refresh",
            Self::ResetView(_) => "ResetView",
            Self::ShowScene(..) => "ShowScene",
            Self::GetViewParams(_) => "GetViewParams",
            Self::SetViewParams(..) => "SetViewParams",
            Self::IsWindowActive(_) => "IsWindowActive",
            Self::Custom { .. } => "Custom",
        }
    }

    pub fn validate(&self) -> Result<(), ViewerError> {
        match self {
            Self::Custom { name, args } => {
                if name.is_empty() || name.len() > MAX_OPERATION_NAME_LEN {
                    return Err(ViewerError::invalid(format!(
                        "operation name must be 1..={MAX_OPERATION_NAME_LEN} bytes, got {}",
                        name.len()
                    )));
                }
                if args.len() > MAX_ARGUMENTS {
                    return Err(ViewerError::invalid(format!(
                        "'{name}' carries {} arguments, at most {MAX_ARGUMENTS} allowed",
                        args.len()
                    )));
                }
                Ok(())
            }
            Self::SetViewParams(_, params) => params.validate(),
            Self::CreateWindow(spec) if spec.width == 0 || spec.height == 0 => Err(
                ViewerError::invalid("window dimensions must be non-zero"),
            ),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Done,
    Window(WindowId),
    View(ViewParams),
    Active(bool),
    Value(Arg),
}

pub type CommandResult = Result<Reply, ViewerError>;

/// Sending half of a synchronous command's reply.
#[derive(Debug)]
pub struct Responder(SyncSender<CommandResult>);

impl Responder {
    /// Delivers the outcome. A caller that already gave up is ignored.
    pub fn send(self, result: CommandResult) {
        let _ = self.0.send(result);
    }
}

#[derive(Debug)]
pub struct Command {
    request: Request,
    responder: Option<Responder>,
}

impl Command {
    /// Fire-and-forget command.
    pub fn new(request: Request) -> Self {
        Self {
            request,
            responder: None,
        }
    }

    /// Command whose outcome the caller collects through the returned
    /// [`Completion`].
    pub fn with_completion(request: Request) -> (Self, Completion) {
        let (tx, rx) = sync_channel(1);
        let command = Self {
            request,
            responder: Some(Responder(tx)),
        };
        (command, Completion { rx, result: None })
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn name(&self) -> &str {
        self.request.name()
    }

    pub fn is_synchronous(&self) -> bool {
        self.responder.is_some()
    }

    pub fn into_parts(self) -> (Request, Option<Responder>) {
        (self.request, self.responder)
    }
}

impl Coalesce for Command {
    fn coalesces_with(&self, other: &Self) -> bool {
        self.request == other.request
    }
}

/// Receiving half of a synchronous command. Dropping the command without a
/// reply (owner gone, queue closed) resolves it to `OwnerStopped`.
#[derive(Debug)]
pub struct Completion {
    rx: Receiver<CommandResult>,
    result: Option<CommandResult>,
}

impl Completion {
    /// Polls without blocking.
    pub fn is_complete(&mut self) -> bool {
        if self.result.is_some() {
            return true;
        }
        match self.rx.try_recv() {
            Ok(result) => {
                self.result = Some(result);
                true
            }
            Err(TryRecvError::Disconnected) => {
                self.result = Some(Err(ViewerError::OwnerStopped));
                true
            }
            Err(TryRecvError::Empty) => false,
        }
    }

    /// Blocks until the owner thread has run the command.
    pub fn wait(mut self) -> CommandResult {
        if let Some(result) = self.result.take() {
            return result;
        }
        self.rx.recv().unwrap_or(Err(ViewerError::OwnerStopped))
    }
}
