use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerLifecycle {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl OwnerLifecycle {
    pub fn accepts_commands(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }

    pub fn is_stopped(self) -> bool {
        matches!(self, Self::Stopped)
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Stopped => 3,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

pub fn can_transition(from: OwnerLifecycle, to: OwnerLifecycle) -> bool {
    matches!(
        (from, to),
        (OwnerLifecycle::Starting, OwnerLifecycle::Running)
            | (OwnerLifecycle::Starting, OwnerLifecycle::Stopped)
            | (OwnerLifecycle::Running, OwnerLifecycle::Draining)
            | (OwnerLifecycle::Running, OwnerLifecycle::Stopped)
            | (OwnerLifecycle::Draining, OwnerLifecycle::Stopped)
    ) || from == to
}

/// Lifecycle cell shared between the owner thread and its handles.
#[derive(Debug)]
pub struct LifecycleCell(AtomicU8);

impl LifecycleCell {
    pub fn new(initial: OwnerLifecycle) -> Self {
        Self(AtomicU8::new(initial.to_raw()))
    }

    pub fn get(&self) -> OwnerLifecycle {
        OwnerLifecycle::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves to `to` if allowed from the current state. Returns whether the
    /// transition happened.
    pub fn transition(&self, to: OwnerLifecycle) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let from = OwnerLifecycle::from_raw(current);
            if !can_transition(from, to) {
                tracing::warn!(?from, ?to, "rejected viewer lifecycle transition");
                return false;
            }
            match self.0.compare_exchange(
                current,
                to.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    if from != to {
                        tracing::debug!(?from, ?to, "viewer lifecycle transition");
                    }
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Forces `Stopped` regardless of the current state.
    pub fn force_stopped(&self) {
        self.0.store(OwnerLifecycle::Stopped.to_raw(), Ordering::Release);
    }
}
