//! Collective all-gather used by view reconciliation.
//!
//! Membership is fixed when the group is formed. A member that stops
//! calling `all_gather` without leaving stalls every other member at its
//! next round.

use crate::viewer::reconcile::{RoundRecord, RECORD_WIRE_LEN};
use anyhow::{anyhow, ensure, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

pub trait Exchange: Send {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    /// Contributes `local` and returns every member's record in rank order,
    /// including this member's own. Blocks until all members arrive.
    fn all_gather(&mut self, local: RoundRecord) -> Result<Vec<RoundRecord>>;
}

/// Group of one; used when the process is not part of a larger group.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoloExchange;

impl Exchange for SoloExchange {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&mut self, local: RoundRecord) -> Result<Vec<RoundRecord>> {
        Ok(vec![local])
    }
}

#[derive(Debug)]
struct GroupState {
    active: Vec<bool>,
    round: u64,
    pending: Vec<Option<[f32; RECORD_WIRE_LEN]>>,
    completed: Vec<[f32; RECORD_WIRE_LEN]>,
}

impl GroupState {
    fn active_count(&self) -> usize {
        self.active.iter().filter(|active| **active).count()
    }

    /// Publishes the round once every active member has contributed.
    fn try_complete(&mut self) -> bool {
        let contributed = self.pending.iter().filter(|slot| slot.is_some()).count();
        if contributed == 0 || contributed < self.active_count() {
            return false;
        }
        self.completed = self.pending.iter_mut().filter_map(Option::take).collect();
        self.round += 1;
        true
    }
}

#[derive(Debug)]
struct GroupShared {
    state: Mutex<GroupState>,
    round_done: Condvar,
}

/// In-process group of `size` members, each driven from its own thread.
/// Records travel in their wire form. Dropping a member removes it from
/// the group so the remaining members keep going; a member that is alive
/// but never calls `all_gather` still stalls the rest.
#[derive(Debug)]
pub struct LocalGroup {
    shared: Arc<GroupShared>,
    rank: usize,
    size: usize,
}

impl LocalGroup {
    /// Creates all members of a group, in rank order.
    pub fn new(size: usize) -> Result<Vec<LocalGroup>> {
        ensure!(size > 0, "a group needs at least one member");
        let shared = Arc::new(GroupShared {
            state: Mutex::new(GroupState {
                active: vec![true; size],
                round: 0,
                pending: vec![None; size],
                completed: Vec::new(),
            }),
            round_done: Condvar::new(),
        });
        Ok((0..size)
            .map(|rank| LocalGroup {
                shared: Arc::clone(&shared),
                rank,
                size,
            })
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, GroupState>> {
        self.shared
            .state
            .lock()
            .map_err(|_| anyhow!("exchange group lock poisoned"))
    }
}

impl Exchange for LocalGroup {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather(&mut self, local: RoundRecord) -> Result<Vec<RoundRecord>> {
        let mut state = self.lock()?;
        let round = state.round;
        state.pending[self.rank] = Some(local.to_wire());
        if state.try_complete() {
            self.shared.round_done.notify_all();
        } else {
            state = self
                .shared
                .round_done
                .wait_while(state, |state| state.round == round)
                .map_err(|_| anyhow!("exchange group lock poisoned"))?;
        }
        // A member cannot complete the next round without this one, so
        // `completed` still holds this round's records.
        Ok(state
            .completed
            .iter()
            .copied()
            .map(RoundRecord::from_wire)
            .collect())
    }
}

impl Drop for LocalGroup {
    fn drop(&mut self) {
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        state.active[self.rank] = false;
        state.pending[self.rank] = None;
        if state.try_complete() {
            self.shared.round_done.notify_all();
        }
        tracing::debug!(rank = self.rank, "left exchange group");
    }
}
