//! Keeps the primary view of every process in a group identical.
//!
//! Once per idle iteration every member contributes its view and a flag
//! saying whether local input changed it since the previous round. A member
//! that changed its view drives and keeps it; everyone else adopts the
//! highest-ranked modified contribution. All members run the same merge
//! over the same records, so they agree without a leader.

use crate::viewer::exchange::Exchange;
use crate::viewer::view::ViewParams;

/// Float count of one record on the wire: `[flag, cx, cy, zoom, rx, rz]`.
pub const RECORD_WIRE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundRecord {
    pub modified: bool,
    pub params: ViewParams,
}

impl RoundRecord {
    pub fn new(modified: bool, params: ViewParams) -> Self {
        Self { modified, params }
    }

    /// Contribution of a member without a reconciled view.
    pub fn idle() -> Self {
        Self::new(false, ViewParams::default())
    }

    pub fn to_wire(&self) -> [f32; RECORD_WIRE_LEN] {
        let p = &self.params;
        [
            if self.modified { 1.0 } else { 0.0 },
            p.center[0],
            p.center[1],
            p.zoom,
            p.rotation_x,
            p.rotation_z,
        ]
    }

    pub fn from_wire(wire: [f32; RECORD_WIRE_LEN]) -> Self {
        Self {
            modified: wire[0] != 0.0,
            params: ViewParams {
                center: [wire[1], wire[2]],
                zoom: wire[3],
                rotation_x: wire[4],
                rotation_z: wire[5],
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MergeOutcome {
    /// Local input changed the view; keep it and re-render.
    Drive,
    /// Another member drove this round; take its parameters.
    Adopt(ViewParams),
    Unchanged,
}

/// `records` must be in rank order. The last modified record wins.
pub fn merge_round(local_modified: bool, records: &[RoundRecord]) -> MergeOutcome {
    if local_modified {
        return MergeOutcome::Drive;
    }
    records
        .iter()
        .rev()
        .find(|record| record.modified)
        .map(|record| MergeOutcome::Adopt(record.params))
        .unwrap_or(MergeOutcome::Unchanged)
}

/// Runs rounds over an [`Exchange`] and keeps a little bookkeeping.
pub struct Reconciler {
    exchange: Box<dyn Exchange>,
    rounds: u64,
    failures: u64,
}

impl Reconciler {
    pub fn new(exchange: Box<dyn Exchange>) -> Self {
        Self {
            exchange,
            rounds: 0,
            failures: 0,
        }
    }

    pub fn rank(&self) -> usize {
        self.exchange.rank()
    }

    pub fn group_size(&self) -> usize {
        self.exchange.size()
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Contributes `local` and merges. Blocks until every member has
    /// contributed. A failed exchange is logged and changes nothing.
    pub fn round(&mut self, local: RoundRecord) -> MergeOutcome {
        self.rounds += 1;
        let records = match self.exchange.all_gather(local) {
            Ok(records) => records,
            Err(err) => {
                self.failures += 1;
                tracing::error!(?err, round = self.rounds, "view exchange failed");
                return MergeOutcome::Unchanged;
            }
        };
        let outcome = merge_round(local.modified, &records);
        if let MergeOutcome::Adopt(params) = outcome {
            tracing::trace!(
                rank = self.exchange.rank(),
                ?params,
                "adopting view from group"
            );
        }
        outcome
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("rank", &self.exchange.rank())
            .field("size", &self.exchange.size())
            .field("rounds", &self.rounds)
            .field("failures", &self.failures)
            .finish()
    }
}
