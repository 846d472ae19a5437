//! # History
//!
//! A single, strictly time-ordered log of sealed strokes spanning every raster
//! layer being edited. The history is a plain value owned by the document/session -
//! created on open, cleared on close or on an explicit "forget history" after save.
//! There is no ambient global.
//!
//! Undo is strict LIFO over the whole log. Strokes live in an arena (`Vec`) and are
//! only ever appended at the tail, popped at the tail, or dropped wholesale when the
//! redo branch diverges. Scanning backward filtered by layer yields that layer's
//! strokes in true application order, which is what replay correctness rests on.

use crate::buffer::{AllocError, Snapshot};
use crate::layer::{BitmapLayer, LayerId};
use crate::persistence::{MaterializeError, PersistenceMode, ReplayCx};
use crate::stroke::{Stroke, StrokeId};

pub const DEFAULT_CHECKPOINT_INTERVAL: u32 = 20;

/// What `finish` did with a stroke.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FinishOutcome {
    /// Sealed and registered as the new history tail.
    Registered(StrokeId),
    /// The stroke changed nothing (e.g. a zero-pressure drag) and was dropped
    /// entirely - no history entry, no unsaved-changes increment.
    Discarded,
}

impl FinishOutcome {
    #[must_use]
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered(_))
    }
    #[must_use]
    pub fn id(self) -> Option<StrokeId> {
        match self {
            Self::Registered(id) => Some(id),
            Self::Discarded => None,
        }
    }
}

pub struct History {
    /// Applied strokes, oldest first.
    strokes: Vec<Stroke>,
    /// Undone strokes awaiting redo, most recently undone last.
    undone: Vec<Stroke>,
    /// One-time per-layer capture of the buffer before this history first touched
    /// it. Alive until the history itself is cleared.
    baselines: hashbrown::HashMap<LayerId, Snapshot>,
    /// Layers with an unsealed stroke in flight.
    open: hashbrown::HashMap<LayerId, StrokeId>,
    checkpoint_interval: u32,
    /// Count of strokes ever sealed into this history; drives checkpoint cadence.
    sealed: u64,
    /// Unsaved-changes counter. Negative after undoing past a save point.
    pending: i64,
}

impl Default for History {
    fn default() -> Self {
        Self::with_checkpoint_interval(DEFAULT_CHECKPOINT_INTERVAL)
    }
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
    /// `interval` = 1 checkpoints every stroke; larger intervals trade undo speed
    /// for memory.
    #[must_use]
    pub fn with_checkpoint_interval(interval: u32) -> Self {
        assert!(interval >= 1, "checkpoint interval must be at least 1");
        Self {
            strokes: Vec::new(),
            undone: Vec::new(),
            baselines: hashbrown::HashMap::new(),
            open: hashbrown::HashMap::new(),
            checkpoint_interval: interval,
            sealed: 0,
            pending: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.len()
    }
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.strokes.is_empty()
    }
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.undone.len()
    }
    #[must_use]
    pub fn tail_id(&self) -> Option<StrokeId> {
        self.strokes.last().map(Stroke::id)
    }
    /// Net count of registered-minus-undone strokes since the last `mark_saved`.
    #[must_use]
    pub fn pending_changes(&self) -> i64 {
        self.pending
    }
    pub fn mark_saved(&mut self) {
        self.pending = 0;
    }
    /// Forget everything: strokes, redo entries, baselines. Reclaims all snapshot
    /// memory. The unsaved-changes counter is left alone - forgetting history does
    /// not make a dirty document clean.
    pub fn clear(&mut self) {
        log::debug!(
            "forgetting history: {} strokes, {} redo entries, {} baselines",
            self.strokes.len(),
            self.undone.len(),
            self.baselines.len()
        );
        self.strokes.clear();
        self.undone.clear();
        self.baselines.clear();
        self.open.clear();
        self.sealed = 0;
    }

    pub(crate) fn is_layer_open(&self, layer: LayerId) -> bool {
        self.open.contains_key(&layer)
    }
    pub(crate) fn register_open(&mut self, layer: LayerId, stroke: StrokeId) {
        let prev = self.open.insert(layer, stroke);
        debug_assert!(prev.is_none());
    }
    /// Capture the layer's baseline if this history has never touched it.
    pub(crate) fn ensure_baseline(&mut self, layer: &BitmapLayer) -> Result<(), AllocError> {
        if !self.baselines.contains_key(&layer.id()) {
            let snap = layer.try_snapshot()?;
            log::debug!("captured baseline for {:?}", layer.id());
            self.baselines.insert(layer.id(), snap);
        }
        Ok(())
    }
    #[cfg(test)]
    pub(crate) fn stroke_at(&self, index: usize) -> &Stroke {
        &self.strokes[index]
    }

    /// Seal a stroke and register it as the new history tail - or discard it, if
    /// the buffer is bit-identical to what `prepare` saw.
    ///
    /// Registration clears the redo branch (linear undo: recording a divergent
    /// stroke permanently discards undone entries), and captures checkpoint/
    /// full-snapshot result buffers synchronously, right here. Deferring the
    /// capture would let a crash silently break the every-Nth-stroke invariant.
    pub fn finish(&mut self, mut stroke: Stroke) -> FinishOutcome {
        assert!(
            stroke.is_prepared(),
            "finished a stroke that was never prepared"
        );
        // The layer stops being busy regardless of the outcome.
        self.open.remove(&stroke.layer_id());

        if stroke.before_hash() == Some(stroke.layer().content_hash()) {
            log::debug!("{:?}: no visible change, not registered", stroke.id());
            return FinishOutcome::Discarded;
        }

        stroke.applied = true;
        self.sealed += 1;
        match stroke.mode() {
            PersistenceMode::FullSnapshot => stroke.capture_result_snapshot(),
            PersistenceMode::CheckpointedReplay
                if self.sealed % u64::from(self.checkpoint_interval) == 0 =>
            {
                log::debug!("checkpoint at sealed stroke #{}", self.sealed);
                stroke.capture_result_snapshot();
            }
            _ => {}
        }

        if !self.undone.is_empty() {
            log::trace!("dropping {} redo entries", self.undone.len());
            self.undone.clear();
        }
        self.pending += 1;
        let id = stroke.id();
        self.strokes.push(stroke);
        FinishOutcome::Registered(id)
    }

    /// Undo the history tail: restore the pre-stroke buffer and bounds, move the
    /// stroke to the redo stack. `Ok(None)` on an empty history.
    ///
    /// Materialization happens before anything is mutated, so a failure leaves
    /// history and layer exactly as they were.
    pub fn undo(&mut self) -> Result<Option<StrokeId>, MaterializeError> {
        let Some(index) = self.strokes.len().checked_sub(1) else {
            return Ok(None);
        };
        let before = self.materialize_before_at(index)?;
        // Checked non-empty above.
        let mut stroke = self.strokes.pop().unwrap();
        debug_assert_eq!(before.bounds, stroke.before_box());
        stroke.layer().replace(before.pixels, before.bounds);
        stroke.applied = false;
        self.pending -= 1;
        let id = stroke.id();
        log::trace!("undid {:?}", id);
        self.undone.push(stroke);
        Ok(Some(id))
    }

    /// Redo the most recently undone stroke. `Ok(None)` when there is nothing to
    /// redo.
    pub fn redo(&mut self) -> Result<Option<StrokeId>, MaterializeError> {
        let Some(stroke) = self.undone.pop() else {
            return Ok(None);
        };
        let id = stroke.id();
        // Re-push first: materializing `after` wants the stroke in place on top of
        // its predecessors.
        self.strokes.push(stroke);
        let index = self.strokes.len() - 1;
        let after = match self.materialize_after_at(index) {
            Ok(after) => after,
            Err(e) => {
                // Roll the arena back; nothing was installed.
                let stroke = self.strokes.pop().unwrap();
                self.undone.push(stroke);
                return Err(e);
            }
        };
        // Still present - pushed above.
        let stroke = self.strokes.last_mut().unwrap();
        debug_assert_eq!(after.bounds, stroke.after_box());
        stroke.layer().replace(after.pixels, after.bounds);
        stroke.applied = true;
        self.pending += 1;
        log::trace!("redid {:?}", id);
        Ok(Some(id))
    }

    /// Undo a *specific* stroke. Idempotent: a no-op if the stroke is already
    /// undone. Undoing any stroke other than the tail is a programmer error in the
    /// host integration and asserts fatally.
    pub fn undo_expecting(&mut self, id: StrokeId) -> Result<(), MaterializeError> {
        if self.undone.iter().any(|s| s.id() == id) {
            return Ok(());
        }
        assert!(
            self.strokes.iter().any(|s| s.id() == id),
            "{id:?} is not in this history"
        );
        assert_eq!(self.tail_id(), Some(id), "undo out of LIFO order");
        self.undo().map(|_| ())
    }

    /// Redo a *specific* stroke. Idempotent: a no-op if the stroke is already
    /// applied. Redoing out of order asserts fatally.
    pub fn redo_expecting(&mut self, id: StrokeId) -> Result<(), MaterializeError> {
        if self.strokes.iter().any(|s| s.id() == id) {
            return Ok(());
        }
        assert!(
            self.undone.iter().any(|s| s.id() == id),
            "{id:?} is not in this history"
        );
        assert_eq!(
            self.undone.last().map(Stroke::id),
            Some(id),
            "redo out of LIFO order"
        );
        self.redo().map(|_| ())
    }

    pub(crate) fn materialize_before_at(
        &mut self,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        let mode = self.strokes[index].mode();
        let mut cx = ReplayCx::new(&mut self.strokes, &self.baselines);
        mode.strategy().materialize_before(&mut cx, index)
    }
    pub(crate) fn materialize_after_at(
        &mut self,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        let mode = self.strokes[index].mode();
        let mut cx = ReplayCx::new(&mut self.strokes, &self.baselines);
        mode.strategy().materialize_after(&mut cx, index)
    }
}

impl std::fmt::Debug for History {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("History")
            .field("strokes", &self.strokes.len())
            .field("redo", &self.undone.len())
            .field("layers", &self.baselines.len())
            .field("pending", &self.pending)
            .finish()
    }
}
