//! # Actions
//!
//! The seam between one stroke and the host's general action/undo framework. The
//! host owns strict LIFO ordering and the undo-menu presentation; this adapter owns
//! translating its perform/undo calls into history operations, idempotently.
//!
//! Capture flow, as driven by the host's brush tool:
//! create -> [`BrushAction::prepare`] -> [`BrushAction::add_sample`]* ->
//! [`BrushAction::finish`] -> thereafter [`Undoable::undo`]/[`Undoable::perform`].

use std::sync::Arc;

use crate::brush::BrushEngine;
use crate::history::{FinishOutcome, History};
use crate::layer::BitmapLayer;
use crate::persistence::PersistenceMode;
use crate::stroke::{PrepareError, SamplePoint, Stroke, StrokeId};

/// One undoable unit as the host framework sees it.
pub trait Undoable {
    /// Human-readable name for the undo menu.
    fn label(&self) -> &str;
    /// Ready to be registered: has a target layer and at least one sample.
    fn is_ready(&self) -> bool;
    /// Apply (redo) the unit. A no-op if it is already applied.
    fn perform(&mut self, history: &mut History) -> anyhow::Result<()>;
    /// Inverse of [`Undoable::perform`]. A no-op if already undone.
    fn undo(&mut self, history: &mut History) -> anyhow::Result<()>;
}

enum Phase {
    /// Still recording samples.
    Capturing(Box<Stroke>),
    /// Sealed into the history; undo/redo by id from here on.
    Sealed(StrokeId),
    /// Finished with zero visible change - permanently inert.
    Discarded,
}

pub struct BrushAction {
    label: String,
    phase: Phase,
}

impl BrushAction {
    #[must_use]
    pub fn new(
        layer: Arc<BitmapLayer>,
        engine: Box<dyn BrushEngine>,
        mode: PersistenceMode,
    ) -> Self {
        Self {
            label: "Brush Stroke".to_owned(),
            phase: Phase::Capturing(Box::new(Stroke::new(layer, engine, mode))),
        }
    }
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    /// The sealed stroke's id, once [`BrushAction::finish`] registered it.
    #[must_use]
    pub fn stroke_id(&self) -> Option<StrokeId> {
        match &self.phase {
            Phase::Sealed(id) => Some(*id),
            _ => None,
        }
    }

    pub fn prepare(&mut self, history: &mut History) -> Result<(), PrepareError> {
        match &mut self.phase {
            Phase::Capturing(stroke) => stroke.prepare(history),
            _ => Err(PrepareError::AlreadyPrepared),
        }
    }
    /// Forward one pointer sample to the stroke. Paints immediately.
    pub fn add_sample(&mut self, sample: SamplePoint) {
        match &mut self.phase {
            Phase::Capturing(stroke) => stroke.add_sample_and_apply(sample),
            _ => panic!("sampled a finished action"),
        }
    }
    /// Seal the stroke at drag end. Returns whether it was registered; a stroke
    /// with zero visible change is discarded and the action becomes inert.
    pub fn finish(&mut self, history: &mut History) -> FinishOutcome {
        let Phase::Capturing(stroke) = std::mem::replace(&mut self.phase, Phase::Discarded) else {
            panic!("finished an action twice");
        };
        let outcome = history.finish(*stroke);
        if let FinishOutcome::Registered(id) = outcome {
            self.phase = Phase::Sealed(id);
        }
        outcome
    }
}

impl Undoable for BrushAction {
    fn label(&self) -> &str {
        &self.label
    }
    fn is_ready(&self) -> bool {
        match &self.phase {
            Phase::Capturing(stroke) => !stroke.samples().is_empty(),
            Phase::Sealed(_) => true,
            Phase::Discarded => false,
        }
    }
    fn perform(&mut self, history: &mut History) -> anyhow::Result<()> {
        match &self.phase {
            Phase::Sealed(id) => {
                history.redo_expecting(*id)?;
                Ok(())
            }
            Phase::Capturing(_) => Err(anyhow::anyhow!("stroke not sealed yet")),
            // A discarded action never had an effect to re-apply.
            Phase::Discarded => Ok(()),
        }
    }
    fn undo(&mut self, history: &mut History) -> anyhow::Result<()> {
        match &self.phase {
            Phase::Sealed(id) => {
                history.undo_expecting(*id)?;
                Ok(())
            }
            Phase::Capturing(_) => Err(anyhow::anyhow!("stroke not sealed yet")),
            Phase::Discarded => Ok(()),
        }
    }
}

impl std::fmt::Debug for BrushAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match &self.phase {
            Phase::Capturing(stroke) => format!("capturing ({} samples)", stroke.samples().len()),
            Phase::Sealed(id) => format!("sealed ({id:?})"),
            Phase::Discarded => "discarded".to_owned(),
        };
        f.debug_struct("BrushAction")
            .field("label", &self.label)
            .field("phase", &phase)
            .finish()
    }
}
