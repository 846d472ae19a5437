//! # Persistence strategies
//!
//! Three ways of materializing "the buffer before/after this stroke", behind one
//! trait. The mode is fixed per stroke at creation; materialization dispatches
//! through *each stroke's own* strategy, so mixed-mode histories compose - a replay
//! walking backwards bottoms out early at any neighbour that kept its result buffer.
//!
//! | mode                 | undo cost                    | memory per stroke |
//! |----------------------|------------------------------|-------------------|
//! | `FullSnapshot`       | O(1)                         | two buffers       |
//! | `Replay`             | O(layer history)             | samples only      |
//! | `CheckpointedReplay` | O(checkpoint interval)       | samples (+ buffer every Nth stroke) |

use crate::buffer::{AllocError, Snapshot};
use crate::layer::LayerId;
use crate::stroke::Stroke;

/// Strategy selector, fixed per stroke at creation.
///
/// The numeric repr round-trips through the host's integer undo-mode preference
/// (`PersistenceMode::from_repr`).
#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
    strum::Display,
    strum::EnumIter,
    strum::FromRepr,
)]
#[repr(u8)]
pub enum PersistenceMode {
    /// Keep full before/after buffer copies.
    FullSnapshot = 0,
    /// Keep samples only; undo recomputes from the layer's baseline.
    Replay = 1,
    /// Replay, bounded: every Nth sealed stroke also keeps its result buffer.
    #[default]
    CheckpointedReplay = 2,
}

impl PersistenceMode {
    #[must_use]
    pub(crate) fn strategy(self) -> &'static dyn Persistence {
        match self {
            Self::FullSnapshot => &FullSnapshot,
            Self::Replay => &Replay,
            Self::CheckpointedReplay => &CheckpointedReplay,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    /// A full-snapshot stroke lost its captured buffer - logic error upstream.
    #[error("stroke is missing its snapshot")]
    MissingSnapshot,
    /// No baseline was ever captured for the stroke's layer - logic error upstream.
    #[error("no baseline snapshot for layer")]
    MissingBaseline,
    #[error(transparent)]
    Alloc(#[from] AllocError),
}

/// Borrowed view of the history internals a materialization runs against.
pub struct ReplayCx<'a> {
    /// The applied strokes, in application order. Mutable because replaying drives
    /// each stroke's engine state.
    strokes: &'a mut [Stroke],
    baselines: &'a hashbrown::HashMap<LayerId, Snapshot>,
}

impl<'a> ReplayCx<'a> {
    pub(crate) fn new(
        strokes: &'a mut [Stroke],
        baselines: &'a hashbrown::HashMap<LayerId, Snapshot>,
    ) -> Self {
        Self { strokes, baselines }
    }
    fn baseline(&self, layer: LayerId) -> Result<Snapshot, MaterializeError> {
        Ok(self
            .baselines
            .get(&layer)
            .ok_or(MaterializeError::MissingBaseline)?
            .try_clone()?)
    }
}

/// One materialization algorithm. Implementations are stateless units; per-stroke
/// data lives on the stroke itself.
pub trait Persistence {
    /// The layer contents just before the stroke at `index` was applied.
    fn materialize_before(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError>;
    /// The layer contents just after the stroke at `index` was applied.
    fn materialize_after(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError>;
}

/// O(1): clone the buffers captured at prepare/seal time.
pub struct FullSnapshot;

impl Persistence for FullSnapshot {
    fn materialize_before(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        Ok(cx.strokes[index]
            .before_snapshot
            .as_ref()
            .ok_or(MaterializeError::MissingSnapshot)?
            .try_clone()?)
    }
    fn materialize_after(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        Ok(cx.strokes[index]
            .after_snapshot
            .as_ref()
            .ok_or(MaterializeError::MissingSnapshot)?
            .try_clone()?)
    }
}

/// Recompute everything: before = the previous same-layer stroke's after (through
/// *that* stroke's strategy), bottoming out at the baseline; after = before plus a
/// replay of this stroke's samples.
pub struct Replay;

impl Persistence for Replay {
    fn materialize_before(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        let layer = cx.strokes[index].layer_id();
        let prior = cx.strokes[..index]
            .iter()
            .rposition(|s| s.layer_id() == layer);
        match prior {
            Some(j) => {
                let strategy = cx.strokes[j].mode().strategy();
                strategy.materialize_after(cx, j)
            }
            None => cx.baseline(layer),
        }
    }
    fn materialize_after(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        let mut snap = self.materialize_before(cx, index)?;
        cx.strokes[index].replay_onto(&mut snap);
        Ok(snap)
    }
}

/// Replay, but the backward scan stops at the nearest same-layer stroke that kept
/// its result buffer (a checkpoint, or any full-snapshot neighbour) and replays
/// forward from there. Worst case is bounded by the checkpoint interval.
pub struct CheckpointedReplay;

impl Persistence for CheckpointedReplay {
    fn materialize_before(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        let layer = cx.strokes[index].layer_id();
        // Same-layer strokes between the start point and `index`, newest first.
        let mut pending = Vec::new();
        let mut start = None;
        for j in (0..index).rev() {
            let stroke = &cx.strokes[j];
            if stroke.layer_id() != layer {
                continue;
            }
            if let Some(snap) = &stroke.after_snapshot {
                start = Some(snap.try_clone()?);
                break;
            }
            pending.push(j);
        }
        let mut snap = match start {
            Some(snap) => snap,
            None => cx.baseline(layer)?,
        };
        for &j in pending.iter().rev() {
            cx.strokes[j].replay_onto(&mut snap);
        }
        Ok(snap)
    }
    fn materialize_after(
        &self,
        cx: &mut ReplayCx<'_>,
        index: usize,
    ) -> Result<Snapshot, MaterializeError> {
        // A checkpoint stroke already holds its own result.
        if let Some(snap) = &cx.strokes[index].after_snapshot {
            return Ok(snap.try_clone()?);
        }
        let mut snap = self.materialize_before(cx, index)?;
        cx.strokes[index].replay_onto(&mut snap);
        Ok(snap)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use strum::IntoEnumIterator;

    use super::PersistenceMode;
    use crate::brush::StampEngine;
    use crate::buffer::Pixel;
    use crate::history::History;
    use crate::layer::BitmapLayer;
    use crate::stroke::{SamplePoint, Stroke};
    use crate::util::PixelRect;

    const BLUE: Pixel = Pixel([0, 0, 255, 255]);

    /// Three strokes, the second of which grows the canvas.
    fn stroke_script() -> Vec<Vec<SamplePoint>> {
        vec![
            vec![
                SamplePoint::new(10.0, 10.0, 1.0, 0.0),
                SamplePoint::new(25.0, 12.0, 0.8, 0.01),
            ],
            vec![SamplePoint::new(2.0, 2.0, 1.0, 0.0)],
            vec![
                SamplePoint::new(30.0, 30.0, 0.6, 0.0),
                SamplePoint::new(35.0, 20.0, 0.9, 0.01),
                SamplePoint::new(12.0, 33.0, 1.0, 0.01),
            ],
        ]
    }

    fn paint_script(mode: PersistenceMode, interval: u32) -> (Arc<BitmapLayer>, History) {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 40, 40)));
        let mut history = History::with_checkpoint_interval(interval);
        for samples in stroke_script() {
            let mut stroke =
                Stroke::new(layer.clone(), Box::new(StampEngine::new(BLUE, 8)), mode);
            stroke.prepare(&mut history).unwrap();
            for sample in samples {
                stroke.add_sample_and_apply(sample);
            }
            assert!(history.finish(stroke).is_registered());
        }
        (layer, history)
    }

    #[test]
    fn mode_repr_round_trips() {
        for mode in PersistenceMode::iter() {
            assert_eq!(PersistenceMode::from_repr(mode as u8), Some(mode));
        }
        assert_eq!(PersistenceMode::from_repr(200), None);
    }

    #[test]
    fn strategies_agree_on_the_live_result() {
        // The painted outcome must not depend on the persistence mode at all, and
        // each mode's materialize_after(last) must reproduce the live buffer.
        let mut final_hashes = Vec::new();
        for mode in PersistenceMode::iter() {
            let (layer, mut history) = paint_script(mode, 2);
            let live = layer.content_hash();
            let materialized = history.materialize_after_at(2).unwrap();
            let rebuilt = BitmapLayer::from_parts(materialized.pixels, materialized.bounds);
            assert_eq!(rebuilt.content_hash(), live, "mode {mode}");
            final_hashes.push(live);
        }
        assert!(final_hashes.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn before_of_first_stroke_is_the_baseline() {
        for mode in PersistenceMode::iter() {
            let (_layer, mut history) = paint_script(mode, 2);
            // materialize_before(0) is the untouched transparent canvas.
            let base = history.materialize_before_at(0).unwrap();
            assert_eq!(base.bounds, PixelRect::new(0, 0, 40, 40));
            assert!(base
                .pixels
                .pixels()
                .iter()
                .all(|p| *p == Pixel::TRANSPARENT));
            // And stroke 0's own result differs from it.
            let first_after = history.materialize_after_at(0).unwrap();
            assert_ne!(base.pixels, first_after.pixels);
        }
    }

    #[test]
    fn checkpoint_bounds_the_backward_scan() {
        // Interval 2 over 3 strokes: stroke #2 (1-based count 2) is a checkpoint.
        let (_layer, mut history) = paint_script(PersistenceMode::CheckpointedReplay, 2);
        assert!(history.stroke_at(0).after_snapshot.is_none());
        assert!(history.stroke_at(1).after_snapshot.is_some());
        assert!(history.stroke_at(2).after_snapshot.is_none());
        // materialize_before(2) starts from stroke 1's checkpoint, and equals
        // stroke 1's materialized after.
        let before_2 = history.materialize_before_at(2).unwrap();
        let after_1 = history.materialize_after_at(1).unwrap();
        assert_eq!(before_2, after_1);
    }

    #[test]
    fn mixed_mode_history_composes() {
        // Each stroke with a different mode; replay recursion must dispatch through
        // each stroke's own strategy and still agree with the uniform histories.
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 40, 40)));
        let mut history = History::with_checkpoint_interval(2);
        for (samples, mode) in stroke_script().into_iter().zip(PersistenceMode::iter()) {
            let mut stroke =
                Stroke::new(layer.clone(), Box::new(StampEngine::new(BLUE, 8)), mode);
            stroke.prepare(&mut history).unwrap();
            for sample in samples {
                stroke.add_sample_and_apply(sample);
            }
            assert!(history.finish(stroke).is_registered());
        }
        let live = layer.content_hash();
        let materialized = history.materialize_after_at(2).unwrap();
        let rebuilt = BitmapLayer::from_parts(materialized.pixels, materialized.bounds);
        assert_eq!(rebuilt.content_hash(), live);

        let (uniform_layer, _) = paint_script(PersistenceMode::Replay, 2);
        assert_eq!(uniform_layer.content_hash(), live);
    }
}
