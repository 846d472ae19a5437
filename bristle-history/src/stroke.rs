//! # Strokes
//!
//! One [`Stroke`] is one undoable unit of freehand paint input: the sample log of a
//! single pointer drag, the bounds it covered, and - depending on its persistence
//! mode - captured pixel snapshots. Samples are applied to the live layer as they
//! arrive (painting must be visible in real time); the stroke is sealed exactly once
//! at drag end by [`crate::history::History::finish`].

use std::sync::Arc;

use crate::brush::BrushEngine;
use crate::buffer::{AllocError, PixelBuffer, Snapshot};
use crate::history::History;
use crate::layer::BitmapLayer;
use crate::persistence::PersistenceMode;
use crate::util::PixelRect;

pub type StrokeId = crate::EphemeralId<Stroke>;

/// One recorded pointer sample. Immutable once recorded.
///
/// Coordinates are canvas coordinates; conversion to buffer-local happens against
/// the layer frame current at each paint step, which is what keeps replay stable
/// when a stroke grows the canvas mid-drag.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SamplePoint {
    pub x: f32,
    pub y: f32,
    /// In `[0, 1]`.
    pub pressure: f32,
    /// Seconds since the previous sample, `>= 0`.
    pub dtime: f32,
}

impl SamplePoint {
    /// Clamps `pressure` into `[0, 1]` and `dtime` to non-negative.
    #[must_use]
    pub fn new(x: f32, y: f32, pressure: f32, dtime: f32) -> Self {
        Self {
            x,
            y,
            pressure: pressure.clamp(0.0, 1.0),
            dtime: dtime.max(0.0),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PrepareError {
    #[error("stroke is already prepared")]
    AlreadyPrepared,
    #[error("another unsealed stroke is active on this layer")]
    LayerBusy,
    #[error("baseline capture failed")]
    Baseline(#[from] AllocError),
}

pub struct Stroke {
    id: StrokeId,
    /// Shared with the document - the stroke records into it, never owns it.
    layer: Arc<BitmapLayer>,
    mode: PersistenceMode,
    /// Opaque simulator state. Seeded from the first sample, reset before replay.
    engine: Box<dyn BrushEngine>,
    /// Append-only until sealed.
    samples: smallvec::SmallVec<[SamplePoint; 16]>,
    before_box: PixelRect,
    after_box: PixelRect,
    /// Hash of the layer at `prepare` time. O(1) no-op detection for every mode,
    /// without keeping a before-buffer copy alive.
    before_hash: Option<blake3::Hash>,
    /// `FullSnapshot` only: the buffer as it was at `prepare`.
    pub(crate) before_snapshot: Option<Snapshot>,
    /// The sealed result buffer. Present on `FullSnapshot` strokes and on
    /// checkpoint-elected `CheckpointedReplay` strokes; doubles as a replay start
    /// point for every stroke behind it on the same layer.
    pub(crate) after_snapshot: Option<Snapshot>,
    prepared: bool,
    /// Whether the stroke's effect is currently present on the layer. False during
    /// capture, set at seal, toggled by undo/redo.
    pub(crate) applied: bool,
}

impl Stroke {
    #[must_use]
    pub fn new(layer: Arc<BitmapLayer>, engine: Box<dyn BrushEngine>, mode: PersistenceMode) -> Self {
        Self {
            id: StrokeId::next(),
            layer,
            mode,
            engine,
            samples: smallvec::SmallVec::new(),
            before_box: PixelRect::default(),
            after_box: PixelRect::default(),
            before_hash: None,
            before_snapshot: None,
            after_snapshot: None,
            prepared: false,
            applied: false,
        }
    }

    #[must_use]
    pub fn id(&self) -> StrokeId {
        self.id
    }
    #[must_use]
    pub fn layer(&self) -> &Arc<BitmapLayer> {
        &self.layer
    }
    #[must_use]
    pub fn layer_id(&self) -> crate::layer::LayerId {
        self.layer.id()
    }
    #[must_use]
    pub fn mode(&self) -> PersistenceMode {
        self.mode
    }
    #[must_use]
    pub fn samples(&self) -> &[SamplePoint] {
        &self.samples
    }
    #[must_use]
    pub fn before_box(&self) -> PixelRect {
        self.before_box
    }
    /// Meaningful once the stroke has been applied.
    #[must_use]
    pub fn after_box(&self) -> PixelRect {
        self.after_box
    }
    #[must_use]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
    #[must_use]
    pub fn is_applied(&self) -> bool {
        self.applied
    }
    #[must_use]
    pub(crate) fn before_hash(&self) -> Option<blake3::Hash> {
        self.before_hash
    }

    /// Capture the pre-stroke state and register with the history.
    ///
    /// Fails if another stroke on the same layer is still unsealed, or if the
    /// layer's one-time baseline snapshot cannot be allocated. A `FullSnapshot`
    /// stroke whose before-copy fails to allocate degrades to replay undo instead
    /// of failing - applied pixel state is never at risk from a capture.
    pub fn prepare(&mut self, history: &mut History) -> Result<(), PrepareError> {
        if self.prepared {
            return Err(PrepareError::AlreadyPrepared);
        }
        if history.is_layer_open(self.layer.id()) {
            return Err(PrepareError::LayerBusy);
        }
        history.ensure_baseline(&self.layer)?;
        history.register_open(self.layer.id(), self.id);

        self.before_box = self.layer.bounds();
        self.after_box = self.before_box;
        self.before_hash = Some(self.layer.content_hash());
        if self.mode == PersistenceMode::FullSnapshot {
            match self.layer.try_snapshot() {
                Ok(snap) => self.before_snapshot = Some(snap),
                Err(e) => {
                    log::warn!("{:?}: before-snapshot failed ({e}); falling back to replay undo", self.id);
                    self.mode = PersistenceMode::Replay;
                }
            }
        }
        self.prepared = true;
        Ok(())
    }

    /// Append one sample and paint it onto the live layer.
    ///
    /// Called many times per second during a drag; the layer is displayable after
    /// every call. Growth reported by the engine is folded into the layer bounds
    /// immediately - canvas expansion must be visible as it happens.
    pub fn add_sample_and_apply(&mut self, sample: SamplePoint) {
        assert!(self.prepared, "sampled a stroke that was never prepared");
        assert!(!self.applied, "sampled a sealed stroke");

        if self.samples.is_empty() {
            self.engine.reset(&sample);
        }
        self.samples.push(sample);

        // Paint against a working copy; the lock is only held for the clone-out
        // and the swap-in, so a compositor never waits on brush math.
        let (mut pixels, mut bounds) = self.layer.clone_contents();
        Self::paint_sample(self.engine.as_mut(), &mut pixels, &mut bounds, sample);
        self.after_box = bounds;
        self.layer.replace(pixels, bounds);
    }

    /// Paint one sample into a buffer/frame pair, folding engine growth into the
    /// frame. Shared between live capture and replay so both take the exact same
    /// path through the engine.
    fn paint_sample(
        engine: &mut dyn BrushEngine,
        pixels: &mut PixelBuffer,
        bounds: &mut PixelRect,
        sample: SamplePoint,
    ) {
        let local_x = sample.x - bounds.x0 as f32;
        let local_y = sample.y - bounds.y0 as f32;
        let growth = engine.stroke_to(pixels, local_x, local_y, sample.pressure, sample.dtime);
        if growth.any() {
            *bounds = bounds.grow(growth.left, growth.top, growth.right, growth.bottom);
        }
    }

    /// Re-run the recorded samples on top of `snap`, mutating it into this stroke's
    /// result. Resets engine state first, as any from-scratch replay must.
    pub(crate) fn replay_onto(&mut self, snap: &mut Snapshot) {
        for i in 0..self.samples.len() {
            let sample = self.samples[i];
            if i == 0 {
                self.engine.reset(&sample);
            }
            Self::paint_sample(self.engine.as_mut(), &mut snap.pixels, &mut snap.bounds, sample);
        }
    }

    /// Capture the sealed result buffer (full-snapshot `after`, or a checkpoint).
    /// On allocation failure the stroke degrades to replay semantics with a warning;
    /// the applied pixels are untouched either way.
    pub(crate) fn capture_result_snapshot(&mut self) {
        match self.layer.try_snapshot() {
            Ok(snap) => self.after_snapshot = Some(snap),
            Err(e) => {
                log::warn!("{:?}: result snapshot failed ({e}); degrading to replay undo", self.id);
                self.after_snapshot = None;
                if self.mode == PersistenceMode::FullSnapshot {
                    self.before_snapshot = None;
                    self.mode = PersistenceMode::Replay;
                }
            }
        }
    }
}

impl std::fmt::Debug for Stroke {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stroke")
            .field("id", &self.id)
            .field("layer", &self.layer.id())
            .field("mode", &self.mode)
            .field("samples", &self.samples.len())
            .field("prepared", &self.prepared)
            .field("applied", &self.applied)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{SamplePoint, Stroke};
    use crate::brush::StampEngine;
    use crate::buffer::Pixel;
    use crate::history::History;
    use crate::layer::BitmapLayer;
    use crate::persistence::PersistenceMode;
    use crate::util::PixelRect;

    const RED: Pixel = Pixel([255, 0, 0, 255]);

    fn stroke_on(layer: &Arc<BitmapLayer>, mode: PersistenceMode) -> Stroke {
        Stroke::new(layer.clone(), Box::new(StampEngine::new(RED, 10)), mode)
    }

    #[test]
    fn sample_point_clamps() {
        let s = SamplePoint::new(1.0, 2.0, 3.5, -0.5);
        assert_eq!(s.pressure, 1.0);
        assert_eq!(s.dtime, 0.0);
    }

    #[test]
    fn prepare_captures_pre_state() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut history = History::new();
        let mut stroke = stroke_on(&layer, PersistenceMode::CheckpointedReplay);
        stroke.prepare(&mut history).unwrap();
        assert!(stroke.is_prepared());
        assert_eq!(stroke.before_box(), PixelRect::new(0, 0, 20, 20));
        // Second prepare is an error.
        assert!(stroke.prepare(&mut history).is_err());
    }

    #[test]
    fn full_snapshot_mode_copies_buffer() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut history = History::new();
        let mut stroke = stroke_on(&layer, PersistenceMode::FullSnapshot);
        stroke.prepare(&mut history).unwrap();
        assert!(stroke.before_snapshot.is_some());
        // Replay modes don't pay for the copy.
        let layer2 = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut replay = stroke_on(&layer2, PersistenceMode::Replay);
        replay.prepare(&mut history).unwrap();
        assert!(replay.before_snapshot.is_none());
    }

    #[test]
    fn second_unsealed_stroke_on_layer_is_rejected() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut history = History::new();
        let mut first = stroke_on(&layer, PersistenceMode::Replay);
        first.prepare(&mut history).unwrap();
        let mut second = stroke_on(&layer, PersistenceMode::Replay);
        assert!(matches!(
            second.prepare(&mut history),
            Err(super::PrepareError::LayerBusy)
        ));
    }

    #[test]
    #[should_panic(expected = "never prepared")]
    fn sampling_unprepared_stroke_panics() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut stroke = stroke_on(&layer, PersistenceMode::Replay);
        stroke.add_sample_and_apply(SamplePoint::new(5.0, 5.0, 1.0, 0.0));
    }

    #[test]
    fn samples_paint_immediately() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 40, 40)));
        let mut history = History::new();
        let mut stroke = stroke_on(&layer, PersistenceMode::Replay);
        stroke.prepare(&mut history).unwrap();
        let epoch = layer.epoch();
        stroke.add_sample_and_apply(SamplePoint::new(20.0, 20.0, 1.0, 0.0));
        assert!(layer.epoch() > epoch);
        let (pixels, _) = layer.clone_contents();
        assert_eq!(pixels.get(20, 20), Some(RED));
    }

    #[test]
    fn growth_is_visible_as_it_happens() {
        let layer = Arc::new(BitmapLayer::new(PixelRect::new(0, 0, 20, 20)));
        let mut history = History::new();
        let mut stroke = stroke_on(&layer, PersistenceMode::Replay);
        stroke.prepare(&mut history).unwrap();
        // Dab overhangs the top-left corner by 3px - bounds move immediately.
        stroke.add_sample_and_apply(SamplePoint::new(2.0, 2.0, 1.0, 0.0));
        assert_eq!(layer.bounds(), PixelRect::new(-3, -3, 20, 20));
        assert_eq!(stroke.after_box(), PixelRect::new(-3, -3, 20, 20));
        let (pixels, _) = layer.clone_contents();
        assert_eq!(pixels.width(), 23);
        // Canvas (-3,-3) is buffer-local (0,0), and it's painted.
        assert_eq!(pixels.get(0, 0), Some(RED));
    }
}
