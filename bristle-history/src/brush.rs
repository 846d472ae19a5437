//! # Brush engines
//!
//! The contract between the history engine and the host's brush simulator. The
//! simulator is stateful: samples fed through [`BrushEngine::stroke_to`] advance
//! internal stroke state (smoothed position, dab spacing carry, ...), and replay from
//! scratch must call [`BrushEngine::reset`] first.
//!
//! Determinism is load-bearing. Replay- and checkpoint-based undo reconstruct pixel
//! buffers by re-running the engine over recorded samples; an engine that paints
//! differently on the second run breaks round-trip guarantees.

use crate::buffer::{Pixel, PixelBuffer};
use crate::stroke::SamplePoint;

/// Margins by which a paint operation extended the buffer, in pixels.
///
/// Engines are allowed to grow the buffer themselves (painting past an edge) and
/// report the applied margins so the caller can shift the canvas-space bounds.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Growth {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Growth {
    pub const NONE: Self = Self {
        left: 0,
        top: 0,
        right: 0,
        bottom: 0,
    };
    #[must_use]
    pub fn any(self) -> bool {
        self != Self::NONE
    }
    /// Combine with a growth that happened *after* this one. Margins are relative to
    /// the buffer at the time of each expansion, so stacking is a plain sum.
    #[must_use]
    pub fn stacked(self, later: Self) -> Self {
        Self {
            left: self.left + later.left,
            top: self.top + later.top,
            right: self.right + later.right,
            bottom: self.bottom + later.bottom,
        }
    }
}

/// A deterministic, stateful brush simulator.
pub trait BrushEngine: Send {
    /// Reset stroke state, seeding from the first sample of the stroke. Called before
    /// the first live sample and before any from-scratch replay.
    fn reset(&mut self, first: &SamplePoint);
    /// Paint one sample. `(x, y)` are buffer-local coordinates; the engine may grow
    /// `buf` to fit paint past an edge and returns the margins it applied.
    ///
    /// Given identical state and an identical sample sequence, the resulting pixels
    /// and growth must be identical.
    fn stroke_to(
        &mut self,
        buf: &mut PixelBuffer,
        x: f32,
        y: f32,
        pressure: f32,
        dtime: f32,
    ) -> Growth;
}

/// Minimal reference engine: square dabs at fixed spacing, gated on pressure.
///
/// Hosts bring their own MyPaint-style simulator; this one exists so the engine can
/// be exercised headless (and so the test-suite has a brush whose output is easy to
/// reason about pixel-by-pixel).
pub struct StampEngine {
    color: Pixel,
    /// Dab side length, pixels.
    size: u32,
    /// Distance between dab centers along the pointer path.
    spacing: f32,
    state: StampState,
}

#[derive(Clone, Copy, Default)]
struct StampState {
    /// Last pointer position, buffer-local in the *current* frame.
    last: Option<[f32; 2]>,
    /// Path distance accumulated since the last dab.
    carry: f32,
}

/// Dabs below this pressure deposit nothing - a zero-pressure drag is a true no-op.
const PRESSURE_THRESHOLD: f32 = 1.0 / 255.0;

impl StampEngine {
    #[must_use]
    pub fn new(color: Pixel, size: u32) -> Self {
        Self {
            color,
            size: size.max(1),
            spacing: (size as f32 / 2.0).max(1.0),
            state: StampState::default(),
        }
    }
    /// Stamp one dab centered at `(cx, cy)`, growing the buffer if it overhangs.
    fn dab(&self, buf: &mut PixelBuffer, cx: f32, cy: f32, pressure: f32) -> Growth {
        let half = self.size as f32 / 2.0;
        let mut x0 = (cx - half).round() as i64;
        let mut y0 = (cy - half).round() as i64;
        let x1 = x0 + i64::from(self.size);
        let y1 = y0 + i64::from(self.size);

        let growth = Growth {
            left: (-x0).max(0) as u32,
            top: (-y0).max(0) as u32,
            right: (x1 - i64::from(buf.width())).max(0) as u32,
            bottom: (y1 - i64::from(buf.height())).max(0) as u32,
        };
        if growth.any() {
            buf.grow(growth.left, growth.top, growth.right, growth.bottom);
            x0 += i64::from(growth.left);
            y0 += i64::from(growth.top);
        }

        let src = self.color.scaled(pressure);
        for y in y0..y0 + i64::from(self.size) {
            for x in x0..x0 + i64::from(self.size) {
                if let Some(dst) = buf.pixel_mut(x as u32, y as u32) {
                    dst.blend_over(src);
                }
            }
        }
        growth
    }
}

impl BrushEngine for StampEngine {
    fn reset(&mut self, _first: &SamplePoint) {
        self.state = StampState::default();
    }

    fn stroke_to(
        &mut self,
        buf: &mut PixelBuffer,
        x: f32,
        y: f32,
        pressure: f32,
        _dtime: f32,
    ) -> Growth {
        let to = [x, y];
        let Some(from) = self.state.last else {
            // First sample of the stroke: a single dab, no path to walk.
            self.state.carry = 0.0;
            let growth = if pressure >= PRESSURE_THRESHOLD {
                self.dab(buf, x, y, pressure)
            } else {
                Growth::NONE
            };
            self.state.last = Some([to[0] + growth.left as f32, to[1] + growth.top as f32]);
            return growth;
        };

        if pressure < PRESSURE_THRESHOLD {
            // Track motion without depositing.
            self.state.last = Some(to);
            self.state.carry = 0.0;
            return Growth::NONE;
        }

        let dx = to[0] - from[0];
        let dy = to[1] - from[1];
        let len = (dx * dx + dy * dy).sqrt();

        let mut total = Growth::NONE;
        // Growing the buffer mid-walk shifts the frame; later dabs (and the stored
        // last-position) must follow it.
        let mut shift = [0f32; 2];

        if len <= f32::EPSILON {
            // Stationary pointer: re-dab in place, pressure may have changed.
            total = self.dab(buf, x, y, pressure);
            shift = [total.left as f32, total.top as f32];
        } else {
            let mut t = (self.spacing - self.state.carry).max(0.0);
            while t <= len {
                let px = from[0] + dx * (t / len) + shift[0];
                let py = from[1] + dy * (t / len) + shift[1];
                let g = self.dab(buf, px, py, pressure);
                shift[0] += g.left as f32;
                shift[1] += g.top as f32;
                total = total.stacked(g);
                t += self.spacing;
            }
            self.state.carry = (self.state.carry + len) % self.spacing;
        }

        self.state.last = Some([to[0] + shift[0], to[1] + shift[1]]);
        total
    }
}
