//! # bristle-history
//!
//! The undo/redo engine for freehand raster painting. Each brush stroke records its
//! *input samples* rather than its pixel output, so undo works by re-running the brush
//! simulator over the recorded log ([`stroke`], [`persistence`]). Periodic full-buffer
//! checkpoints bound how much replay a single undo can cost ([`history`]).
//!
//! The engine is deliberately headless: pointer capture, the real brush simulator and
//! the host action framework live in the application. They talk to this crate through
//! [`brush::BrushEngine`], [`layer::BitmapLayer`] and [`action::Undoable`].

pub mod action;
pub mod brush;
pub mod buffer;
pub mod history;
pub mod id;
pub mod layer;
pub mod persistence;
pub mod stroke;
pub mod util;

use id::EphemeralId;
