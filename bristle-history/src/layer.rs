//! # Raster layers
//!
//! A [`BitmapLayer`] owns the live pixel buffer and logical bounds of one editable
//! bitmap. The editing thread mutates it; a compositing thread may read it
//! concurrently. All access goes through a per-layer lock whose scope is one
//! clone-out or swap-in - never a whole stroke - so interactive painting stays
//! responsive while undo stays coherent.
//!
//! Change notification is a polled epoch counter rather than a callback: the
//! renderer compares [`BitmapLayer::epoch`] against the value it last composited.

use crate::buffer::{AllocError, PixelBuffer, Snapshot};
use crate::util::PixelRect;

pub type LayerId = crate::EphemeralId<BitmapLayer>;

struct Contents {
    pixels: PixelBuffer,
    bounds: PixelRect,
}

pub struct BitmapLayer {
    id: LayerId,
    contents: parking_lot::Mutex<Contents>,
    epoch: std::sync::atomic::AtomicU64,
}

impl BitmapLayer {
    /// A transparent layer sized to `bounds`.
    #[must_use]
    pub fn new(bounds: PixelRect) -> Self {
        Self::from_parts(PixelBuffer::new(bounds.width(), bounds.height()), bounds)
    }
    #[must_use]
    pub fn from_parts(pixels: PixelBuffer, bounds: PixelRect) -> Self {
        assert_eq!(bounds.width(), pixels.width());
        assert_eq!(bounds.height(), pixels.height());
        Self {
            id: LayerId::next(),
            contents: parking_lot::Mutex::new(Contents { pixels, bounds }),
            epoch: std::sync::atomic::AtomicU64::new(0),
        }
    }
    #[must_use]
    pub fn id(&self) -> LayerId {
        self.id
    }
    /// Monotonic change counter. Bumped on every visible mutation.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(std::sync::atomic::Ordering::Acquire)
    }
    pub fn notify_changed(&self) {
        self.epoch
            .fetch_add(1, std::sync::atomic::Ordering::AcqRel);
    }
    #[must_use]
    pub fn bounds(&self) -> PixelRect {
        self.contents.lock().bounds
    }
    /// Clone out the live contents as a working copy. One short lock.
    #[must_use]
    pub fn clone_contents(&self) -> (PixelBuffer, PixelRect) {
        let contents = self.contents.lock();
        (contents.pixels.clone(), contents.bounds)
    }
    /// Fallible capture of the live contents, for baselines and checkpoints.
    pub fn try_snapshot(&self) -> Result<Snapshot, AllocError> {
        let contents = self.contents.lock();
        Ok(Snapshot::new(contents.pixels.try_clone()?, contents.bounds))
    }
    /// Hash of bounds + pixel data, for no-op detection.
    #[must_use]
    pub fn content_hash(&self) -> blake3::Hash {
        let contents = self.contents.lock();
        let b = contents.bounds;
        let mut hasher = blake3::Hasher::new();
        hasher.update(bytemuck::bytes_of(&[b.x0, b.y0, b.x1, b.y1]));
        hasher.update(contents.pixels.bytes());
        hasher.finalize()
    }
    /// Install new contents: a single whole-buffer swap under the lock, then a
    /// change notification. There is no partial in-place mutation path.
    pub fn replace(&self, pixels: PixelBuffer, bounds: PixelRect) {
        assert_eq!(bounds.width(), pixels.width());
        assert_eq!(bounds.height(), pixels.height());
        {
            let mut contents = self.contents.lock();
            contents.pixels = pixels;
            contents.bounds = bounds;
        }
        self.notify_changed();
    }
}

impl std::fmt::Debug for BitmapLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let contents = self.contents.lock();
        f.debug_struct("BitmapLayer")
            .field("id", &self.id)
            .field("bounds", &contents.bounds)
            .field("epoch", &self.epoch())
            .finish()
    }
}
