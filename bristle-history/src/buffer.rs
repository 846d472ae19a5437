//! # Pixel buffers
//!
//! CPU-side pixel storage for raster layers and their history snapshots. Everything
//! undo-related works on whole buffers - materialization always produces a complete
//! replacement buffer which is swapped in atomically, never patched in place.

use crate::util::PixelRect;

/// Premultiplied RGBA, 8 bits per channel.
#[derive(bytemuck::Pod, bytemuck::Zeroable, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[repr(transparent)]
pub struct Pixel(pub [u8; 4]);

impl Pixel {
    pub const TRANSPARENT: Self = Self([0; 4]);

    #[must_use]
    pub fn alpha(self) -> u8 {
        self.0[3]
    }
    /// Scale all channels by `factor` in `[0, 1]`. Premultiplied, so this fades
    /// coverage and color together.
    #[must_use]
    pub fn scaled(self, factor: f32) -> Self {
        let factor = factor.clamp(0.0, 1.0);
        let mut out = [0u8; 4];
        for (o, c) in out.iter_mut().zip(self.0) {
            *o = (f32::from(c) * factor).round() as u8;
        }
        Self(out)
    }
    /// Source-over composite `src` onto `self`.
    pub fn blend_over(&mut self, src: Self) {
        let sa = u16::from(src.alpha());
        if sa == 0 {
            return;
        }
        if sa == 255 {
            *self = src;
            return;
        }
        for (d, s) in self.0.iter_mut().zip(src.0) {
            // Premultiplied invariant (channel <= alpha) keeps this within u8 range.
            *d = (u16::from(s) + (u16::from(*d) * (255 - sa) + 127) / 255) as u8;
        }
    }
}

/// Allocation failed while capturing or cloning pixel data.
///
/// Callers degrade gracefully (a stroke falls back to replay undo) instead of
/// corrupting already-applied pixel state.
#[derive(thiserror::Error, Debug)]
pub enum AllocError {
    #[error(transparent)]
    OutOfMemory(#[from] std::collections::TryReserveError),
}

/// A fixed-size grid of [`Pixel`]s.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Box<[Pixel]>,
}

impl PixelBuffer {
    /// A fully transparent buffer.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![Pixel::TRANSPARENT; (width as usize) * (height as usize)].into(),
        }
    }
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }
    #[must_use]
    pub fn pixels(&self) -> &[Pixel] {
        &self.data
    }
    /// The full data as bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
    #[must_use]
    pub fn get(&self, x: u32, y: u32) -> Option<Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.data[(y as usize) * (self.width as usize) + x as usize])
    }
    #[must_use]
    pub fn pixel_mut(&mut self, x: u32, y: u32) -> Option<&mut Pixel> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(&mut self.data[(y as usize) * (self.width as usize) + x as usize])
    }
    /// Fallible deep copy, the primitive behind every snapshot capture.
    ///
    /// This is the one place undo bookkeeping allocates buffer-sized memory, so it
    /// reports exhaustion instead of aborting - see [`AllocError`].
    pub fn try_clone(&self) -> Result<Self, AllocError> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);
        Ok(Self {
            width: self.width,
            height: self.height,
            data: data.into(),
        })
    }
    /// Re-allocate with extra margins on each side, blitting the old content at the
    /// new offset. New pixels are transparent.
    pub fn grow(&mut self, left: u32, top: u32, right: u32, bottom: u32) {
        if left == 0 && top == 0 && right == 0 && bottom == 0 {
            return;
        }
        let new_width = self.width + left + right;
        let new_height = self.height + top + bottom;
        let mut data =
            vec![Pixel::TRANSPARENT; (new_width as usize) * (new_height as usize)].into_boxed_slice();
        for row in 0..self.height as usize {
            let src = row * self.width as usize..(row + 1) * self.width as usize;
            let dst_start = (row + top as usize) * new_width as usize + left as usize;
            data[dst_start..dst_start + self.width as usize].copy_from_slice(&self.data[src]);
        }
        self.width = new_width;
        self.height = new_height;
        self.data = data;
    }
    /// Hash of dimensions + pixel data. Equal hashes mean bit-identical buffers.
    #[must_use]
    pub fn content_hash(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(bytemuck::bytes_of(&[self.width, self.height]));
        hasher.update(self.bytes());
        hasher.finalize()
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Dumping the pixel grid would swamp any log line.
        write!(f, "PixelBuffer({}x{})", self.width, self.height)
    }
}

/// A pixel buffer together with the canvas-space bounds it was captured at.
///
/// Invariant: the bounds dimensions always match the buffer dimensions. Replay needs
/// the bounds as its starting coordinate frame - samples are recorded in canvas
/// coordinates and converted against the frame current at each paint step.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Snapshot {
    pub pixels: PixelBuffer,
    pub bounds: PixelRect,
}

impl Snapshot {
    #[must_use]
    pub fn new(pixels: PixelBuffer, bounds: PixelRect) -> Self {
        debug_assert_eq!(bounds.width(), pixels.width());
        debug_assert_eq!(bounds.height(), pixels.height());
        Self { pixels, bounds }
    }
    pub fn try_clone(&self) -> Result<Self, AllocError> {
        Ok(Self {
            pixels: self.pixels.try_clone()?,
            bounds: self.bounds,
        })
    }
}
