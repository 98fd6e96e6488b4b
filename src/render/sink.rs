//! Destination for decoded video frames.
//!
//! The render worker only ever talks to a [`PixelSink`]. [`FrameBuffer`] is
//! the in-process implementation: a bottom-up BGRA surface that the host
//! window copies into a texture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Error type for pixel sink writes
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Pixel sink is disposed")]
    Disposed,
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Fixed-size BGRA frame destination
pub trait PixelSink: Send {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// A disposed sink rejects every write
    fn is_valid(&self) -> bool;

    /// Write one full frame, vertically flipped: row 0 of `data` becomes the
    /// last row of the destination. `data` must be exactly `frame_len()` bytes.
    fn write_flipped(&mut self, data: &[u8]) -> Result<(), SinkError>;

    /// Size in bytes of one frame
    fn frame_len(&self) -> usize {
        self.width() as usize * self.height() as usize * BYTES_PER_PIXEL
    }
}

/// Shared BGRA surface stored bottom-up (memory row 0 is the bottom scanline)
#[derive(Debug)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    pixels: Mutex<Vec<u8>>,
    generation: AtomicU64,
    disposed: AtomicBool,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        let len = width as usize * height as usize * BYTES_PER_PIXEL;
        Arc::new(Self {
            width,
            height,
            pixels: Mutex::new(vec![0; len]),
            generation: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        })
    }

    /// Writer handle for the render worker
    pub fn sink(self: &Arc<Self>) -> FrameBufferSink {
        FrameBufferSink {
            buffer: Arc::clone(self),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Invalidate the surface; all later writes fail
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Incremented once per successful write
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Raw bottom-up BGRA bytes
    #[cfg(test)]
    fn raw(&self) -> Vec<u8> {
        self.pixels.lock().clone()
    }

    /// Top-down RGBA copy for display
    pub fn to_rgba_top_down(&self) -> Vec<u8> {
        let row_len = self.width as usize * BYTES_PER_PIXEL;
        let pixels = self.pixels.lock();
        let mut out = Vec::with_capacity(pixels.len());
        if row_len == 0 {
            return out;
        }
        for row in pixels.chunks_exact(row_len).rev() {
            for bgra in row.chunks_exact(BYTES_PER_PIXEL) {
                out.extend_from_slice(&[bgra[2], bgra[1], bgra[0], bgra[3]]);
            }
        }
        out
    }

    fn write_flipped(&self, data: &[u8]) -> Result<(), SinkError> {
        if self.is_disposed() {
            return Err(SinkError::Disposed);
        }

        let row_len = self.width as usize * BYTES_PER_PIXEL;
        let expected = row_len * self.height as usize;
        if data.len() != expected {
            return Err(SinkError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let mut pixels = self.pixels.lock();
        if row_len > 0 {
            for (src, dst) in data
                .chunks_exact(row_len)
                .zip(pixels.chunks_exact_mut(row_len).rev())
            {
                dst.copy_from_slice(src);
            }
        }
        drop(pixels);

        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }
}

/// [`PixelSink`] writing into a shared [`FrameBuffer`]
#[derive(Debug, Clone)]
pub struct FrameBufferSink {
    buffer: Arc<FrameBuffer>,
}

impl PixelSink for FrameBufferSink {
    fn width(&self) -> u32 {
        self.buffer.width
    }

    fn height(&self) -> u32 {
        self.buffer.height
    }

    fn is_valid(&self) -> bool {
        !self.buffer.is_disposed()
    }

    fn write_flipped(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.buffer.write_flipped(data)
    }
}
