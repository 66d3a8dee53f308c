//! Decoded frame values and raw-to-RGBA conversion
//!
//! **Why**: Cache items hand out raw pixel rows with an arbitrary stride.
//! Targets want a tightly packed image they can blit, and many targets share
//! the same decoded frame, so the image is kept behind an `Arc`.
//!
//! **Used by**: ItemPlaybackContext (decode task), renderer (first frame paths)
//!
//! # Conversion
//!
//! `FrameGroup::decode()` asks the item for one frame at a timestamp and copies
//! `height` rows of `width * 4` bytes out of a `bytes_per_row` strided buffer.
//! A buffer shorter than `height * bytes_per_row` (minus trailing padding of the
//! last row) is a decode failure, not a panic.

use std::fmt;
use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::traits::CacheItem;

/// Integer pixel size of an animated item as requested by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

impl PixelSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for PixelSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format the engine asks the cache for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestedFormat {
    Rgba,
}

/// Raw pixel payload as produced by a cache item
#[derive(Debug, Clone)]
pub enum FrameFormat {
    /// 8-bit RGBA rows, `bytes_per_row >= width * 4`
    Rgba {
        data: Arc<Vec<u8>>,
        width: u32,
        height: u32,
        bytes_per_row: usize,
    },
    /// Planar YUV+A, not renderable by this engine
    Yuva {
        width: u32,
        height: u32,
    },
}

/// One raw frame from `CacheItem::get_frame`
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub format: FrameFormat,
    /// Display duration of this frame in seconds
    pub duration: f64,
}

/// Why a raw frame could not become a renderable image
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecodeError {
    #[error("no frame at timestamp {0:.3}s")]
    NoFrame(f64),
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(&'static str),
    #[error("invalid dimensions {width}x{height} (bytes_per_row={bytes_per_row})")]
    InvalidDimensions {
        width: u32,
        height: u32,
        bytes_per_row: usize,
    },
    #[error("pixel buffer too small: need {expected} bytes, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("cache item panicked: {0}")]
    ItemPanicked(String),
}

/// Decoded frame shared by every target showing the same item.
///
/// Value type: two groups decoded from the same item at the same timestamp
/// are interchangeable.
#[derive(Debug, Clone)]
pub struct FrameGroup {
    pub image: Arc<RgbaImage>,
    pub size: PixelSize,
    /// Playback timestamp (seconds) this frame was decoded for
    pub timestamp: f64,
}

impl FrameGroup {
    /// Decode exactly one frame from `item` at `timestamp`.
    pub fn decode(item: &dyn CacheItem, timestamp: f64) -> Result<Self, DecodeError> {
        let frame = item
            .get_frame(timestamp, RequestedFormat::Rgba)
            .ok_or(DecodeError::NoFrame(timestamp))?;
        Self::from_frame(&frame, timestamp)
    }

    /// Convert an already fetched raw frame.
    pub fn from_frame(frame: &AnimationFrame, timestamp: f64) -> Result<Self, DecodeError> {
        match &frame.format {
            FrameFormat::Rgba {
                data,
                width,
                height,
                bytes_per_row,
            } => {
                let image = copy_rows(data, *width, *height, *bytes_per_row)?;
                Ok(Self {
                    image: Arc::new(image),
                    size: PixelSize::new(*width, *height),
                    timestamp,
                })
            }
            FrameFormat::Yuva { .. } => Err(DecodeError::UnsupportedFormat("yuva")),
        }
    }
}

/// Repack strided RGBA rows into a tight `RgbaImage`
fn copy_rows(data: &[u8], width: u32, height: u32, bytes_per_row: usize) -> Result<RgbaImage, DecodeError> {
    let row_len = width as usize * 4;
    if width == 0 || height == 0 || bytes_per_row < row_len {
        return Err(DecodeError::InvalidDimensions {
            width,
            height,
            bytes_per_row,
        });
    }

    // Last row only needs its pixels, not the stride padding
    let expected = (height as usize - 1)
        .checked_mul(bytes_per_row)
        .and_then(|n| n.checked_add(row_len))
        .ok_or(DecodeError::InvalidDimensions {
            width,
            height,
            bytes_per_row,
        })?;
    if data.len() < expected {
        return Err(DecodeError::BufferTooSmall {
            expected,
            actual: data.len(),
        });
    }

    let pixels = if bytes_per_row == row_len {
        data[..row_len * height as usize].to_vec()
    } else {
        let mut packed = Vec::with_capacity(row_len * height as usize);
        for row in data.chunks(bytes_per_row).take(height as usize) {
            packed.extend_from_slice(&row[..row_len]);
        }
        packed
    };

    RgbaImage::from_raw(width, height, pixels).ok_or(DecodeError::BufferTooSmall {
        expected: row_len * height as usize,
        actual: data.len(),
    })
}
