use bytemuck::{Pod, Zeroable};

use crate::error::{BridgeError, Result};

/// One 4-channel 8-bit pixel, laid out exactly like the native `Color32`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn gray(v: u8) -> Self {
        Self::new(v, v, v, 255)
    }
}

/// Read-only RGBA pixel buffer handed to a native call.
///
/// The borrow keeps the buffer alive and unmoved for the whole synchronous
/// call, which is all the native side requires.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    width: u32,
    height: u32,
    pixels: &'a [Rgba8],
}

impl<'a> ImageView<'a> {
    /// Wrap `pixels` as a `width x height` row-major image.
    pub fn new(width: u32, height: u32, pixels: &'a [Rgba8]) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if pixels.len() != expected {
            return Err(BridgeError::InvalidImage {
                width,
                height,
                expected,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Wrap a tightly packed RGBA byte buffer (`len = width * height * 4`).
    pub fn from_bytes(width: u32, height: u32, bytes: &'a [u8]) -> Result<Self> {
        let expected = expected_len(width, height)?;
        let pixels: &[Rgba8] =
            bytemuck::try_cast_slice(bytes).map_err(|_| BridgeError::InvalidImage {
                width,
                height,
                expected,
                got: bytes.len() / 4,
            })?;
        Self::new(width, height, pixels)
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &'a [Rgba8] {
        self.pixels
    }

    /// The same buffer as raw RGBA bytes.
    #[inline]
    pub fn as_bytes(&self) -> &'a [u8] {
        bytemuck::cast_slice(self.pixels)
    }
}

fn expected_len(width: u32, height: u32) -> Result<usize> {
    let w = usize::try_from(width).ok();
    let h = usize::try_from(height).ok();
    w.zip(h)
        .and_then(|(w, h)| w.checked_mul(h))
        .ok_or(BridgeError::InvalidImage {
            width,
            height,
            expected: 0,
            got: 0,
        })
}
