use serde::Serialize;

use crate::bmap::BmapError;

/// Raw bitmaps always store 32 bits per pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// An uncompressed 32 bit bitmap.
///
/// Pixels are tightly packed rows in B8G8R8A8 order, which is how a little endian 32bpp ARGB surface lays out its bytes.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct RawBitmap {
    width: u16,
    height: u16,
    #[serde(skip_serializing)]
    pixels: Vec<u8>,
}

impl RawBitmap {
    /// Allocates a fully transparent black bitmap.
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; Self::byte_size(width, height)],
        }
    }

    /// Wraps an existing BGRA8 buffer, which has to be exactly `width * height * 4` bytes long.
    pub fn from_pixels(width: u16, height: u16, pixels: Vec<u8>) -> Result<Self, BmapError> {
        let expected = Self::byte_size(width, height);
        if pixels.len() != expected {
            return Err(BmapError::SizeMismatch {
                what: "bitmap pixel data",
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self { width, height, pixels })
    }

    /// Builds a bitmap from RGBA8 pixels, swapping the red and blue channels.
    pub fn from_rgba8(width: u16, height: u16, rgba: &[u8]) -> Result<Self, BmapError> {
        Self::from_pixels(width, height, swap_red_blue(rgba))
    }

    /// Number of pixel bytes a `width` x `height` bitmap holds.
    pub fn byte_size(width: u16, height: u16) -> usize {
        width as usize * height as usize * BYTES_PER_PIXEL
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable view on the pixels. The buffer can be edited in place, its length is fixed.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.pixels
    }

    /// Returns the BGRA value of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u16, y: u16) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let bytes = self.pixels.get(start..start + BYTES_PER_PIXEL)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    /// Copies the pixels into RGBA8 order.
    pub fn to_rgba8(&self) -> Vec<u8> {
        swap_red_blue(&self.pixels)
    }
}

fn swap_red_blue(pixels: &[u8]) -> Vec<u8> {
    let mut swapped = pixels.to_vec();
    for pixel in swapped.chunks_exact_mut(BYTES_PER_PIXEL) {
        pixel.swap(0, 2);
    }
    swapped
}
