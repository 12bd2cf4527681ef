use std::io::{Read, Write};

use image::error::{DecodingError, EncodingError, ImageFormatHint};
use image::{ColorType, ExtendedColorType, ImageDecoder, ImageEncoder, ImageError, ImageResult};
use thiserror::Error;

use crate::bitmap::RawBitmap;
use crate::bmap::{Bmap, BmapError, BmapPackerError};
use crate::convert::{self, BmapConversionError};
use crate::enums::Compression;

#[derive(Debug, Error)]
pub enum BmapEncodeError {
    #[error("Raw bitmaps can't be built from color type {0:?}")]
    UnsupportedColorType(ExtendedColorType),
    #[error("Image of {0}x{1} pixels does not fit the 16 bit dimensions of a raw bitmap")]
    DimensionsTooLarge(u32, u32),
    #[error("Failed to build bitmap {0}")]
    Bitmap(#[from] BmapError),
    #[error("Failed to pack bmap")]
    Packer(#[from] BmapPackerError),
    #[error("IO error {0}")]
    IOError(#[from] std::io::Error),
}

impl From<BmapEncodeError> for ImageError {
    fn from(e: BmapEncodeError) -> Self {
        ImageError::Encoding(EncodingError::new(
            ImageFormatHint::Name("BMAP".to_owned()),
            e.to_string(),
        ))
    }
}

fn decoding_error(e: impl ToString) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Name("BMAP".to_owned()),
        e.to_string(),
    ))
}

/// Writes images as raw bitmap bmaps.
pub struct BmapEncoder<W: Write> {
    writer: W,
    path: String,
    compression: Compression,
}

impl<W: Write> BmapEncoder<W> {
    /// `path` is the authoring path embedded in the payload.
    pub fn new(writer: W, path: impl Into<String>, compression: Compression) -> BmapEncoder<W> {
        BmapEncoder {
            writer,
            path: path.into(),
            compression,
        }
    }
}

impl<W: Write> ImageEncoder for BmapEncoder<W> {
    fn write_image(
        self,
        buf: &[u8],
        width: u32,
        height: u32,
        color_type: ExtendedColorType,
    ) -> ImageResult<()> {
        let (Ok(bitmap_width), Ok(bitmap_height)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(BmapEncodeError::DimensionsTooLarge(width, height).into());
        };

        let rgba = match color_type {
            ExtendedColorType::Rgba8 => buf.to_vec(),
            ExtendedColorType::Rgb8 => helpers::rgb8_to_rgba8(buf),
            _ => return Err(BmapEncodeError::UnsupportedColorType(color_type).into()),
        };

        let bitmap = RawBitmap::from_rgba8(bitmap_width, bitmap_height, &rgba).map_err(BmapEncodeError::Bitmap)?;
        let bmap: Bmap = Bmap::from_bitmap(self.path, bitmap);
        let data = bmap.pack_to_vec(self.compression).map_err(BmapEncodeError::Packer)?;

        let mut writer = self.writer;
        writer.write_all(&data).map_err(BmapEncodeError::IOError)?;
        Ok(())
    }
}

pub struct BmapDecoder {
    bmap: Bmap,
}

impl BmapDecoder {
    pub fn new<R: Read>(mut reader: R) -> Result<Self, BmapError> {
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(Self {
            bmap: Bmap::from_memory(&buf)?,
        })
    }

    pub fn from_bmap(bmap: Bmap) -> Self {
        Self { bmap }
    }

    pub fn bmap(&self) -> &Bmap {
        &self.bmap
    }
}

impl ImageDecoder for BmapDecoder {
    fn dimensions(&self) -> (u32, u32) {
        (self.bmap.width(), self.bmap.height())
    }

    fn color_type(&self) -> ColorType {
        ColorType::Rgba8
    }

    fn read_image(self, buf: &mut [u8]) -> ImageResult<()>
    where
        Self: Sized,
    {
        let (_, _, rgba) = convert::decode_rgba8(&self.bmap).map_err(|e: BmapConversionError| decoding_error(e))?;
        if rgba.len() != buf.len() {
            return Err(decoding_error(format!(
                "decoded {} bytes but the image needs {}",
                rgba.len(),
                buf.len()
            )));
        }
        buf.copy_from_slice(&rgba);
        Ok(())
    }

    fn read_image_boxed(self: Box<Self>, buf: &mut [u8]) -> ImageResult<()> {
        (*self).read_image(buf)
    }
}

mod helpers {
    pub(super) fn rgb8_to_rgba8(rgb: &[u8]) -> Vec<u8> {
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(chunk);
            rgba.push(0xFF);
        }
        rgba
    }
}
