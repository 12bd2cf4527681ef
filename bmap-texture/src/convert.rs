use std::ptr::NonNull;
use std::{io, slice};

use directxtex::{HResultError, ScratchImage, DDS_FLAGS, DXGI_FORMAT, TEX_FILTER_FLAGS, TEX_THRESHOLD_DEFAULT};
use png::ColorType;
use thiserror::Error;

use crate::bitmap::BYTES_PER_PIXEL;
use crate::bmap::Bmap;
use crate::convert::BmapConversionError::DirectXTexError;
use crate::dds::{DdsError, DdsTexture};
use crate::payload::BmapData;

#[cfg(feature = "image")]
use crate::image::BmapDecoder;
#[cfg(feature = "image")]
use image::{DynamicImage, ImageResult};

#[derive(Error, Debug)]
pub enum BmapConversionError {
    #[error("Io error {0}")]
    IoError(#[from] io::Error),

    #[error("DirectxTex error {0}")]
    DirectXTexError(#[from] HResultError),

    #[error("DDS error {0}")]
    DdsError(#[from] DdsError),

    #[error("PNG encoding error {0}")]
    PngError(#[from] png::EncodingError),

    #[error("Invalid texture: {0}")]
    InvalidTexture(String),
}

/// Returns the DDS file of a bmap.
/// Compressed textures are returned as stored, raw bitmaps are wrapped in an uncompressed A8R8G8B8 DDS.
pub fn create_dds(bmap: &Bmap) -> Result<Vec<u8>, BmapConversionError> {
    let dds = match bmap.data() {
        BmapData::CompressedTexture(texture) => texture.to_vec()?,
        BmapData::RawBitmap(bitmap) => DdsTexture::from_bgra8(
            bitmap.width() as u32,
            bitmap.height() as u32,
            bitmap.pixels().to_vec(),
        )?
        .to_vec()?,
    };
    Ok(dds)
}

/// Converts the top level of a bmap into a PNG image file.
pub fn create_png(bmap: &Bmap) -> Result<Vec<u8>, BmapConversionError> {
    let (width, height, rgba) = decode_rgba8(bmap)?;

    let mut buffer = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buffer, width, height);
        encoder.set_color(ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&rgba)?;
        writer.finish()?;
    }
    Ok(buffer)
}

#[cfg(feature = "image")]
pub fn create_dynamic_image(bmap: &Bmap) -> ImageResult<DynamicImage> {
    DynamicImage::from_decoder(BmapDecoder::from_bmap(bmap.clone()))
}

/// Decodes the top level of a bmap into tightly packed RGBA8 pixels.
pub fn decode_rgba8(bmap: &Bmap) -> Result<(u32, u32, Vec<u8>), BmapConversionError> {
    match bmap.data() {
        BmapData::RawBitmap(bitmap) => Ok((bitmap.width() as u32, bitmap.height() as u32, bitmap.to_rgba8())),
        BmapData::CompressedTexture(texture) => texture_to_rgba8(texture),
    }
}

fn texture_to_rgba8(texture: &DdsTexture) -> Result<(u32, u32, Vec<u8>), BmapConversionError> {
    let dds = texture.to_vec()?;
    let mut scratch_image =
        ScratchImage::load_dds(dds.as_slice(), DDS_FLAGS::DDS_FLAGS_NONE, None, None).map_err(DirectXTexError)?;

    let format = scratch_image.metadata().format;
    if format.is_compressed() {
        scratch_image = directxtex::decompress(
            scratch_image.images(),
            scratch_image.metadata(),
            DXGI_FORMAT::DXGI_FORMAT_R8G8B8A8_UNORM,
        )
        .map_err(DirectXTexError)?;
    } else if format != DXGI_FORMAT::DXGI_FORMAT_R8G8B8A8_UNORM {
        scratch_image = directxtex::convert(
            scratch_image.images(),
            scratch_image.metadata(),
            DXGI_FORMAT::DXGI_FORMAT_R8G8B8A8_UNORM,
            TEX_FILTER_FLAGS::TEX_FILTER_DEFAULT | TEX_FILTER_FLAGS::TEX_FILTER_FORCE_NON_WIC,
            TEX_THRESHOLD_DEFAULT,
        )
        .map_err(DirectXTexError)?;
    }

    let image = scratch_image
        .image(0, 0, 0)
        .ok_or_else(|| BmapConversionError::InvalidTexture("There are no surfaces in the texture".to_string()))?;
    let pixels = NonNull::new(image.pixels)
        .ok_or_else(|| BmapConversionError::InvalidTexture("Surface has no pixel data".to_string()))?;

    let row_len = image.width * BYTES_PER_PIXEL;
    if image.row_pitch < row_len {
        return Err(BmapConversionError::InvalidTexture(format!(
            "Row pitch {} is smaller than a row of {} pixels",
            image.row_pitch, image.width
        )));
    }

    // the scratch image owns the surface for the rest of this function
    let raw = unsafe { slice::from_raw_parts(pixels.as_ptr(), image.row_pitch * image.height) };
    let mut rgba = Vec::with_capacity(row_len * image.height);
    for row in raw.chunks(image.row_pitch).take(image.height) {
        rgba.extend_from_slice(&row[..row_len]);
    }

    Ok((image.width as u32, image.height as u32, rgba))
}
