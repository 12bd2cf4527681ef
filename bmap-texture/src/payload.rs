use std::io::{Cursor, Seek, Write};

use binrw::{binrw, BinRead, BinWrite, NullString};
use serde::Serialize;
use tracing::{debug, warn};

use crate::bitmap::RawBitmap;
use crate::bmap::{Bmap, BmapError, BmapPackerError};
use crate::dds::DdsTexture;
use crate::enums::BmapMode;

/// Signature written into every raw bitmap, a terminating NUL follows it.
pub const BUGBEAR_SIGNATURE: &str = " (Bugbear Entertainment Ltd. ";

/// Size of the raw bitmap sub-header when it carries [`BUGBEAR_SIGNATURE`].
pub const RAW_BITMAP_HEADER_SIZE: usize = 16 + BUGBEAR_SIGNATURE.len() + 1;

const LEGACY_FORMAT: u16 = 0x1c;
const LEGACY_KIND: u16 = 0x02;

/// A structured texture that can live inside a BMAP payload.
///
/// The payload codec never looks inside the texture: it stores [`TextureCodec::byte_size`] as the
/// data size and hands the bytes to [`TextureCodec::decode`] / [`TextureCodec::encode`].
pub trait TextureCodec: Sized {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(data: &[u8]) -> Result<Self, Self::Error>;

    /// Must write exactly [`TextureCodec::byte_size`] bytes.
    fn encode<W: Write + Seek>(&self, writer: &mut W) -> Result<(), Self::Error>;

    fn byte_size(&self) -> usize;

    /// Width and height of the top level surface.
    fn dimensions(&self) -> (u32, u32);
}

/// The two payload variants, selected by the mode field of the payload.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub enum BmapData<T = DdsTexture> {
    CompressedTexture(T),
    RawBitmap(RawBitmap),
}

impl<T: TextureCodec> BmapData<T> {
    pub fn mode(&self) -> BmapMode {
        match self {
            BmapData::CompressedTexture(_) => BmapMode::CompressedTexture,
            BmapData::RawBitmap(_) => BmapMode::RawBitmap,
        }
    }

    /// The data size written in front of the variant data.
    pub fn byte_size(&self) -> usize {
        match self {
            BmapData::CompressedTexture(texture) => texture.byte_size(),
            BmapData::RawBitmap(bitmap) => RAW_BITMAP_HEADER_SIZE + RawBitmap::byte_size(bitmap.width(), bitmap.height()),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            BmapData::CompressedTexture(texture) => texture.dimensions(),
            BmapData::RawBitmap(bitmap) => (bitmap.width() as u32, bitmap.height() as u32),
        }
    }
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone)]
struct PayloadHeader {
    #[br(temp)]
    #[bw(calc(path.len() as u32))]
    path_len: u32,

    #[br(count = path_len)]
    path: Vec<u8>,

    data_size: u32,
}

#[binrw]
#[brw(little)]
#[derive(Debug, Clone)]
struct RawBitmapHeader {
    #[br(temp)]
    #[bw(calc(LEGACY_FORMAT))]
    legacy_format: u16,

    #[br(temp)]
    #[bw(calc(LEGACY_KIND))]
    legacy_kind: u16,

    #[br(temp)]
    #[bw(calc(0))]
    legacy_offset: u32,

    #[br(temp)]
    #[bw(calc(0))]
    legacy_size: u32,

    width: u16,
    height: u16,
    signature: NullString,
}

/// Parses a fully decompressed payload.
pub fn parse_payload<T: TextureCodec>(payload: &[u8]) -> Result<Bmap<T>, BmapError> {
    let mut stream = Cursor::new(payload);
    let mode = BmapMode::try_from(u32::read_le(&mut stream)?)?;
    let header = PayloadHeader::read(&mut stream)?;
    let path = String::from_utf8(header.path).map_err(BmapError::InvalidPath)?;

    let variant_data = &payload[stream.position() as usize..];
    if variant_data.len() != header.data_size as usize {
        return Err(BmapError::SizeMismatch {
            what: "payload data",
            expected: header.data_size as usize,
            actual: variant_data.len(),
        });
    }
    debug!(?mode, path = %path, data_size = header.data_size, "parsed payload header");

    let data = match mode {
        BmapMode::CompressedTexture => {
            let texture = T::decode(variant_data).map_err(|e| BmapError::TextureError(Box::new(e)))?;
            BmapData::CompressedTexture(texture)
        }
        BmapMode::RawBitmap => BmapData::RawBitmap(parse_raw_bitmap(variant_data)?),
    };

    Ok(Bmap::new(path, data))
}

/// Checks whether `data` is a complete payload stored without chunk framing:
/// a known mode and a data size that covers exactly the rest of the buffer.
pub fn is_unframed_payload(data: &[u8]) -> bool {
    let mut stream = Cursor::new(data);
    let Ok(mode) = u32::read_le(&mut stream) else {
        return false;
    };
    if BmapMode::try_from(mode).is_err() {
        return false;
    }
    match PayloadHeader::read(&mut stream) {
        Ok(header) => data.len() - stream.position() as usize == header.data_size as usize,
        Err(_) => false,
    }
}

fn parse_raw_bitmap(data: &[u8]) -> Result<RawBitmap, BmapError> {
    let mut stream = Cursor::new(data);
    let header = RawBitmapHeader::read(&mut stream)?;
    if header.signature.0 != BUGBEAR_SIGNATURE.as_bytes() {
        warn!(signature = %header.signature, "raw bitmap carries an unexpected signature, it will be replaced on save");
    }

    let pixels = data[stream.position() as usize..].to_vec();
    RawBitmap::from_pixels(header.width, header.height, pixels)
}

/// Serializes a [`Bmap`] into the payload layout [`parse_payload`] reads.
pub fn serialize_payload<T: TextureCodec>(bmap: &Bmap<T>) -> Result<Vec<u8>, BmapPackerError> {
    let data_size = bmap.data().byte_size();
    let header = PayloadHeader {
        path: bmap.path().as_bytes().to_vec(),
        data_size: u32::try_from(data_size)
            .map_err(|_| BmapPackerError::PackingError(format!("Payload data of {data_size} bytes does not fit a u32")))?,
    };

    let mut writer = Cursor::new(Vec::with_capacity(12 + header.path.len() + data_size));
    u32::from(bmap.mode()).write_le(&mut writer)?;
    header.write(&mut writer)?;
    let data_start = writer.position();

    match bmap.data() {
        BmapData::CompressedTexture(texture) => {
            texture
                .encode(&mut writer)
                .map_err(|e| BmapPackerError::TextureError(Box::new(e)))?;
        }
        BmapData::RawBitmap(bitmap) => {
            RawBitmapHeader {
                width: bitmap.width(),
                height: bitmap.height(),
                signature: NullString::from(BUGBEAR_SIGNATURE),
            }
            .write(&mut writer)?;
            writer.write_all(bitmap.pixels())?;
        }
    }

    let written = (writer.position() - data_start) as usize;
    if written != data_size {
        return Err(BmapPackerError::PackingError(format!(
            "Declared {data_size} bytes of payload data but wrote {written}"
        )));
    }
    debug!(mode = ?bmap.mode(), payload_size = writer.get_ref().len(), "serialized payload");

    Ok(writer.into_inner())
}
