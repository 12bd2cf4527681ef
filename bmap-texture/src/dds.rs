use std::io::{self, Cursor, Seek, Write};

use binrw::{binrw, BinRead, BinWrite};
use bitfield_struct::bitfield;
use serde::Serialize;
use thiserror::Error;

use crate::bitmap::BYTES_PER_PIXEL;
use crate::payload::TextureCodec;

/// Magic plus header. A BMAP reserves exactly this many bytes in front of the mip chain.
pub const DDS_HEADER_SIZE: usize = 128;

const DDS_HEADER_STRUCT_SIZE: u32 = 124;
const DDS_PIXEL_FORMAT_SIZE: u32 = 32;

const DDSCAPS_TEXTURE: u32 = 0x1000;
const DDSCAPS_COMPLEX: u32 = 0x8;
const DDSCAPS_MIPMAP: u32 = 0x400000;

pub const FOURCC_DX10: [u8; 4] = *b"DX10";

#[derive(Debug, Error)]
pub enum DdsError {
    #[error("Io error {0}")]
    IoError(#[from] io::Error),

    #[error("Parsing error {0}")]
    ParsingError(#[from] binrw::Error),

    #[error("DX10 extended headers are not supported inside a bmap")]
    UnsupportedExtension,

    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("Mip level {level} needs {expected} bytes but only {available} are left")]
    Truncated { level: usize, expected: usize, available: usize },

    #[error("Mip level {level} holds {actual} bytes, expected {expected}")]
    MipSizeMismatch { level: usize, expected: usize, actual: usize },

    #[error("{0} bytes left after the last mip level")]
    TrailingData(usize),

    #[error("Mip level {level} of {width}x{height} pixels is too large to address")]
    DimensionsTooLarge { level: usize, width: u32, height: u32 },
}

#[bitfield(u32)]
#[derive(BinRead, BinWrite, Serialize, PartialEq, Eq)]
pub struct DdsHeaderFlags {
    /* 0x1 */ pub caps: bool,
    /* 0x2 */ pub height: bool,
    /* 0x4 */ pub width: bool,
    /* 0x8 */ pub pitch: bool,
    #[bits(8)]
    __: u8,
    /* 0x1000 */ pub pixel_format: bool,
    #[bits(4)]
    __: u8,
    /* 0x20000 */ pub mip_map_count: bool,
    __: bool,
    /* 0x80000 */ pub linear_size: bool,
    #[bits(3)]
    __: u8,
    /* 0x800000 */ pub depth: bool,
    #[bits(8)]
    __: u8,
}

#[bitfield(u32)]
#[derive(BinRead, BinWrite, Serialize, PartialEq, Eq)]
pub struct DdsPixelFormatFlags {
    /* 0x1 */ pub alpha_pixels: bool,
    /* 0x2 */ pub alpha: bool,
    /* 0x4 */ pub four_cc: bool,
    #[bits(3)]
    __: u8,
    /* 0x40 */ pub rgb: bool,
    #[bits(2)]
    __: u8,
    /* 0x200 */ pub yuv: bool,
    #[bits(7)]
    __: u8,
    /* 0x20000 */ pub luminance: bool,
    #[bits(14)]
    __: u16,
}

#[binrw]
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DdsPixelFormat {
    #[br(temp, assert(size == DDS_PIXEL_FORMAT_SIZE, "Invalid DDS pixel format size {}", size))]
    #[bw(calc(DDS_PIXEL_FORMAT_SIZE))]
    size: u32,

    pub flags: DdsPixelFormatFlags,
    pub four_cc: [u8; 4],
    pub rgb_bit_count: u32,
    pub r_bit_mask: u32,
    pub g_bit_mask: u32,
    pub b_bit_mask: u32,
    pub a_bit_mask: u32,
}

/// The legacy DDS header, including the `DDS ` magic.
/// Reserved fields are kept so a decoded header writes back byte for byte.
#[binrw]
#[brw(little, magic = b"DDS ")]
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DdsHeader {
    #[br(temp, assert(size == DDS_HEADER_STRUCT_SIZE, "Invalid DDS header size {}", size))]
    #[bw(calc(DDS_HEADER_STRUCT_SIZE))]
    size: u32,

    pub flags: DdsHeaderFlags,
    pub height: u32,
    pub width: u32,
    pub pitch_or_linear_size: u32,
    pub depth: u32,
    pub mip_map_count: u32,
    pub reserved1: [u32; 11],
    pub pixel_format: DdsPixelFormat,
    pub caps: u32,
    pub caps2: u32,
    pub caps3: u32,
    pub caps4: u32,
    pub reserved2: u32,
}

impl DdsHeader {
    /// Header for a block compressed texture, `four_cc` selects the block format (`DXT1`, `DXT5`, `ATI2`, ...).
    pub fn block_compressed(width: u32, height: u32, mip_levels: u32, four_cc: [u8; 4]) -> Result<Self, DdsError> {
        let mut header = Self::base(width, height, mip_levels);
        header.flags = header.flags.with_linear_size(true);
        header.pixel_format.flags = DdsPixelFormatFlags::new().with_four_cc(true);
        header.pixel_format.four_cc = four_cc;
        header.pitch_or_linear_size = header.mip_size(0)? as u32;
        Ok(header)
    }

    /// Header for an uncompressed A8R8G8B8 texture, stored as BGRA bytes.
    pub fn bgra8(width: u32, height: u32, mip_levels: u32) -> Self {
        let mut header = Self::base(width, height, mip_levels);
        header.flags = header.flags.with_pitch(true);
        header.pitch_or_linear_size = width.saturating_mul(BYTES_PER_PIXEL as u32);
        header.pixel_format = DdsPixelFormat {
            flags: DdsPixelFormatFlags::new().with_rgb(true).with_alpha_pixels(true),
            four_cc: [0; 4],
            rgb_bit_count: 32,
            r_bit_mask: 0x00FF_0000,
            g_bit_mask: 0x0000_FF00,
            b_bit_mask: 0x0000_00FF,
            a_bit_mask: 0xFF00_0000,
        };
        header
    }

    fn base(width: u32, height: u32, mip_levels: u32) -> Self {
        let mip_levels = mip_levels.max(1);
        let mut caps = DDSCAPS_TEXTURE;
        if mip_levels > 1 {
            caps |= DDSCAPS_COMPLEX | DDSCAPS_MIPMAP;
        }
        Self {
            flags: DdsHeaderFlags::new()
                .with_caps(true)
                .with_height(true)
                .with_width(true)
                .with_pixel_format(true)
                .with_mip_map_count(true),
            height,
            width,
            pitch_or_linear_size: 0,
            depth: 0,
            mip_map_count: mip_levels,
            reserved1: [0; 11],
            pixel_format: DdsPixelFormat {
                flags: DdsPixelFormatFlags::new(),
                four_cc: [0; 4],
                rgb_bit_count: 0,
                r_bit_mask: 0,
                g_bit_mask: 0,
                b_bit_mask: 0,
                a_bit_mask: 0,
            },
            caps,
            caps2: 0,
            caps3: 0,
            caps4: 0,
            reserved2: 0,
        }
    }

    /// A zero mip count means the texture has a single level.
    pub fn mip_levels(&self) -> usize {
        self.mip_map_count.max(1) as usize
    }

    pub fn mip_dimensions(&self, level: usize) -> (u32, u32) {
        let shift = level as u32;
        (
            self.width.checked_shr(shift).unwrap_or(0).max(1),
            self.height.checked_shr(shift).unwrap_or(0).max(1),
        )
    }

    /// Bytes per 4x4 block, `None` for uncompressed formats.
    pub fn block_size(&self) -> Option<usize> {
        if !self.pixel_format.flags.four_cc() {
            return None;
        }
        match &self.pixel_format.four_cc {
            b"DXT1" | b"ATI1" | b"BC4U" | b"BC4S" => Some(8),
            b"DXT2" | b"DXT3" | b"DXT4" | b"DXT5" | b"ATI2" | b"BC5U" | b"BC5S" => Some(16),
            _ => None,
        }
    }

    pub fn is_block_compressed(&self) -> bool {
        self.block_size().is_some()
    }

    /// Size in bytes of a single mip level.
    pub fn mip_size(&self, level: usize) -> Result<usize, DdsError> {
        let (mip_width, mip_height) = self.mip_dimensions(level);
        let too_large = || DdsError::DimensionsTooLarge { level, width: mip_width, height: mip_height };
        let (width, height) = (mip_width as usize, mip_height as usize);

        if self.pixel_format.flags.four_cc() {
            if self.pixel_format.four_cc == FOURCC_DX10 {
                return Err(DdsError::UnsupportedExtension);
            }
            let block_size = self.block_size().ok_or_else(|| {
                DdsError::UnsupportedFormat(format!(
                    "FourCC {:?}",
                    String::from_utf8_lossy(&self.pixel_format.four_cc)
                ))
            })?;
            return width
                .div_ceil(4)
                .checked_mul(height.div_ceil(4))
                .and_then(|blocks| blocks.checked_mul(block_size))
                .ok_or_else(too_large);
        }

        match self.pixel_format.rgb_bit_count as usize {
            0 => Err(DdsError::UnsupportedFormat("uncompressed format without a bit count".to_string())),
            bits => width
                .checked_mul(bits)
                .and_then(|row_bits| row_bits.div_ceil(8).checked_mul(height))
                .ok_or_else(too_large),
        }
    }
}

/// A DDS texture with its complete mip chain.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DdsTexture {
    header: DdsHeader,
    #[serde(skip_serializing)]
    mip_maps: Vec<Vec<u8>>,
}

impl DdsTexture {
    /// Pairs a header with its mip chain, checking every level against the size the header implies.
    pub fn from_parts(header: DdsHeader, mip_maps: Vec<Vec<u8>>) -> Result<Self, DdsError> {
        if mip_maps.len() != header.mip_levels() {
            return Err(DdsError::MipSizeMismatch {
                level: mip_maps.len().min(header.mip_levels()),
                expected: header.mip_levels(),
                actual: mip_maps.len(),
            });
        }
        for (level, mip) in mip_maps.iter().enumerate() {
            let expected = header.mip_size(level)?;
            if mip.len() != expected {
                return Err(DdsError::MipSizeMismatch { level, expected, actual: mip.len() });
            }
        }
        Ok(Self { header, mip_maps })
    }

    /// Wraps a single BGRA8 surface, such as the pixels of a raw bitmap.
    pub fn from_bgra8(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, DdsError> {
        Self::from_parts(DdsHeader::bgra8(width, height, 1), vec![pixels])
    }

    pub fn header(&self) -> &DdsHeader {
        &self.header
    }

    pub fn mip_maps(&self) -> &[Vec<u8>] {
        &self.mip_maps
    }

    pub fn width(&self) -> u32 {
        self.header.width
    }

    pub fn height(&self) -> u32 {
        self.header.height
    }

    pub fn num_mip_levels(&self) -> usize {
        self.mip_maps.len()
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, DdsError> {
        let mut writer = Cursor::new(Vec::with_capacity(self.byte_size()));
        self.encode(&mut writer)?;
        Ok(writer.into_inner())
    }
}

impl TextureCodec for DdsTexture {
    type Error = DdsError;

    fn decode(data: &[u8]) -> Result<Self, DdsError> {
        let mut stream = Cursor::new(data);
        let header = DdsHeader::read(&mut stream)?;
        if header.pixel_format.flags.four_cc() && header.pixel_format.four_cc == FOURCC_DX10 {
            return Err(DdsError::UnsupportedExtension);
        }

        let mut offset = stream.position() as usize;
        let mut mip_maps = Vec::new();
        for level in 0..header.mip_levels() {
            let expected = header.mip_size(level)?;
            let available = data.len() - offset;
            let mip = data[offset..]
                .get(..expected)
                .ok_or(DdsError::Truncated { level, expected, available })?;
            mip_maps.push(mip.to_vec());
            offset += expected;
        }

        if offset != data.len() {
            return Err(DdsError::TrailingData(data.len() - offset));
        }
        Ok(Self { header, mip_maps })
    }

    fn encode<W: Write + Seek>(&self, writer: &mut W) -> Result<(), DdsError> {
        self.header.write(writer)?;
        for mip in &self.mip_maps {
            writer.write_all(mip)?;
        }
        Ok(())
    }

    fn byte_size(&self) -> usize {
        DDS_HEADER_SIZE + self.mip_maps.iter().map(Vec::len).sum::<usize>()
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }
}
