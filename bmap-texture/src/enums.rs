use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::bmap::BmapError;

/// The payload variant stored in a BMAP file.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BmapMode
{
    CompressedTexture = 0,
    RawBitmap = 1,
}

impl TryFrom<u32> for BmapMode {
    type Error = BmapError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BmapMode::CompressedTexture),
            1 => Ok(BmapMode::RawBitmap),
            _ => Err(BmapError::UnrecognizedMode(value)),
        }
    }
}

impl From<BmapMode> for u32 {
    fn from(mode: BmapMode) -> Self {
        mode as u32
    }
}

/// How the payload is stored after the container header.
/// The game only loads [`Compression::Chunked`] files, [`Compression::None`] is meant for inspecting the payload.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Compression
{
    #[default]
    Chunked,
    None,
}

impl FromStr for Compression {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chunked" | "lz4" | "compressed" => Ok(Compression::Chunked),
            "none" | "raw" | "uncompressed" => Ok(Compression::None),
            _ => Err(format!("Invalid value for Compression: {}", s)),
        }
    }
}
