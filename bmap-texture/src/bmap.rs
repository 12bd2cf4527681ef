use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;
use std::string::FromUtf8Error;

use binrw::{BinRead, BinWrite};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::bitmap::RawBitmap;
use crate::chunk;
use crate::dds::DdsTexture;
use crate::enums::{BmapMode, Compression};
use crate::payload::{self, BmapData, TextureCodec};

/// First header field, a format tag rather than a count.
pub const BMAP_TAG: u32 = 4;
pub const BMAP_MAGIC: [u8; 4] = *b"pamb";
pub const BMAP_VERSION: u32 = 3;

/// Extension of container files.
pub const BMAP_EXTENSION: &str = "bmap";
/// Extension of the decompressed payload dump written next to a container.
pub const RAW_DUMP_EXTENSION: &str = "raw";

#[derive(Debug, Error)]
pub enum BmapError {
    #[error("Io error {0}")]
    IoError(#[from] io::Error),

    #[error("Parsing error {0}")]
    ParsingError(#[from] binrw::Error),

    #[error("Not a bmap container")]
    NotThisFormat,

    #[error("Chunk {index} at offset {offset:#x} declares {declared} bytes but only {available} are left")]
    TruncatedChunk { index: usize, offset: usize, declared: usize, available: usize },

    #[error("Failed to decompress chunk {index}: {source}")]
    DecompressionFailure { index: usize, source: io::Error },

    #[error("Unrecognized payload mode {0}")]
    UnrecognizedMode(u32),

    #[error("Size mismatch in {what}: expected {expected} bytes, got {actual}")]
    SizeMismatch { what: &'static str, expected: usize, actual: usize },

    #[error("Embedded path is not valid UTF-8: {0}")]
    InvalidPath(#[source] FromUtf8Error),

    #[error("Texture error {0}")]
    TextureError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum BmapPackerError {
    #[error("Error serializing the bmap: {0}")]
    SerializationError(#[from] binrw::Error),

    #[error("Failed to write data: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to compress chunk {index}: {source}")]
    CompressionFailure { index: usize, source: io::Error },

    #[error("Failed to encode texture: {0}")]
    TextureError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Error building bmap: {0}")]
    PackingError(String),
}

/// The container header: tag, magic and version.
#[derive(BinRead, BinWrite, Serialize, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct BmapHeader {
    pub tag: u32,
    pub magic: [u8; 4],
    pub version: u32,
}

impl BmapHeader {
    pub const SIZE: usize = 12;

    pub fn is_valid(&self) -> bool {
        self.tag == BMAP_TAG && self.magic == BMAP_MAGIC && self.version == BMAP_VERSION
    }
}

impl Default for BmapHeader {
    fn default() -> Self {
        Self {
            tag: BMAP_TAG,
            magic: BMAP_MAGIC,
            version: BMAP_VERSION,
        }
    }
}

/// Reads a header from `reader` and checks it. A short read counts as an invalid header.
pub fn is_bmap_header<R: Read + Seek>(reader: &mut R) -> bool {
    BmapHeader::read(reader).map(|header| header.is_valid()).unwrap_or(false)
}

/// Validates the container header and returns the decompressed payload, without parsing it.
/// Containers written with [`Compression::None`] are recognised when their chunk stream fails to decode.
pub fn decompress_container(data: &[u8]) -> Result<Vec<u8>, BmapError> {
    let mut stream = Cursor::new(data);
    if !is_bmap_header(&mut stream) {
        return Err(BmapError::NotThisFormat);
    }
    debug!(container_size = data.len(), "bmap header accepted");

    let body = &data[stream.position() as usize..];
    match chunk::decompress_chunks(body) {
        Ok(payload) => Ok(payload),
        Err(e) if payload::is_unframed_payload(body) => {
            debug!(error = %e, "not a chunk stream, reading the payload uncompressed");
            Ok(body.to_vec())
        }
        Err(e) => Err(e),
    }
}

/// A single texture asset, as stored in a BMAP file.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Bmap<T = DdsTexture> {
    path: String,
    data: BmapData<T>,
}

impl<T: TextureCodec> Bmap<T> {
    pub fn new(path: impl Into<String>, data: BmapData<T>) -> Self {
        Self { path: path.into(), data }
    }

    pub fn from_texture(path: impl Into<String>, texture: T) -> Self {
        Self::new(path, BmapData::CompressedTexture(texture))
    }

    pub fn from_bitmap(path: impl Into<String>, bitmap: RawBitmap) -> Self {
        Self::new(path, BmapData::RawBitmap(bitmap))
    }

    pub fn mode(&self) -> BmapMode {
        self.data.mode()
    }

    /// The authoring path embedded in the payload. It is metadata only.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn data(&self) -> &BmapData<T> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut BmapData<T> {
        &mut self.data
    }

    pub fn into_data(self) -> BmapData<T> {
        self.data
    }

    pub fn texture(&self) -> Option<&T> {
        match &self.data {
            BmapData::CompressedTexture(texture) => Some(texture),
            BmapData::RawBitmap(_) => None,
        }
    }

    pub fn bitmap(&self) -> Option<&RawBitmap> {
        match &self.data {
            BmapData::CompressedTexture(_) => None,
            BmapData::RawBitmap(bitmap) => Some(bitmap),
        }
    }

    pub fn width(&self) -> u32 {
        self.data.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.data.dimensions().1
    }

    pub fn from_memory(data: &[u8]) -> Result<Self, BmapError> {
        let payload = decompress_container(data)?;
        payload::parse_payload(&payload)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, BmapError> {
        let data = fs::read(path.as_ref()).map_err(BmapError::IoError)?;
        Self::from_memory(&data)
    }

    /// Loads a file and writes its decompressed payload next to it, with the [`RAW_DUMP_EXTENSION`] extension.
    /// The dump is written before parsing, so it is also available for payloads that fail to parse.
    pub fn from_file_with_dump<P: AsRef<Path>>(path: P) -> Result<Self, BmapError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(BmapError::IoError)?;
        let payload = decompress_container(&data)?;

        let dump_path = path.with_extension(RAW_DUMP_EXTENSION);
        fs::write(&dump_path, &payload).map_err(BmapError::IoError)?;
        info!(dump = %dump_path.display(), size = payload.len(), "dumped decompressed payload");

        payload::parse_payload(&payload)
    }

    /// Checks whether a file starts with a valid container header.
    pub fn is_bmap_file<P: AsRef<Path>>(path: P) -> Result<bool, BmapError> {
        let file = File::open(path).map_err(BmapError::IoError)?;
        let mut reader = BufReader::new(file);
        Ok(is_bmap_header(&mut reader))
    }

    pub fn pack_to_vec(&self, compression: Compression) -> Result<Vec<u8>, BmapPackerError> {
        let mut writer = Cursor::new(Vec::new());
        self.pack_internal(&mut writer, compression)?;
        Ok(writer.into_inner())
    }

    pub fn pack_to_file<P: AsRef<Path>>(&self, path: P, compression: Compression) -> Result<(), BmapPackerError> {
        let file = File::create(path).map_err(BmapPackerError::IoError)?;
        let mut writer = BufWriter::new(file);
        self.pack_internal(&mut writer, compression)?;
        writer.flush()?;
        Ok(())
    }

    fn pack_internal<W: Write + Seek>(&self, writer: &mut W, compression: Compression) -> Result<(), BmapPackerError> {
        BmapHeader::default().write(writer)?;

        let payload = payload::serialize_payload(self)?;
        match compression {
            Compression::Chunked => writer.write_all(&chunk::compress_chunks(&payload)?)?,
            Compression::None => writer.write_all(&payload)?,
        }
        debug!(?compression, payload_size = payload.len(), "packed bmap");
        Ok(())
    }
}

impl Bmap<DdsTexture> {
    /// Wraps a DDS file as a compressed texture bmap.
    pub fn from_dds(path: impl Into<String>, dds: &[u8]) -> Result<Self, BmapError> {
        let texture = DdsTexture::decode(dds).map_err(|e| BmapError::TextureError(Box::new(e)))?;
        Ok(Self::from_texture(path, texture))
    }
}
