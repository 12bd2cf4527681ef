//! Read and write BMAP texture containers.
//!
//! A BMAP file is a small fixed header followed by a sequence of independently
//! LZ4 compressed chunks. Once decompressed, the chunks form a payload holding
//! either a DDS texture or a raw 32 bit bitmap.
//!
//! ```ignore
//! use bmap_texture::bmap::Bmap;
//! use bmap_texture::enums::Compression;
//!
//! let bmap: Bmap = Bmap::from_file("textures/track_sign.bmap")?;
//! println!("{} ({:?}) {}x{}", bmap.path(), bmap.mode(), bmap.width(), bmap.height());
//! bmap.pack_to_file("track_sign_copy.bmap", Compression::Chunked)?;
//! ```

pub mod bitmap;
pub mod bmap;
pub mod chunk;
pub mod convert;
pub mod dds;
pub mod enums;
pub mod payload;

#[cfg(feature = "image")]
pub mod image;

pub use bmap::{Bmap, BmapError, BmapPackerError};
pub use payload::{BmapData, TextureCodec};
