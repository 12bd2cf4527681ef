use lz4::block::CompressionMode;
use tracing::{debug, trace};

use crate::bmap::{BmapError, BmapPackerError};

/// Size of the buffer a single chunk is compressed into and decompressed from.
pub const CHUNK_WINDOW: usize = 0x40000;

/// Bytes kept free in [`CHUNK_WINDOW`] on top of the worst case LZ4 output.
pub const CHUNK_MARGIN: usize = 4;

/// Largest slice of the payload that goes into one chunk.
///
/// The chunk size is not stored in the file. Every chunk except the last one holds exactly this many
/// payload bytes, and every chunk must decompress into [`CHUNK_WINDOW`] bytes on its own.
pub const CHUNK_SIZE: usize = max_input_for_window(CHUNK_WINDOW);

/// Size of the length prefix in front of every chunk.
pub const CHUNK_LENGTH_SIZE: usize = 4;

/// Constant part of `LZ4_compressBound`.
const LZ4_BOUND_OVERHEAD: usize = 16;

/// Largest input whose worst case LZ4 output (`n + n / 255 + 16`) plus [`CHUNK_MARGIN`] still fits `window`.
pub const fn max_input_for_window(window: usize) -> usize {
    let budget = window - LZ4_BOUND_OVERHEAD - CHUNK_MARGIN;
    let mut size = budget * 255 / 256;
    while (size + 1) + (size + 1) / 255 <= budget {
        size += 1;
    }
    size
}

/// Decompresses a chunk stream into one contiguous payload.
///
/// `data` is everything after the container header. Offsets in errors are relative to it.
pub fn decompress_chunks(data: &[u8]) -> Result<Vec<u8>, BmapError> {
    let mut window = vec![0u8; CHUNK_WINDOW];
    let mut payload = Vec::new();
    let mut count = 0;

    for (index, chunk) in chunk_blocks(data).enumerate() {
        let (offset, block) = chunk?;
        let size = lz4::block::decompress_to_buffer(block, Some(CHUNK_WINDOW as i32), &mut window)
            .map_err(|source| BmapError::DecompressionFailure { index, source })?;
        trace!(index, offset, compressed = block.len(), decompressed = size, "decompressed chunk");

        payload.extend_from_slice(&window[..size]);
        count += 1;
    }

    debug!(chunks = count, payload_size = payload.len(), "decompressed chunk stream");
    Ok(payload)
}

/// Splits `data` into [`CHUNK_SIZE`] slices and compresses each one on its own.
/// An empty payload produces an empty chunk stream.
pub fn compress_chunks(data: &[u8]) -> Result<Vec<u8>, BmapPackerError> {
    let mut output = Vec::with_capacity(data.len() / 2 + CHUNK_LENGTH_SIZE);
    let mut count = 0;

    for (index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
        let block = lz4::block::compress(chunk, Some(CompressionMode::DEFAULT), false)
            .map_err(|source| BmapPackerError::CompressionFailure { index, source })?;

        if block.len() + CHUNK_MARGIN > CHUNK_WINDOW {
            return Err(BmapPackerError::PackingError(format!(
                "Chunk {index} compressed to {} bytes, which does not fit the {CHUNK_WINDOW} byte window",
                block.len()
            )));
        }
        trace!(index, decompressed = chunk.len(), compressed = block.len(), "compressed chunk");

        output.extend_from_slice(&(block.len() as u32).to_le_bytes());
        output.extend_from_slice(&block);
        count += 1;
    }

    debug!(chunks = count, payload_size = data.len(), stream_size = output.len(), "compressed chunk stream");
    Ok(output)
}

/// Iterates over the raw `(offset, compressed block)` pairs of a chunk stream without decompressing them.
pub fn chunk_blocks(data: &[u8]) -> impl Iterator<Item = Result<(usize, &[u8]), BmapError>> + '_ {
    let mut offset = 0;
    let mut index = 0;
    std::iter::from_fn(move || {
        if offset >= data.len() {
            return None;
        }
        let available = data.len() - offset;
        let result = match data[offset..].get(..CHUNK_LENGTH_SIZE) {
            None => Err(BmapError::TruncatedChunk { index, offset, declared: CHUNK_LENGTH_SIZE, available }),
            Some(prefix) => {
                let declared = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
                let start = offset + CHUNK_LENGTH_SIZE;
                match data[start..].get(..declared) {
                    Some(block) => Ok((offset, block)),
                    None => Err(BmapError::TruncatedChunk {
                        index,
                        offset,
                        declared,
                        available: data.len() - start,
                    }),
                }
            }
        };
        match &result {
            Ok((_, block)) => offset += CHUNK_LENGTH_SIZE + block.len(),
            Err(_) => offset = data.len(),
        }
        index += 1;
        Some(result)
    })
}
