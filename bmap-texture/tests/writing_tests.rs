use std::fs;
use std::path::PathBuf;

use bmap_texture::bitmap::RawBitmap;
use bmap_texture::bmap::{decompress_container, BmapHeader, RAW_DUMP_EXTENSION};
use bmap_texture::chunk::{chunk_blocks, CHUNK_SIZE};
use bmap_texture::dds::{DdsHeader, DdsTexture, DDS_HEADER_SIZE};
use bmap_texture::enums::{BmapMode, Compression};
use bmap_texture::payload::{parse_payload, serialize_payload, BUGBEAR_SIGNATURE, RAW_BITMAP_HEADER_SIZE};
use bmap_texture::{convert, Bmap, BmapData, BmapError};

fn bitmap_bmap(path: &str, width: u16, height: u16) -> Bmap {
    let mut bitmap = RawBitmap::new(width, height);
    for (i, byte) in bitmap.pixels_mut().iter_mut().enumerate() {
        *byte = (i * 7 % 256) as u8;
    }
    Bmap::from_bitmap(path, bitmap)
}

fn texture_bmap(path: &str, four_cc: [u8; 4], width: u32, height: u32, mip_levels: u32) -> Bmap {
    let header = DdsHeader::block_compressed(width, height, mip_levels, four_cc).unwrap();
    let mip_maps = (0..header.mip_levels())
        .map(|level| (0..header.mip_size(level).unwrap()).map(|i| (i + level) as u8).collect())
        .collect();
    Bmap::from_texture(path, DdsTexture::from_parts(header, mip_maps).unwrap())
}

fn load(data: &[u8]) -> Result<Bmap, BmapError> {
    Bmap::from_memory(data)
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bmap-texture-{}-{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn writes_two_by_one_bitmap() {
    let pixels = vec![0xFF, 0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0xFF];
    let bmap: Bmap = Bmap::from_bitmap("a.bmap", RawBitmap::from_pixels(2, 1, pixels.clone()).unwrap());

    let payload = serialize_payload(&bmap).unwrap();

    let mut expected = Vec::new();
    expected.extend_from_slice(&1u32.to_le_bytes());
    expected.extend_from_slice(&6u32.to_le_bytes());
    expected.extend_from_slice(b"a.bmap");
    expected.extend_from_slice(&54u32.to_le_bytes());
    expected.extend_from_slice(&[0x1c, 0x00, 0x02, 0x00]);
    expected.extend_from_slice(&[0; 8]);
    expected.extend_from_slice(&[0x02, 0x00, 0x01, 0x00]);
    expected.extend_from_slice(BUGBEAR_SIGNATURE.as_bytes());
    expected.push(0);
    expected.extend_from_slice(&pixels);
    assert_eq!(payload, expected);
    assert_eq!(RAW_BITMAP_HEADER_SIZE, 46);

    let data = bmap.pack_to_vec(Compression::Chunked).unwrap();
    assert_eq!(&data[..12], &[4, 0, 0, 0, b'p', b'a', b'm', b'b', 3, 0, 0, 0]);

    let reloaded = load(&data).unwrap();
    assert_eq!(reloaded.bitmap().unwrap().pixels(), pixels.as_slice());
    assert_eq!(reloaded, bmap);
}

#[test]
fn default_header_matches_the_container_header() {
    let bmap = bitmap_bmap("a", 1, 1);
    let data = bmap.pack_to_vec(Compression::Chunked).unwrap();

    let mut header = Vec::new();
    binrw::BinWrite::write(&BmapHeader::default(), &mut std::io::Cursor::new(&mut header)).unwrap();
    assert_eq!(header.len(), BmapHeader::SIZE);
    assert_eq!(&data[..BmapHeader::SIZE], header.as_slice());
}

#[test]
fn payload_round_trips() {
    let bmaps = [
        bitmap_bmap("textures/raw.bmap", 5, 3),
        bitmap_bmap("", 0, 0),
        texture_bmap("textures/dxt1.bmap", *b"DXT1", 8, 8, 4),
        texture_bmap("textures/dxt5.bmap", *b"DXT5", 13, 7, 1),
        texture_bmap("textures/ati2.bmap", *b"ATI2", 16, 4, 3),
    ];

    for bmap in bmaps {
        let payload = serialize_payload(&bmap).unwrap();
        let reparsed: Bmap = parse_payload(&payload).unwrap();
        assert_eq!(reparsed, bmap);
        assert_eq!(serialize_payload(&reparsed).unwrap(), payload);
    }
}

#[test]
fn data_size_covers_the_whole_texture() {
    let bmap = texture_bmap("t", *b"DXT5", 8, 8, 4);
    let texture_size = DDS_HEADER_SIZE + 64 + 16 + 16 + 16;
    assert_eq!(bmap.data().byte_size(), texture_size);

    let payload = serialize_payload(&bmap).unwrap();
    assert_eq!(&payload[..4], &0u32.to_le_bytes());
    assert_eq!(&payload[9..13], &(texture_size as u32).to_le_bytes());
    assert_eq!(payload.len(), 13 + texture_size);
    assert_eq!(&payload[13..17], b"DDS ");
}

#[test]
fn path_length_counts_bytes() {
    let bmap = bitmap_bmap("tekstuurit/äö.bmap", 1, 1);
    let payload = serialize_payload(&bmap).unwrap();

    let path_len = u32::from_le_bytes(payload[4..8].try_into().unwrap()) as usize;
    assert_eq!(path_len, "tekstuurit/äö.bmap".len());
    assert_eq!(&payload[8..8 + path_len], "tekstuurit/äö.bmap".as_bytes());
}

#[test]
fn container_round_trips() {
    for compression in [Compression::Chunked, Compression::None] {
        for bmap in [bitmap_bmap("a", 64, 32), texture_bmap("b", *b"DXT1", 64, 64, 7), bitmap_bmap("", 0, 0)] {
            let data = bmap.pack_to_vec(compression).unwrap();
            let reloaded = load(&data).unwrap();
            assert_eq!(reloaded, bmap, "{compression:?} round trip of {:?}", bmap.path());
            assert_eq!(reloaded.pack_to_vec(compression).unwrap(), data);
        }
    }
}

#[test]
fn compression_names_parse() {
    assert_eq!("chunked".parse::<Compression>().unwrap(), Compression::Chunked);
    assert_eq!("lz4".parse::<Compression>().unwrap(), Compression::Chunked);
    assert_eq!("none".parse::<Compression>().unwrap(), Compression::None);
    assert_eq!("uncompressed".parse::<Compression>().unwrap(), Compression::None);
    assert!("zstd".parse::<Compression>().is_err());
    assert_eq!(Compression::default(), Compression::Chunked);
}

#[test]
fn large_bitmap_spans_several_chunks() {
    let bmap = bitmap_bmap("big", 512, 300);
    let payload = serialize_payload(&bmap).unwrap();
    assert!(payload.len() > 2 * CHUNK_SIZE);

    let data = bmap.pack_to_vec(Compression::Chunked).unwrap();
    let chunks = chunk_blocks(&data[BmapHeader::SIZE..]).count();
    assert_eq!(chunks, payload.len().div_ceil(CHUNK_SIZE));

    assert_eq!(decompress_container(&data).unwrap(), payload);
    assert_eq!(load(&data).unwrap(), bmap);
}

#[test]
fn uncompressed_output_is_header_and_payload() {
    let bmap = texture_bmap("c", *b"DXT1", 4, 4, 1);
    let data = bmap.pack_to_vec(Compression::None).unwrap();
    let payload = serialize_payload(&bmap).unwrap();

    assert_eq!(data.len(), BmapHeader::SIZE + payload.len());
    assert_eq!(&data[BmapHeader::SIZE..], payload.as_slice());

    let reparsed: Bmap = parse_payload(&data[BmapHeader::SIZE..]).unwrap();
    assert_eq!(reparsed, bmap);
}

#[test]
fn edits_survive_a_round_trip() {
    let mut bmap = bitmap_bmap("before", 2, 2);
    bmap.set_path("after");
    if let BmapData::RawBitmap(bitmap) = bmap.data_mut() {
        bitmap.pixels_mut()[0] = 0xAB;
    }

    let reloaded = load(&bmap.pack_to_vec(Compression::Chunked).unwrap()).unwrap();
    assert_eq!(reloaded.path(), "after");
    assert_eq!(reloaded.bitmap().unwrap().pixel(0, 0).unwrap()[0], 0xAB);
}

#[test]
fn writes_and_reads_files() {
    let dir = temp_dir("files");
    let path = dir.join("texture.bmap");
    let bmap = texture_bmap("textures/file.bmap", *b"DXT5", 32, 16, 2);

    bmap.pack_to_file(&path, Compression::Chunked).unwrap();
    assert!(Bmap::<DdsTexture>::is_bmap_file(&path).unwrap());
    let reloaded: Bmap = Bmap::from_file(&path).unwrap();
    assert_eq!(reloaded, bmap);

    let dumped: Bmap = Bmap::from_file_with_dump(&path).unwrap();
    assert_eq!(dumped, bmap);
    let dump = fs::read(path.with_extension(RAW_DUMP_EXTENSION)).unwrap();
    assert_eq!(dump, serialize_payload(&bmap).unwrap());

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn dump_is_written_for_unparseable_payloads() {
    let dir = temp_dir("dump");
    let path = dir.join("broken.bmap");

    let mut payload = serialize_payload(&bitmap_bmap("x", 1, 1)).unwrap();
    payload[0] = 7;
    let mut data = Vec::new();
    binrw::BinWrite::write(&BmapHeader::default(), &mut std::io::Cursor::new(&mut data)).unwrap();
    data.extend(bmap_texture::chunk::compress_chunks(&payload).unwrap());
    fs::write(&path, data).unwrap();

    let result: Result<Bmap, BmapError> = Bmap::from_file_with_dump(&path);
    assert!(matches!(result, Err(BmapError::UnrecognizedMode(7))));
    assert_eq!(fs::read(path.with_extension(RAW_DUMP_EXTENSION)).unwrap(), payload);

    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn raw_bitmap_exports_to_png() {
    let bmap: Bmap = Bmap::from_bitmap("p", RawBitmap::from_rgba8(2, 2, &[255, 0, 0, 255].repeat(4)).unwrap());
    assert_eq!(bmap.bitmap().unwrap().pixel(0, 0), Some([0, 0, 255, 255]));

    let png = convert::create_png(&bmap).unwrap();
    assert_eq!(&png[..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);

    let (width, height, rgba) = convert::decode_rgba8(&bmap).unwrap();
    assert_eq!((width, height), (2, 2));
    assert_eq!(rgba, [255, 0, 0, 255].repeat(4));
}

#[test]
fn raw_bitmap_exports_to_dds_and_back() {
    let bmap = bitmap_bmap("d", 3, 2);
    let dds = convert::create_dds(&bmap).unwrap();
    assert_eq!(dds.len(), DDS_HEADER_SIZE + 3 * 2 * 4);

    let wrapped = Bmap::from_dds("d", &dds).unwrap();
    assert_eq!(wrapped.mode(), BmapMode::CompressedTexture);
    assert_eq!((wrapped.width(), wrapped.height()), (3, 2));

    let texture = wrapped.texture().unwrap();
    assert_eq!(texture.num_mip_levels(), 1);
    assert_eq!(texture.mip_maps()[0].as_slice(), bmap.bitmap().unwrap().pixels());

    let reloaded = load(&wrapped.pack_to_vec(Compression::Chunked).unwrap()).unwrap();
    assert_eq!(reloaded, wrapped);
}

#[test]
fn compressed_texture_exports_its_dds_unchanged() {
    let bmap = texture_bmap("e", *b"DXT1", 16, 16, 5);
    let dds = convert::create_dds(&bmap).unwrap();
    assert_eq!(dds, bmap.texture().unwrap().to_vec().unwrap());
    assert_eq!(Bmap::from_dds("e", &dds).unwrap(), bmap);
}

#[cfg(feature = "image")]
#[test]
fn image_encoder_writes_raw_bitmaps() {
    use bmap_texture::image::BmapEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    let rgb = [10, 20, 30, 40, 50, 60];
    let mut data = Vec::new();
    BmapEncoder::new(&mut data, "from/image.png", Compression::Chunked)
        .write_image(&rgb, 2, 1, ExtendedColorType::Rgb8)
        .unwrap();

    let bmap = load(&data).unwrap();
    assert_eq!(bmap.path(), "from/image.png");
    assert_eq!(bmap.bitmap().unwrap().pixels(), &[30, 20, 10, 255, 60, 50, 40, 255]);

    let image = convert::create_dynamic_image(&bmap).unwrap();
    assert_eq!(image.to_rgba8().into_raw(), vec![10, 20, 30, 255, 40, 50, 60, 255]);
}

#[cfg(feature = "image")]
#[test]
fn image_decoder_reads_containers() {
    use bmap_texture::image::BmapDecoder;
    use image::{DynamicImage, ImageDecoder};

    let bmap: Bmap = Bmap::from_bitmap("d", RawBitmap::from_rgba8(1, 2, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap());
    let data = bmap.pack_to_vec(Compression::Chunked).unwrap();

    let decoder = BmapDecoder::new(std::io::Cursor::new(data)).unwrap();
    assert_eq!(decoder.dimensions(), (1, 2));
    assert_eq!(decoder.bmap(), &bmap);

    let image = DynamicImage::from_decoder(decoder).unwrap();
    assert_eq!(image.to_rgba8().into_raw(), vec![1, 2, 3, 4, 5, 6, 7, 8]);

    assert!(BmapDecoder::new(&b"not a bmap"[..]).is_err());
}

#[cfg(feature = "image")]
#[test]
fn image_encoder_rejects_oversized_images() {
    use bmap_texture::image::BmapEncoder;
    use image::{ExtendedColorType, ImageEncoder};

    let result = BmapEncoder::new(Vec::new(), "x", Compression::Chunked).write_image(
        &[],
        70_000,
        0,
        ExtendedColorType::Rgba8,
    );
    assert!(result.is_err());
}
