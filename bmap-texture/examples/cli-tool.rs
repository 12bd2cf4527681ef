use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bmap_texture::bmap::{decompress_container, Bmap, BmapHeader, BMAP_EXTENSION, RAW_DUMP_EXTENSION};
use bmap_texture::enums::Compression;
use bmap_texture::image::BmapEncoder;
use bmap_texture::{chunk, convert, payload};
use image::DynamicImage;
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    global_opts: GlobalOpts,

    /// Command to execute
    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the metadata of a .bmap file as JSON
    Info(InputFile),

    /// Convert a .bmap file to a PNG file
    ToPng(InputFile),

    /// Convert a .bmap file to a DDS file
    ToDds(InputFile),

    /// Write the decompressed payload of a .bmap file to a .raw file
    Dump(InputFile),

    /// Read a .bmap file and write it back out
    Repack(Repack),

    /// Convert an image (png, tga, ...) to a raw bitmap .bmap file
    FromImage(FromImage),

    /// Wrap a DDS file in a compressed texture .bmap file
    FromDds(FromDds),

    /// Convert every .bmap file in a directory to PNG
    BatchToPng(BatchToPng),
}

#[derive(Debug, Args)]
struct GlobalOpts {
    /// The path to output to, if there's any
    #[clap(short, long, global = true)]
    output_path: Option<String>,

    /// When this flag is set, only errors will be shown
    #[clap(short, long, global = true)]
    silent: bool,

    /// Show per chunk details
    #[clap(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Args)]
struct InputFile {
    /// Path to the .bmap file
    #[arg(short, long)]
    input_path: String,
}

#[derive(Debug, Args)]
struct Repack {
    /// Path to the .bmap file
    #[arg(short, long)]
    input_path: String,

    /// How to store the payload: chunked, or none for an uncompressed file the game can't load
    #[arg(short, long, default_value = "chunked")]
    compression: Compression,
}

#[derive(Debug, Args)]
struct FromImage {
    /// Path to the input image
    #[arg(short, long)]
    input_path: String,

    /// Authoring path to embed in the bmap, defaults to the input path
    #[arg(long)]
    embedded_path: Option<String>,
}

#[derive(Debug, Args)]
struct FromDds {
    /// Path to the input .dds file
    #[arg(short, long)]
    input_path: String,

    /// Authoring path to embed in the bmap, defaults to the input path
    #[arg(long)]
    embedded_path: Option<String>,
}

#[derive(Debug, Args)]
struct BatchToPng {
    /// Directory to search for .bmap files
    #[arg(short, long)]
    input_dir: String,
}

#[derive(Serialize)]
struct BmapInfo<'a> {
    file: &'a str,
    chunks: usize,
    payload_size: usize,
    width: u32,
    height: u32,
    bmap: &'a Bmap,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.global_opts.silent, cli.global_opts.verbose) {
        (true, _) => LevelFilter::ERROR,
        (false, true) => LevelFilter::TRACE,
        (false, false) => LevelFilter::INFO,
    };
    tracing_subscriber::registry().with(fmt::layer()).with(level).init();

    match cli.command {
        Command::Info(cmd) => {
            let data = fs::read(&cmd.input_path).with_context(|| format!("Failed to read {}", cmd.input_path))?;
            let payload = decompress_container(&data).context("Failed to decompress the bmap")?;
            let body = &data[BmapHeader::SIZE..];
            let chunks = if payload.as_slice() == body { 0 } else { chunk::chunk_blocks(body).count() };
            let bmap: Bmap = payload::parse_payload(&payload).context("Failed to parse the bmap")?;

            let bmap_info = BmapInfo {
                file: &cmd.input_path,
                chunks,
                payload_size: payload.len(),
                width: bmap.width(),
                height: bmap.height(),
                bmap: &bmap,
            };
            println!("{}", serde_json::to_string_pretty(&bmap_info)?);
        }
        Command::ToPng(cmd) => {
            let bmap = read_bmap(&cmd.input_path)?;
            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, "png");
            let png = convert::create_png(&bmap).context("Failed to create PNG from the bmap")?;
            fs::write(&output_path, png).with_context(|| format!("Failed to write PNG file to {:?}", output_path))?;
            info!("Saved PNG to {:?}", output_path);
        }
        Command::ToDds(cmd) => {
            let bmap = read_bmap(&cmd.input_path)?;
            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, "dds");
            let dds = convert::create_dds(&bmap).context("Failed to create DDS from the bmap")?;
            fs::write(&output_path, dds).with_context(|| format!("Failed to write DDS file to {:?}", output_path))?;
            info!("Saved DDS to {:?}", output_path);
        }
        Command::Dump(cmd) => {
            let data = fs::read(&cmd.input_path).with_context(|| format!("Failed to read {}", cmd.input_path))?;
            let payload = decompress_container(&data).context("Failed to decompress the bmap")?;
            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, RAW_DUMP_EXTENSION);
            fs::write(&output_path, payload).with_context(|| format!("Failed to write payload to {:?}", output_path))?;
            info!("Saved payload to {:?}", output_path);
        }
        Command::Repack(cmd) => {
            let bmap = read_bmap(&cmd.input_path)?;
            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, "repacked.bmap");
            bmap.pack_to_file(&output_path, cmd.compression)
                .with_context(|| format!("Failed to write bmap to {:?}", output_path))?;
            info!("Saved bmap to {:?}", output_path);
        }
        Command::FromImage(cmd) => {
            let image = image::open(&cmd.input_path)
                .with_context(|| format!("Failed to open image {}", cmd.input_path))?;
            let image = DynamicImage::ImageRgba8(image.to_rgba8());
            let embedded_path = cmd.embedded_path.unwrap_or_else(|| cmd.input_path.clone());

            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, BMAP_EXTENSION);
            let writer = BufWriter::new(
                File::create(&output_path).with_context(|| format!("Failed to create {:?}", output_path))?,
            );
            image
                .write_with_encoder(BmapEncoder::new(writer, embedded_path, Compression::Chunked))
                .with_context(|| format!("Failed to write bmap to {:?}", output_path))?;
            info!("Saved bmap to {:?}", output_path);
        }
        Command::FromDds(cmd) => {
            let dds = fs::read(&cmd.input_path).with_context(|| format!("Failed to read {}", cmd.input_path))?;
            let embedded_path = cmd.embedded_path.unwrap_or_else(|| cmd.input_path.clone());
            let bmap = Bmap::from_dds(embedded_path, &dds).context("Failed to read the DDS file")?;

            let output_path = get_output_path(&cli.global_opts.output_path, &cmd.input_path, BMAP_EXTENSION);
            bmap.pack_to_file(&output_path, Compression::Chunked)
                .with_context(|| format!("Failed to write bmap to {:?}", output_path))?;
            info!("Saved bmap to {:?}", output_path);
        }
        Command::BatchToPng(cmd) => {
            let files: Vec<PathBuf> = WalkDir::new(&cmd.input_dir)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.into_path())
                .filter(|path| path.extension().is_some_and(|ext| ext == BMAP_EXTENSION))
                .collect();

            let failures = files
                .par_iter()
                .filter(|path| {
                    let result = Bmap::from_file(path)
                        .map_err(anyhow::Error::from)
                        .and_then(|bmap: Bmap| Ok(convert::create_png(&bmap)?))
                        .and_then(|png| Ok(fs::write(path.with_extension("png"), png)?));
                    if let Err(e) = &result {
                        error!("Failed to convert {}: {:#}", path.display(), e);
                    }
                    result.is_err()
                })
                .count();

            info!("Converted {}/{} files", files.len() - failures, files.len());
        }
    }

    Ok(())
}

fn read_bmap(input_path: &str) -> Result<Bmap> {
    let bmap: Bmap = Bmap::from_file(input_path).with_context(|| format!("Failed to read bmap {}", input_path))?;
    info!("Loaded {:?} bmap {} ({}x{})", bmap.mode(), bmap.path(), bmap.width(), bmap.height());
    Ok(bmap)
}

fn get_output_path(output_path: &Option<String>, input_path: &str, extension: &str) -> PathBuf {
    match output_path {
        Some(path) => PathBuf::from(path),
        None => Path::new(input_path).with_extension(extension),
    }
}
