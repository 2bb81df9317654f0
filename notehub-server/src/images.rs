//! Uploaded image naming by perceptual hash
//!
//! Visually identical uploads map to the same file name, so re-uploading an
//! image reuses the stored copy.

use image::{imageops::FilterType, ImageFormat};
use notehub_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Side length of the downscaled hash image
const HASH_SIZE: u32 = 8;

/// Result of storing an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub file_name: String,
    /// `false` when an identical image was already on disk
    pub created: bool,
}

fn extension(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::Gif => Some("gif"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Bmp => Some("bmp"),
        ImageFormat::Ico => Some("ico"),
        ImageFormat::Tiff => Some("tiff"),
        _ => None,
    }
}

/// 64-bit average hash: 8x8 grayscale, bit set where the pixel is at or
/// above the mean, first pixel in the most significant bit
pub fn average_hash(bytes: &[u8]) -> Result<u64> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| Error::InvalidInput(format!("Cannot decode image: {}", e)))?;
    let small = img
        .resize_exact(HASH_SIZE, HASH_SIZE, FilterType::Triangle)
        .to_luma8();

    let pixels: Vec<u32> = small.pixels().map(|p| u32::from(p.0[0])).collect();
    let mean = pixels.iter().sum::<u32>() / pixels.len().max(1) as u32;

    Ok(pixels
        .iter()
        .fold(0u64, |hash, &p| (hash << 1) | u64::from(p >= mean)))
}

/// File name for an upload: `<hash>.<ext>`
pub fn hashed_file_name(bytes: &[u8]) -> Result<String> {
    let format = image::guess_format(bytes)
        .map_err(|e| Error::InvalidInput(format!("Unknown image format: {}", e)))?;
    let ext = extension(format)
        .ok_or_else(|| Error::InvalidInput(format!("Unsupported image format: {:?}", format)))?;
    let hash = average_hash(bytes)?;
    Ok(format!("{:016x}.{}", hash, ext))
}

/// Write an upload under `dir`, reusing an existing file with the same hash
///
/// Blocking; call from `spawn_blocking`.
pub fn store_image(dir: &Path, bytes: &[u8]) -> Result<StoredImage> {
    let file_name = hashed_file_name(bytes)?;
    let path: PathBuf = dir.join(&file_name);

    if path.exists() {
        debug!(file = %file_name, "Reusing uploaded image");
        return Ok(StoredImage {
            file_name,
            created: false,
        });
    }

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, bytes)?;
    info!(file = %file_name, size = bytes.len(), "Stored uploaded image");
    Ok(StoredImage {
        file_name,
        created: true,
    })
}
