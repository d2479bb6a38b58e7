use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

use crate::core::types::{Dimensions, PageImage};
use crate::utils::fingerprint::fingerprint;

/// Encoded images larger than this are downscaled before detection
pub const MAX_DETECTION_BYTES: usize = 20_000_000;

/// Run CPU-bound image work on the blocking pool
async fn run_blocking<T, F>(task: &'static str, work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .with_context(|| format!("Image {} task did not complete", task))?
}

/// Decode encoded image bytes off the async executor.
pub async fn load_image_from_memory_async(bytes: &[u8]) -> Result<DynamicImage> {
    let bytes = bytes.to_vec();
    run_blocking("decode", move || {
        image::load_from_memory(&bytes).context("Unsupported or corrupt image data")
    })
    .await
}

pub async fn encode_png_async(img: DynamicImage) -> Result<Vec<u8>> {
    run_blocking("encode", move || {
        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
            .context("PNG encoding failed")?;
        Ok(encoded)
    })
    .await
}

pub async fn resize_image_async(
    img: DynamicImage,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<DynamicImage> {
    run_blocking("resize", move || Ok(img.resize_exact(width, height, filter))).await
}

/// Integer downscale divisor for an encoded image of `encoded_len` bytes,
/// or `None` when it is small enough to send as is.
pub fn downscale_ratio(encoded_len: usize) -> Option<u32> {
    if encoded_len <= MAX_DETECTION_BYTES {
        return None;
    }
    Some((encoded_len / MAX_DETECTION_BYTES) as u32)
}

/// Read raw image bytes from a local path or an http(s) URL.
pub async fn fetch_image_bytes(source: &str, http: &reqwest::Client) -> Result<Vec<u8>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let response = http
            .get(source)
            .send()
            .await
            .with_context(|| format!("Failed to download {}", source))?
            .error_for_status()
            .with_context(|| format!("Download of {} failed", source))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", source))?;
        Ok(bytes.to_vec())
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("Failed to read image file {}", source))
    }
}

/// Build a [`PageImage`] from raw encoded bytes.
///
/// The fingerprint covers the original bytes; oversized images are
/// downscaled and re-encoded as PNG for detection.
pub async fn prepare_page_image(source: &str, raw_bytes: Vec<u8>) -> Result<PageImage> {
    let fingerprint = fingerprint(&raw_bytes);
    let img = load_image_from_memory_async(&raw_bytes)
        .await
        .with_context(|| format!("Image decode error for {}", source))?;

    let (width, height) = img.dimensions();
    debug!("Hash: {}", fingerprint);
    debug!("Image Dimensions: {}x{}", width, height);

    let (image_bytes, dimensions) = match downscale_ratio(raw_bytes.len()) {
        None => (raw_bytes, Dimensions { width, height }),
        Some(ratio) => {
            info!("Resizing Image");
            let new_width = (width / ratio).max(1);
            let new_height = (height / ratio).max(1);
            let resized =
                resize_image_async(img, new_width, new_height, FilterType::CatmullRom).await?;
            debug!("New image dimensions: {}x{}", new_width, new_height);
            (
                encode_png_async(resized).await?,
                Dimensions {
                    width: new_width,
                    height: new_height,
                },
            )
        }
    };

    Ok(PageImage {
        source: source.to_string(),
        fingerprint,
        image_bytes: Arc::new(image_bytes),
        dimensions,
    })
}

/// Fetch, fingerprint and decode one page image.
pub async fn open_page_image(source: &str, http: &reqwest::Client) -> Result<PageImage> {
    debug!("Getting image info for: {}", source);
    let raw_bytes = fetch_image_bytes(source, http).await?;
    prepare_page_image(source, raw_bytes).await
}
