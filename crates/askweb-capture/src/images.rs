//! Saving generated images to disk.
//!
//! Each image is first captured from the rendered page: the element is
//! scrolled into view, the viewport is screenshotted and the element's box is
//! cropped out. When that fails the image source is fetched directly, from
//! an inline `data:` URL or over HTTP with the page's cookies. A failure on
//! one image is recorded and the rest are still attempted.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine;
use image::ImageFormat;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::driver::{call_as, PageDriver};
use crate::script::IMAGE_BOX;
use crate::site::SiteProfile;
use crate::{Error, Result};

/// Where and how generated images are written.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub output_dir: PathBuf,
    pub prefix: String,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            prefix: "gemini_image".into(),
        }
    }
}

/// Outcome of saving every image a response produced.
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    pub saved: Vec<PathBuf>,
    pub failures: Vec<ImageFailure>,
}

/// An image that could not be written. `index` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFailure {
    pub index: usize,
    pub reason: String,
}

impl From<ImageFailure> for Error {
    fn from(f: ImageFailure) -> Self {
        Error::ImageSaveFailed {
            index: f.index,
            reason: f.reason,
        }
    }
}

/// Element box in CSS pixels, as reported by [`IMAGE_BOX`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct ElementBox {
    pub found: bool,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "one")]
    pub dpr: f64,
}

fn one() -> f64 {
    1.0
}

/// `{prefix}_{index}_{timestamp}.{ext}`
pub fn image_file_name(prefix: &str, index: usize, timestamp: i64, ext: &str) -> String {
    format!("{}_{}_{}.{}", prefix, index, timestamp, ext)
}

/// First free path for an image, adding `_2`, `_3`, ... on collision.
fn unique_path(dir: &Path, prefix: &str, index: usize, timestamp: i64, ext: &str) -> PathBuf {
    let first = dir.join(image_file_name(prefix, index, timestamp, ext));
    if !first.exists() {
        return first;
    }
    (2..)
        .map(|n| dir.join(format!("{}_{}_{}_{}.{}", prefix, index, timestamp, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Save every image in `sources` (page order) under `options.output_dir`.
pub(crate) async fn save_all<D>(
    page: &D,
    site: &SiteProfile,
    sources: &[String],
    options: &ImageOptions,
) -> Result<ImageBatch>
where
    D: PageDriver + ?Sized,
{
    std::fs::create_dir_all(&options.output_dir)?;
    let timestamp = chrono::Utc::now().timestamp();
    let mut batch = ImageBatch::default();

    for (i, src) in sources.iter().enumerate() {
        let index = i + 1;
        match capture_one(page, site, src).await {
            Ok((bytes, ext)) => {
                let path = unique_path(&options.output_dir, &options.prefix, index, timestamp, ext);
                match std::fs::write(&path, &bytes) {
                    Ok(()) => {
                        info!("Saved image {} to {}", index, path.display());
                        batch.saved.push(path);
                    }
                    Err(e) => {
                        warn!("Could not write image {}: {}", index, e);
                        batch.failures.push(ImageFailure {
                            index,
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                warn!("Could not capture image {}: {}", index, e);
                batch.failures.push(ImageFailure {
                    index,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(batch)
}

/// Encoded bytes and file extension for one image.
async fn capture_one<D>(page: &D, site: &SiteProfile, src: &str) -> Result<(Vec<u8>, &'static str)>
where
    D: PageDriver + ?Sized,
{
    match render_capture(page, site, src).await {
        Ok(png) => return Ok((png, "png")),
        Err(e) => debug!("Pixel capture failed, fetching source instead: {}", e),
    }
    fetch_source(page, src).await
}

async fn render_capture<D>(page: &D, site: &SiteProfile, src: &str) -> Result<Vec<u8>>
where
    D: PageDriver + ?Sized,
{
    let bbox: ElementBox = call_as(
        page,
        &IMAGE_BOX,
        json!({ "selectors": site.images, "src": src }),
    )
    .await?;
    if !bbox.found {
        return Err(Error::Unexpected("image element is no longer on the page".into()));
    }
    let shot = page.screenshot().await?;
    crop_png(&shot, &bbox)
}

/// Cut `bbox` out of a viewport screenshot and re-encode it as PNG.
pub(crate) fn crop_png(screenshot: &[u8], bbox: &ElementBox) -> Result<Vec<u8>> {
    let img = image::load_from_memory(screenshot)?;
    let scale = if bbox.dpr > 0.0 { bbox.dpr } else { 1.0 };
    let clamp = |v: f64, max: u32| -> u32 { (v * scale).round().clamp(0.0, max as f64) as u32 };

    let x0 = clamp(bbox.x, img.width());
    let y0 = clamp(bbox.y, img.height());
    let x1 = clamp(bbox.x + bbox.width, img.width());
    let y1 = clamp(bbox.y + bbox.height, img.height());
    if x1 <= x0 || y1 <= y0 {
        return Err(Error::Unexpected(format!(
            "image box {}x{} at ({}, {}) is outside the viewport",
            bbox.width, bbox.height, bbox.x, bbox.y
        )));
    }

    let cropped = img.crop_imm(x0, y0, x1 - x0, y1 - y0);
    let mut out = Cursor::new(Vec::new());
    cropped.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

async fn fetch_source<D>(page: &D, src: &str) -> Result<(Vec<u8>, &'static str)>
where
    D: PageDriver + ?Sized,
{
    if src.starts_with("data:") {
        return decode_data_url(src);
    }

    let url = url::Url::parse(src)
        .map_err(|e| Error::Unexpected(format!("invalid image source '{}': {}", src, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::Unexpected(format!(
            "unsupported image source scheme '{}'",
            url.scheme()
        )));
    }
    let host = url.host_str().unwrap_or_default().to_string();

    let cookie_header = page
        .cookies()
        .await?
        .into_iter()
        .filter(|c| c.applies_to(&host))
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");

    let mut request = reqwest::Client::new().get(url);
    if !cookie_header.is_empty() {
        request = request.header(reqwest::header::COOKIE, cookie_header);
    }
    let response = request.send().await?.error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let bytes = response.bytes().await?.to_vec();
    let ext = content_type
        .as_deref()
        .and_then(extension_for)
        .or_else(|| sniff_extension(&bytes))
        .unwrap_or("png");
    Ok((bytes, ext))
}

/// Decode a base64 `data:image/...` URL.
pub(crate) fn decode_data_url(src: &str) -> Result<(Vec<u8>, &'static str)> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| Error::Unexpected("not a data url".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::Unexpected("data url has no payload".into()))?;
    let Some(mime) = meta.strip_suffix(";base64") else {
        return Err(Error::Unexpected("data url is not base64 encoded".into()));
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Unexpected(format!("bad base64 in data url: {}", e)))?;
    let ext = extension_for(mime)
        .or_else(|| sniff_extension(&bytes))
        .unwrap_or("png");
    Ok((bytes, ext))
}

fn extension_for(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        _ => None,
    }
}

fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Png => Some("png"),
        ImageFormat::Jpeg => Some("jpg"),
        ImageFormat::WebP => Some("webp"),
        ImageFormat::Gif => Some("gif"),
        _ => None,
    }
}
