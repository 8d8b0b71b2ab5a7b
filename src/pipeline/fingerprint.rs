//! Visual fingerprints: first-page raster → three perceptual hashes.
//!
//! ## Why a PNG round-trip?
//!
//! pdfium-render hands back an `image` 0.25 raster while `img_hash` is built
//! on `image` 0.23. The raster crosses between the two as a PNG file inside a
//! private [`TempDir`] and is decoded with the 0.23 crate (`image023`, built
//! with its PNG decoder). The directory is removed when it drops, on success,
//! on error and on unwind alike.
//!
//! ## Hash kinds
//!
//! | Kind    | img_hash configuration            | Captures                    |
//! |---------|-----------------------------------|-----------------------------|
//! | `phash` | `HashAlg::Mean` + DCT preprocess  | low-frequency structure     |
//! | `dhash` | `HashAlg::Gradient`               | horizontal edge directions  |
//! | `ahash` | `HashAlg::Mean`                   | block brightness layout     |
//!
//! Each runs on a `hash_size × hash_size` grid and is encoded as lowercase
//! hex, so a 16×16 grid yields 64 hex characters per hash.

use crate::config::EngineConfig;
use crate::output::VisualFingerprint;
use crate::pipeline::pdfium;
use image::DynamicImage;
use img_hash::{HashAlg, HasherConfig};
use pdfium_render::prelude::*;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, warn};

/// File name of the raster inside the scoped workspace.
const RASTER_FILE: &str = "page-1.png";

/// Computes the visual fingerprint set of a document.
///
/// Returns `None` when the document cannot be rendered; absence is a
/// distinct outcome, never a placeholder hash.
pub trait VisualFingerprinter: Send + Sync {
    fn fingerprint(&self, bytes: &[u8], password: Option<&str>) -> Option<VisualFingerprint>;
}

/// Renders page 1 with pdfium and hashes it with `img_hash`.
#[derive(Debug, Clone, Copy)]
pub struct PdfiumFingerprinter {
    max_pixels: u32,
    hash_size: u32,
}

impl PdfiumFingerprinter {
    pub fn new(max_pixels: u32, hash_size: u32) -> Self {
        Self {
            max_pixels,
            hash_size,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.raster_max_pixels, config.hash_size)
    }
}

impl VisualFingerprinter for PdfiumFingerprinter {
    fn fingerprint(&self, bytes: &[u8], password: Option<&str>) -> Option<VisualFingerprint> {
        let raster = match render_first_page(bytes, password, self.max_pixels) {
            Ok(img) => img,
            Err(detail) => {
                debug!("First page not rendered: {}", detail);
                return None;
            }
        };
        fingerprint_image(&raster, self.hash_size)
    }
}

/// Rasterise the first page, longest edge bounded by `max_pixels`.
fn render_first_page(
    bytes: &[u8],
    password: Option<&str>,
    max_pixels: u32,
) -> Result<DynamicImage, String> {
    let pdfium = pdfium::bind().map_err(|e| e.to_string())?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, password)
        .map_err(|e| format!("{:?}", e))?;

    let pages = document.pages();
    if pages.len() == 0 {
        return Err("document has no pages".into());
    }
    let page = pages.get(0).map_err(|e| format!("{:?}", e))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| format!("{:?}", e))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    Ok(image)
}

/// Hash an in-memory raster through a scoped temporary workspace.
pub fn fingerprint_image(raster: &DynamicImage, hash_size: u32) -> Option<VisualFingerprint> {
    let workspace = match TempDir::new() {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Raster workspace unavailable: {}", e);
            return None;
        }
    };
    fingerprint_in(workspace, raster, hash_size)
}

/// Like [`fingerprint_image`], with the workspace created under `parent`.
pub fn fingerprint_image_in(
    parent: &Path,
    raster: &DynamicImage,
    hash_size: u32,
) -> Option<VisualFingerprint> {
    let workspace = match TempDir::new_in(parent) {
        Ok(dir) => dir,
        Err(e) => {
            warn!("Raster workspace unavailable under {}: {}", parent.display(), e);
            return None;
        }
    };
    fingerprint_in(workspace, raster, hash_size)
}

fn fingerprint_in(
    workspace: TempDir,
    raster: &DynamicImage,
    hash_size: u32,
) -> Option<VisualFingerprint> {
    let png = workspace.path().join(RASTER_FILE);
    if let Err(e) = raster.save_with_format(&png, image::ImageFormat::Png) {
        warn!("Raster write failed: {}", e);
        return None;
    }
    hash_raster(&png, hash_size)
    // `workspace` drops here, removing the PNG.
}

/// Compute the three perceptual hashes of an image file.
pub fn hash_raster(path: &Path, hash_size: u32) -> Option<VisualFingerprint> {
    match image023::open(path) {
        Ok(img) => Some(hash_image(&img, hash_size)),
        Err(e) => {
            debug!("Raster {} unreadable: {}", path.display(), e);
            None
        }
    }
}

/// Compute the three perceptual hashes of a decoded image.
pub fn hash_image(img: &image023::DynamicImage, hash_size: u32) -> VisualFingerprint {
    let phash = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(hash_size, hash_size)
        .preproc_dct()
        .to_hasher();
    let dhash = HasherConfig::new()
        .hash_alg(HashAlg::Gradient)
        .hash_size(hash_size, hash_size)
        .to_hasher();
    let ahash = HasherConfig::new()
        .hash_alg(HashAlg::Mean)
        .hash_size(hash_size, hash_size)
        .to_hasher();

    VisualFingerprint {
        phash: hex::encode(phash.hash_image(img).as_bytes()),
        dhash: hex::encode(dhash.hash_image(img).as_bytes()),
        ahash: hex::encode(ahash.hash_image(img).as_bytes()),
    }
}
