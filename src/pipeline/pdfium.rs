//! Pdfium binding shared by the extraction and rasterisation stages.
//!
//! `pdfium-render` wraps the pdfium C++ library through a dynamically
//! loaded shared object. Binding can fail on hosts without the library, so
//! every caller goes through [`bind`] and turns the failure into either a
//! fatal [`DocIdentError::PdfiumBindingFailed`] (at engine construction) or
//! an absent per-document result (inside a worker).

use crate::error::DocIdentError;
use pdfium_render::prelude::*;
use tracing::debug;

/// Environment variable naming an explicit pdfium library file.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Bind to a pdfium library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, the platform library name in the
/// working directory, then the system library search path.
pub fn bind() -> Result<Pdfium, DocIdentError> {
    if let Ok(path) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !path.is_empty() {
            debug!("Binding pdfium from {}={}", PDFIUM_LIB_PATH_ENV, path);
            let bindings = Pdfium::bind_to_library(&path).map_err(|e| {
                DocIdentError::PdfiumBindingFailed(format!("{path}: {e:?}"))
            })?;
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| DocIdentError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}
