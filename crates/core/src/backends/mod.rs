//! Preview rendering backends.
//!
//! Rendering is split in two stages. A [`PdfConverter`] turns a presentation
//! into a PDF (LibreOffice, or PowerPoint/Keynote driven over AppleScript on
//! macOS), then a [`PageRasterizer`] turns the PDF into one PNG per page
//! (pdfium in-process, or poppler's `pdftoppm`). Detection checks each
//! backend once and keeps the usable ones in priority order.

pub mod applescript;
pub mod office;
pub mod pdfium;
pub mod poppler;

use crate::config::RenderConfig;
use crate::error::{Result, SplitError};
use async_process::Command;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

pub use applescript::AppleScriptConverter;
pub use office::LibreOfficeConverter;
pub use pdfium::PdfiumRasterizer;
pub use poppler::PopplerRasterizer;

/// A rendering capability, in fallback priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Microsoft PowerPoint via AppleScript.
    PowerPoint,
    /// Apple Keynote via AppleScript.
    Keynote,
    /// LibreOffice headless conversion.
    LibreOffice,
    /// In-process pdfium rasterization.
    Pdfium,
    /// poppler's `pdftoppm`.
    Poppler,
    /// Solid-color placeholder; always available.
    Placeholder,
}

impl BackendKind {
    /// Every backend that depends on something outside this crate.
    pub const EXTERNAL: &'static [BackendKind] = &[
        BackendKind::PowerPoint,
        BackendKind::Keynote,
        BackendKind::LibreOffice,
        BackendKind::Pdfium,
        BackendKind::Poppler,
    ];

    /// Display name.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::PowerPoint => "PowerPoint",
            BackendKind::Keynote => "Keynote",
            BackendKind::LibreOffice => "LibreOffice",
            BackendKind::Pdfium => "pdfium",
            BackendKind::Poppler => "poppler",
            BackendKind::Placeholder => "placeholder",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a slide's preview came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreviewSource {
    /// Cut from the whole-deck rendering.
    Bulk,
    /// Rendered from the slide's own fragment.
    PerSlide,
    /// Synthetic placeholder.
    Placeholder,
}

/// Converts a presentation file into a PDF.
#[async_trait]
pub trait PdfConverter: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Convert `input`, writing the PDF somewhere under `out_dir`.
    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Rasterizes every page of a PDF into PNG files.
#[async_trait]
pub trait PageRasterizer: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Render each page of `pdf` at `dpi` into `out_dir`, returning the PNG
    /// paths in page order.
    async fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>>;
}

/// Find usable PDF converters, highest priority first.
pub async fn detect_converters(config: &RenderConfig) -> Vec<Box<dyn PdfConverter>> {
    let mut found: Vec<Box<dyn PdfConverter>> = Vec::new();

    for app in [applescript::OfficeApp::PowerPoint, applescript::OfficeApp::Keynote] {
        if !config.is_enabled(app.kind()) {
            continue;
        }
        match AppleScriptConverter::detect(app, config.detect_timeout).await {
            Ok(converter) => found.push(Box::new(converter)),
            Err(e) => debug!("{}", e),
        }
    }

    if config.is_enabled(BackendKind::LibreOffice) {
        match LibreOfficeConverter::new(config) {
            Ok(converter) => found.push(Box::new(converter)),
            Err(e) => debug!("{}", e),
        }
    }

    found
}

/// Find usable page rasterizers, highest priority first.
pub async fn detect_rasterizers(config: &RenderConfig) -> Vec<Box<dyn PageRasterizer>> {
    let mut found: Vec<Box<dyn PageRasterizer>> = Vec::new();

    if config.is_enabled(BackendKind::Pdfium) {
        match PdfiumRasterizer::new(config) {
            Ok(rasterizer) => found.push(Box::new(rasterizer)),
            Err(e) => debug!("{}", e),
        }
    }

    if config.is_enabled(BackendKind::Poppler) {
        match PopplerRasterizer::detect(config.detect_timeout).await {
            Ok(rasterizer) => found.push(Box::new(rasterizer)),
            Err(e) => debug!("{}", e),
        }
    }

    info!(
        "Detected {} page rasterizer(s): {:?}",
        found.len(),
        found.iter().map(|r| r.kind()).collect::<Vec<_>>()
    );
    found
}

/// Run an external tool to completion, treating a non-zero exit as failure.
///
/// The child is killed if the returned future is dropped, so an enclosing
/// timeout cleans up after itself.
pub(crate) async fn run_tool(backend: BackendKind, mut cmd: Command, subject: &Path) -> Result<Output> {
    cmd.kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .map_err(|e| SplitError::BackendUnavailable {
            backend,
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = match stderr.trim() {
            "" => format!("exited with {}", output.status),
            text => text.to_string(),
        };
        return Err(SplitError::BackendFailed {
            backend,
            path: subject.to_path_buf(),
            message,
        });
    }

    Ok(output)
}

/// Whether a command finishes successfully within `limit`.
pub(crate) async fn responds(mut cmd: Command, limit: Duration) -> bool {
    cmd.kill_on_drop(true);
    matches!(timeout(limit, cmd.output()).await, Ok(Ok(output)) if output.status.success())
}

/// First file in `dir` with the given extension.
pub(crate) fn find_with_extension(dir: &Path, extension: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension))
        })
}
