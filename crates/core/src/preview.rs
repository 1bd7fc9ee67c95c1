//! Slide preview rendering with ordered backend fallback.
//!
//! Every preview goes through the same two stages: the first converter that
//! yields a PDF wins, then the first rasterizer that yields pages wins. Any
//! backend error, timeout or empty output just moves on to the next backend.
//! When nothing works the caller gets `None` and can fall back to
//! [`PreviewRenderer::placeholder`], which cannot fail for backend reasons.

use crate::backends::{
    self, BackendKind, PageRasterizer, PdfConverter, PreviewSource,
};
use crate::config::RenderConfig;
use crate::error::{Result, SplitError};
use image::imageops::FilterType;
use image::{Rgba, RgbaImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::{TempDir, TempPath};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// A preview image on disk together with where it came from.
#[derive(Debug)]
pub struct RenderedPreview {
    /// Temporary PNG, deleted when dropped.
    pub path: TempPath,
    /// Backend family that produced it.
    pub source: PreviewSource,
}

/// Renders slide previews using whatever backends were detected.
pub struct PreviewRenderer {
    config: RenderConfig,
    converters: Vec<Box<dyn PdfConverter>>,
    rasterizers: Vec<Box<dyn PageRasterizer>>,
    temp_root: PathBuf,
}

impl std::fmt::Debug for PreviewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRenderer")
            .field("backends", &self.backends())
            .field("temp_root", &self.temp_root)
            .finish()
    }
}

impl PreviewRenderer {
    /// Detect the backends available on this machine.
    pub async fn detect(config: RenderConfig) -> Result<Self> {
        config.validate()?;
        let converters = backends::detect_converters(&config).await;
        let rasterizers = backends::detect_rasterizers(&config).await;
        let renderer = Self::with_backends(config, converters, rasterizers)?;

        if renderer.can_render() {
            info!("Preview backends: {:?}", renderer.backends());
        } else {
            warn!("No complete rendering chain available; previews will be placeholders");
        }
        Ok(renderer)
    }

    /// Build a renderer around explicit backends.
    pub fn with_backends(
        config: RenderConfig,
        converters: Vec<Box<dyn PdfConverter>>,
        rasterizers: Vec<Box<dyn PageRasterizer>>,
    ) -> Result<Self> {
        config.validate()?;
        let temp_root = config.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&temp_root).map_err(|e| SplitError::OutputDirError {
            path: temp_root.clone(),
            message: e.to_string(),
        })?;

        Ok(Self {
            config,
            converters,
            rasterizers,
            temp_root,
        })
    }

    /// Renderer that only ever produces placeholders.
    pub fn placeholder_only(config: RenderConfig) -> Result<Self> {
        Self::with_backends(config, Vec::new(), Vec::new())
    }

    /// Render configuration.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Available backends in priority order, placeholder last.
    pub fn backends(&self) -> Vec<BackendKind> {
        self.converters
            .iter()
            .map(|c| c.kind())
            .chain(self.rasterizers.iter().map(|r| r.kind()))
            .chain(std::iter::once(BackendKind::Placeholder))
            .collect()
    }

    /// Whether at least one converter and one rasterizer are available.
    pub fn can_render(&self) -> bool {
        !self.converters.is_empty() && !self.rasterizers.is_empty()
    }

    /// Render every slide of `document` in one pass.
    ///
    /// Always returns exactly `slide_count` slots. Missing pages are `None`
    /// and surplus pages are discarded.
    pub async fn render_all_bulk(&self, document: &Path, slide_count: usize) -> Vec<Option<TempPath>> {
        if slide_count == 0 {
            return Vec::new();
        }
        match self.render_pages(document).await {
            Some(pages) => {
                if pages.len() != slide_count {
                    warn!(
                        "Bulk rendering produced {} pages for {} slides",
                        pages.len(),
                        slide_count
                    );
                }
                fit_to_len(pages, slide_count)
            }
            None => {
                debug!("Bulk rendering unavailable for {:?}", document);
                fit_to_len(Vec::new(), slide_count)
            }
        }
    }

    /// Render the first page of a single-slide fragment.
    pub async fn render_one(&self, fragment: &Path, ordinal: usize) -> Option<TempPath> {
        let preview = self.render_pages(fragment).await?.into_iter().next();
        if preview.is_none() {
            debug!("No page rendered for slide {}", ordinal);
        }
        preview
    }

    /// Render a fragment, falling back to a placeholder.
    pub async fn render_with_fallback(&self, fragment: &Path, ordinal: usize) -> Result<RenderedPreview> {
        if let Some(path) = self.render_one(fragment, ordinal).await {
            return Ok(RenderedPreview {
                path,
                source: PreviewSource::PerSlide,
            });
        }
        debug!("Using placeholder preview for slide {}", ordinal);
        Ok(RenderedPreview {
            path: self.placeholder(ordinal)?,
            source: PreviewSource::Placeholder,
        })
    }

    /// Solid-color square PNG standing in for a slide that could not be rendered.
    pub fn placeholder(&self, ordinal: usize) -> Result<TempPath> {
        let (r, g, b) = self.config.placeholder_color;
        let size = self.config.placeholder_size;
        let image = RgbaImage::from_pixel(size, size, Rgba([r, g, b, 255]));
        let data = encode_png(&image)?;

        let path = self.new_temp_file(&format!("slide-{}-placeholder-", ordinal))?;
        std::fs::write(&path, data)?;
        Ok(path)
    }

    /// Scale `preview` to `target_height` pixels, keeping the aspect ratio.
    ///
    /// A preview that cannot be decoded or scaled is copied unchanged.
    pub fn resize(&self, preview: &Path, target_height: u32) -> Result<TempPath> {
        let out = self.new_temp_file("slide-preview-resized-")?;
        match resize_to_height(preview, target_height) {
            Ok(data) => std::fs::write(&out, data)?,
            Err(e) => {
                warn!(
                    "Could not resize {:?} ({}); keeping original dimensions",
                    preview, e
                );
                std::fs::copy(preview, &out)?;
            }
        }
        Ok(out)
    }

    /// Delete a temporary preview now instead of on drop.
    pub fn release_temp(&self, path: TempPath) {
        let shown = path.to_path_buf();
        if let Err(e) = path.close() {
            warn!("Failed to remove temporary preview {:?}: {}", shown, e);
        }
    }

    async fn render_pages(&self, input: &Path) -> Option<Vec<TempPath>> {
        if !self.can_render() {
            return None;
        }

        let scratch = match tempfile::Builder::new()
            .prefix("slide-render-")
            .tempdir_in(&self.temp_root)
        {
            Ok(dir) => dir,
            Err(e) => {
                warn!("Cannot create render scratch directory: {}", e);
                return None;
            }
        };

        let pdf = self.convert_to_pdf(input, &scratch).await?;
        let pages = self.rasterize(&pdf, &scratch).await?;

        let mut persisted = Vec::with_capacity(pages.len());
        for page in &pages {
            match self.persist(page) {
                Ok(path) => persisted.push(path),
                Err(e) => {
                    warn!("Failed to keep rendered page {:?}: {}", page, e);
                    return None;
                }
            }
        }
        Some(persisted)
    }

    async fn convert_to_pdf(&self, input: &Path, scratch: &TempDir) -> Option<PathBuf> {
        for converter in &self.converters {
            let kind = converter.kind();
            let out_dir = scratch.path().join(format!("pdf-{}", kind.name()));
            if let Err(e) = std::fs::create_dir_all(&out_dir) {
                warn!("Cannot create {:?}: {}", out_dir, e);
                continue;
            }

            match timeout(self.config.backend_timeout, converter.convert(input, &out_dir)).await {
                Ok(Ok(pdf)) if pdf.is_file() => {
                    debug!("{} converted {:?}", kind, input.file_name());
                    return Some(pdf);
                }
                Ok(Ok(pdf)) => debug!("{} reported {:?} but wrote nothing", kind, pdf),
                Ok(Err(e)) => debug!("{}", e),
                Err(_) => warn!(
                    "{}",
                    SplitError::BackendTimeout {
                        backend: kind,
                        path: input.to_path_buf(),
                        timeout_secs: self.config.backend_timeout.as_secs(),
                    }
                ),
            }
        }
        None
    }

    async fn rasterize(&self, pdf: &Path, scratch: &TempDir) -> Option<Vec<PathBuf>> {
        for rasterizer in &self.rasterizers {
            let kind = rasterizer.kind();
            let out_dir = scratch.path().join(format!("png-{}", kind.name()));
            if let Err(e) = std::fs::create_dir_all(&out_dir) {
                warn!("Cannot create {:?}: {}", out_dir, e);
                continue;
            }

            let attempt = rasterizer.rasterize(pdf, self.config.dpi, &out_dir);
            match timeout(self.config.backend_timeout, attempt).await {
                Ok(Ok(pages)) if !pages.is_empty() => {
                    debug!("{} rasterized {} pages", kind, pages.len());
                    return Some(pages);
                }
                Ok(Ok(_)) => debug!("{} produced no pages for {:?}", kind, pdf),
                Ok(Err(e)) => debug!("{}", e),
                Err(_) => warn!(
                    "{}",
                    SplitError::BackendTimeout {
                        backend: kind,
                        path: pdf.to_path_buf(),
                        timeout_secs: self.config.backend_timeout.as_secs(),
                    }
                ),
            }
        }
        None
    }

    fn persist(&self, page: &Path) -> Result<TempPath> {
        let path = self.new_temp_file("slide-preview-")?;
        std::fs::copy(page, &path)?;
        Ok(path)
    }

    fn new_temp_file(&self, prefix: &str) -> Result<TempPath> {
        Ok(tempfile::Builder::new()
            .prefix(prefix)
            .suffix(".png")
            .tempfile_in(&self.temp_root)?
            .into_temp_path())
    }
}

/// Exactly `len` slots: items in order, padded with `None` or truncated.
pub(crate) fn fit_to_len<T>(items: Vec<T>, len: usize) -> Vec<Option<T>> {
    let mut slots: Vec<Option<T>> = items.into_iter().take(len).map(Some).collect();
    slots.resize_with(len, || None);
    slots
}

fn resize_to_height(path: &Path, target_height: u32) -> Result<Vec<u8>> {
    let image = image::open(path)?;
    if image.height() == 0 {
        return Err(SplitError::PngEncodingError("image has zero height".to_string()));
    }
    let ratio = target_height as f64 / image.height() as f64;
    let width = ((image.width() as f64 * ratio).round() as u32).max(1);
    let resized = image
        .resize_exact(width, target_height, FilterType::Lanczos3)
        .into_rgba8();
    encode_png(&resized)
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());

    let mut encoder = png::Encoder::new(&mut buffer, image.width(), image.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Fast);

    let mut writer = encoder.write_header().map_err(|e| {
        SplitError::PngEncodingError(format!("Failed to write PNG header: {}", e))
    })?;

    writer.write_image_data(image.as_raw()).map_err(|e| {
        SplitError::PngEncodingError(format!("Failed to write PNG data: {}", e))
    })?;

    drop(writer);

    Ok(buffer.into_inner())
}
