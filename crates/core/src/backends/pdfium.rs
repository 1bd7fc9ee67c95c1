//! PDF page rasterization using pdfium (Google's PDF engine).
//!
//! Pages are rendered sequentially (a pdfium document is not thread-safe)
//! in batches sized to the encode pool. Each batch is PNG-encoded over the
//! rayon pool and dropped before the next one is rendered.

use super::{BackendKind, PageRasterizer};
use crate::config::RenderConfig;
use crate::error::{Result, SplitError};
use crate::preview::encode_png;
use async_trait::async_trait;
use image::RgbaImage;
use pdfium_render::prelude::*;
use rayon::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info};

/// Environment variable naming a directory that holds the pdfium library.
pub const PDFIUM_LIB_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

/// pdfium may only be bound once per process.
static PDFIUM: OnceLock<Arc<Pdfium>> = OnceLock::new();

/// Page rasterizer backed by an in-process pdfium binding.
pub struct PdfiumRasterizer {
    pdfium: Arc<Pdfium>,
    thread_pool: Arc<rayon::ThreadPool>,
    background_color: (u8, u8, u8),
}

impl std::fmt::Debug for PdfiumRasterizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PdfiumRasterizer")
            .field("threads", &self.thread_pool.current_num_threads())
            .field("background_color", &self.background_color)
            .finish()
    }
}

impl PdfiumRasterizer {
    /// Bind pdfium and build the encode pool.
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let pdfium = shared_pdfium(config.pdfium_library_path.as_deref())?;

        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.render_threads)
            .thread_name(|i| format!("pdfium-encode-{}", i))
            .build()
            .map_err(|e| {
                SplitError::InvalidConfig(format!("Failed to create thread pool: {}", e))
            })?;

        info!(
            "pdfium rasterizer initialized with {} threads",
            config.render_threads
        );

        Ok(Self {
            pdfium,
            thread_pool: Arc::new(thread_pool),
            background_color: config.background_color,
        })
    }

    /// Render one page and composite it over the background.
    fn render_page(&self, document: &PdfDocument, pdf: &Path, page_idx: usize, scale: f32) -> Result<RgbaImage> {
        let page = document
            .pages()
            .get(page_idx as u16)
            .map_err(|e| render_failed(pdf, format!("Failed to get page {}: {}", page_idx + 1, e)))?;

        let width = (page.width().value * scale) as u32;
        let height = (page.height().value * scale) as u32;

        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32)
            .rotate_if_landscape(PdfPageRenderRotation::None, false);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_failed(pdf, format!("Failed to render page {}: {}", page_idx + 1, e)))?;

        let image: RgbaImage = bitmap.as_image().into_rgba8();
        Ok(apply_background(image, self.background_color))
    }

    /// Encode and write a batch of rendered pages in parallel.
    fn write_batch(&self, first_page: usize, images: Vec<RgbaImage>, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let written: Vec<Result<PathBuf>> = self.thread_pool.install(|| {
            images
                .into_par_iter()
                .enumerate()
                .map(|(offset, image)| -> Result<PathBuf> {
                    let data = encode_png(&image)?;
                    let path = out_dir.join(format!("page-{:04}.png", first_page + offset + 1));
                    std::fs::write(&path, data)?;
                    Ok(path)
                })
                .collect()
        });
        written.into_iter().collect()
    }

    fn rasterize_blocking(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let start = Instant::now();
        let document = self
            .pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| render_failed(pdf, format!("Failed to load PDF: {}", e)))?;

        let page_count = document.pages().len() as usize;
        let scale = dpi as f32 / 72.0;
        let batch_size = self.thread_pool.current_num_threads();
        debug!(
            "Rendering {} pages from {:?} in batches of {}",
            page_count, pdf, batch_size
        );

        // At most one batch of decoded bitmaps is held at a time.
        let mut pages = Vec::with_capacity(page_count);
        for range in batch_ranges(page_count, batch_size) {
            let first_page = range.start;
            let images = range
                .map(|page_idx| self.render_page(&document, pdf, page_idx, scale))
                .collect::<Result<Vec<_>>>()?;
            pages.extend(self.write_batch(first_page, images, out_dir)?);
        }

        debug!("Rasterized {} pages in {:?}", pages.len(), start.elapsed());
        Ok(pages)
    }
}

fn render_failed(pdf: &Path, message: String) -> SplitError {
    SplitError::BackendFailed {
        backend: BackendKind::Pdfium,
        path: pdf.to_path_buf(),
        message,
    }
}

/// Split `0..page_count` into consecutive ranges of at most `batch_size`.
pub(crate) fn batch_ranges(page_count: usize, batch_size: usize) -> Vec<Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..page_count)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(page_count))
        .collect()
}

#[async_trait]
impl PageRasterizer for PdfiumRasterizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Pdfium
    }

    async fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let worker = Self {
            pdfium: Arc::clone(&self.pdfium),
            thread_pool: Arc::clone(&self.thread_pool),
            background_color: self.background_color,
        };
        let pdf = pdf.to_path_buf();
        let out_dir = out_dir.to_path_buf();

        tokio::task::spawn_blocking(move || worker.rasterize_blocking(&pdf, dpi, &out_dir))
            .await
            .map_err(|e| SplitError::BackendUnavailable {
                backend: BackendKind::Pdfium,
                message: format!("render task aborted: {}", e),
            })?
    }
}

/// Bind pdfium once per process.
///
/// Search order: the configured directory, `PDFIUM_DYNAMIC_LIB_PATH`, the
/// working directory, `/usr/lib`, `/usr/local/lib`, then the system loader.
fn shared_pdfium(configured: Option<&Path>) -> Result<Arc<Pdfium>> {
    if let Some(pdfium) = PDFIUM.get() {
        return Ok(Arc::clone(pdfium));
    }

    let mut dirs: Vec<String> = Vec::new();
    if let Some(dir) = configured {
        dirs.push(dir.to_string_lossy().into_owned());
    }
    if let Ok(dir) = std::env::var(PDFIUM_LIB_ENV) {
        dirs.push(dir);
    }
    dirs.extend(["./", "/usr/lib", "/usr/local/lib"].map(String::from));

    let mut last_error = String::from("no candidate locations");
    for dir in &dirs {
        match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir.as_str())) {
            Ok(bindings) => return Ok(install(Pdfium::new(bindings))),
            Err(e) => last_error = format!("{}: {}", dir, e),
        }
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(install(Pdfium::new(bindings))),
        Err(e) => Err(SplitError::BackendUnavailable {
            backend: BackendKind::Pdfium,
            message: format!("Failed to load pdfium library ({}; system: {})", last_error, e),
        }),
    }
}

fn install(pdfium: Pdfium) -> Arc<Pdfium> {
    Arc::clone(PDFIUM.get_or_init(|| Arc::new(pdfium)))
}

/// Composite transparent pixels over an opaque background.
pub(crate) fn apply_background(mut image: RgbaImage, background: (u8, u8, u8)) -> RgbaImage {
    let (r, g, b) = background;

    for pixel in image.pixels_mut() {
        let alpha = pixel[3] as f32 / 255.0;
        if alpha < 1.0 {
            let inv_alpha = 1.0 - alpha;
            pixel[0] = ((pixel[0] as f32 * alpha) + (r as f32 * inv_alpha)) as u8;
            pixel[1] = ((pixel[1] as f32 * alpha) + (g as f32 * inv_alpha)) as u8;
            pixel[2] = ((pixel[2] as f32 * alpha) + (b as f32 * inv_alpha)) as u8;
            pixel[3] = 255;
        }
    }

    image
}
