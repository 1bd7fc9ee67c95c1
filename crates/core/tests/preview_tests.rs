//! Integration tests for preview rendering and backend fallback.
//!
//! Backends are replaced by in-process fakes so every fallback path runs
//! without LibreOffice, pdfium or poppler installed.
//!
//! Run with: cargo test --package slide-bundle-core --test preview_tests

mod common;

use async_trait::async_trait;
use image::{Rgba, RgbaImage};
use slide_bundle_core::{
    preview::encode_png, BackendKind, PageRasterizer, PdfConverter, PreviewRenderer,
    PreviewSource, RenderConfig, Result, SplitError,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Fakes
// ============================================================================

/// Converter that writes a dummy PDF and counts calls.
pub struct FakeConverter {
    kind: BackendKind,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl PdfConverter for FakeConverter {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pdf = out_dir.join("out.pdf");
        std::fs::write(&pdf, format!("%PDF fake for {}", input.display()))?;
        Ok(pdf)
    }
}

/// Converter that always fails.
pub struct BrokenConverter;

#[async_trait]
impl PdfConverter for BrokenConverter {
    fn kind(&self) -> BackendKind {
        BackendKind::PowerPoint
    }

    async fn convert(&self, input: &Path, _out_dir: &Path) -> Result<PathBuf> {
        Err(SplitError::BackendFailed {
            backend: BackendKind::PowerPoint,
            path: input.to_path_buf(),
            message: "application crashed".to_string(),
        })
    }
}

/// Converter that never finishes in time.
pub struct HangingConverter;

#[async_trait]
impl PdfConverter for HangingConverter {
    fn kind(&self) -> BackendKind {
        BackendKind::Keynote
    }

    async fn convert(&self, _input: &Path, _out_dir: &Path) -> Result<PathBuf> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("the renderer timeout fires first")
    }
}

/// Rasterizer producing `pages` solid PNGs of `width` x `height`.
pub struct FakeRasterizer {
    pub pages: usize,
    pub width: u32,
    pub height: u32,
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Poppler
    }

    async fn rasterize(&self, _pdf: &Path, _dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        (0..self.pages)
            .map(|i| -> Result<PathBuf> {
                let shade = (i * 40 % 256) as u8;
                let image = RgbaImage::from_pixel(self.width, self.height, Rgba([shade, 0, 0, 255]));
                let path = out_dir.join(format!("page-{}.png", i + 1));
                std::fs::write(&path, encode_png(&image)?)?;
                Ok(path)
            })
            .collect()
    }
}

/// Rasterizer that reports success with no pages.
pub struct EmptyRasterizer;

#[async_trait]
impl PageRasterizer for EmptyRasterizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Pdfium
    }

    async fn rasterize(&self, _pdf: &Path, _dpi: u32, _out_dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

fn config(dir: &TempDir) -> RenderConfig {
    RenderConfig::default()
        .temp_dir(dir.path().to_path_buf())
        .backend_timeout(Duration::from_millis(200))
}

fn working(calls: &Arc<AtomicUsize>) -> Box<dyn PdfConverter> {
    Box::new(FakeConverter {
        kind: BackendKind::LibreOffice,
        calls: Arc::clone(calls),
    })
}

fn pages(n: usize) -> Box<dyn PageRasterizer> {
    Box::new(FakeRasterizer {
        pages: n,
        width: 160,
        height: 90,
    })
}

fn dimensions(path: &Path) -> (u32, u32) {
    let image = image::open(path).unwrap();
    (image.width(), image.height())
}

// ============================================================================
// Bulk rendering
// ============================================================================

#[tokio::test]
async fn test_bulk_matches_slide_count() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(3)]).unwrap();

    let previews = renderer.render_all_bulk(Path::new("deck.pptx"), 3).await;
    assert_eq!(previews.len(), 3);
    assert!(previews.iter().all(Option::is_some));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let first = previews[0].as_ref().unwrap();
    assert_eq!(dimensions(first), (160, 90));
}

#[tokio::test]
async fn test_bulk_pads_missing_pages() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(2)]).unwrap();

    let previews = renderer.render_all_bulk(Path::new("deck.pptx"), 4).await;
    let present: Vec<bool> = previews.iter().map(Option::is_some).collect();
    assert_eq!(present, vec![true, true, false, false]);
}

#[tokio::test]
async fn test_bulk_truncates_surplus_pages() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(5)]).unwrap();

    let previews = renderer.render_all_bulk(Path::new("deck.pptx"), 2).await;
    assert_eq!(previews.len(), 2);
    assert!(previews.iter().all(Option::is_some));
}

#[tokio::test]
async fn test_bulk_zero_slides_skips_backends() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(1)]).unwrap();

    assert!(renderer.render_all_bulk(Path::new("deck.pptx"), 0).await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bulk_without_rasterizer_is_all_none() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], Vec::new()).unwrap();

    let previews = renderer.render_all_bulk(Path::new("deck.pptx"), 3).await;
    assert_eq!(previews.len(), 3);
    assert!(previews.iter().all(Option::is_none));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Fallback order
// ============================================================================

#[tokio::test]
async fn test_failed_converter_falls_through_to_next() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = PreviewRenderer::with_backends(
        config(&dir),
        vec![Box::new(BrokenConverter), working(&calls)],
        vec![pages(1)],
    )
    .unwrap();

    let preview = renderer.render_one(Path::new("fragment.pptx"), 1).await;
    assert!(preview.is_some());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timed_out_converter_falls_through_to_next() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = PreviewRenderer::with_backends(
        config(&dir),
        vec![Box::new(HangingConverter), working(&calls)],
        vec![pages(1)],
    )
    .unwrap();

    let preview = renderer
        .render_with_fallback(Path::new("fragment.pptx"), 1)
        .await
        .unwrap();
    assert_eq!(preview.source, PreviewSource::PerSlide);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_rasterizer_falls_through_to_next() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = PreviewRenderer::with_backends(
        config(&dir),
        vec![working(&calls)],
        vec![Box::new(EmptyRasterizer), pages(1)],
    )
    .unwrap();

    assert!(renderer.render_one(Path::new("fragment.pptx"), 1).await.is_some());
}

#[tokio::test]
async fn test_everything_failing_yields_placeholder() {
    let dir = TempDir::new().unwrap();
    let renderer = PreviewRenderer::with_backends(
        config(&dir),
        vec![Box::new(BrokenConverter)],
        vec![Box::new(EmptyRasterizer)],
    )
    .unwrap();

    assert!(renderer.render_one(Path::new("fragment.pptx"), 2).await.is_none());

    let preview = renderer
        .render_with_fallback(Path::new("fragment.pptx"), 2)
        .await
        .unwrap();
    assert_eq!(preview.source, PreviewSource::Placeholder);
    assert_eq!(dimensions(&preview.path), (120, 120));
}

#[tokio::test]
async fn test_backends_listed_in_priority_order() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer = PreviewRenderer::with_backends(
        config(&dir),
        vec![Box::new(BrokenConverter), working(&calls)],
        vec![Box::new(EmptyRasterizer), pages(1)],
    )
    .unwrap();

    assert_eq!(
        renderer.backends(),
        vec![
            BackendKind::PowerPoint,
            BackendKind::LibreOffice,
            BackendKind::Pdfium,
            BackendKind::Poppler,
            BackendKind::Placeholder,
        ]
    );
}

// ============================================================================
// Temporary files
// ============================================================================

#[tokio::test]
async fn test_scratch_files_do_not_outlive_previews() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(3)]).unwrap();

    let previews = renderer.render_all_bulk(Path::new("deck.pptx"), 3).await;
    // Only the three persisted previews remain; the render scratch directory is gone.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);

    for preview in previews.into_iter().flatten() {
        renderer.release_temp(preview);
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_resize_bulk_preview_to_thumbnail_height() {
    let dir = TempDir::new().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let renderer =
        PreviewRenderer::with_backends(config(&dir), vec![working(&calls)], vec![pages(1)]).unwrap();

    let preview = renderer.render_one(Path::new("fragment.pptx"), 1).await.unwrap();
    let resized = renderer.resize(&preview, 300).unwrap();
    assert_eq!(dimensions(&resized), (533, 300));
}

#[tokio::test]
async fn test_detect_with_everything_disabled() {
    let dir = TempDir::new().unwrap();
    let renderer = PreviewRenderer::detect(
        RenderConfig::placeholder_only().temp_dir(dir.path().to_path_buf()),
    )
    .await
    .unwrap();
    assert_eq!(renderer.backends(), vec![BackendKind::Placeholder]);
}
