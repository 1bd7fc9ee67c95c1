//! # slide-bundle-core
//!
//! Split a presentation into an importable slide bundle.
//!
//! For every slide of a `.pptx` deck the library produces:
//!
//! - a **fragment**: a standalone single-slide presentation that keeps the
//!   slide's layout, master, theme and media
//! - a **preview**: a PNG scaled to a fixed height
//!
//! and packs them, together with an XML manifest naming each slide, into one
//! timestamped zip archive next to the input. Previews come from the best
//! backend available on the machine (PowerPoint or Keynote on macOS,
//! LibreOffice, then pdfium or poppler for rasterization) and degrade to a
//! solid placeholder, so an export never fails just because nothing can
//! render.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slide_bundle_core::{SplitRequest, Splitter, SplitterConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let splitter = Splitter::new(SplitterConfig::default()).await?;
//!
//!     let request = SplitRequest::new("quarterly.pptx").with_group_name("Q3 Review");
//!     let result = splitter.split(request).await?;
//!
//!     println!("{} slides -> {:?}", result.slide_count, result.archive_path);
//!     Ok(())
//! }
//! ```
//!
//! ## Progress Reporting
//!
//! ```rust,no_run
//! use slide_bundle_core::{SplitProgress, SplitRequest, Splitter, SplitterConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let splitter = Splitter::new(SplitterConfig::default().slide_workers(2)).await?;
//!
//!     let result = splitter
//!         .split_with_progress(SplitRequest::new("deck.pptx"), |p: SplitProgress| {
//!             println!("[{}/{}] {} {}", p.current, p.total, p.stage.tag(), p.label);
//!         })
//!         .await?;
//!
//!     println!("{} placeholder previews", result.placeholder_count());
//!     Ok(())
//! }
//! ```

pub mod archive;
pub mod backends;
pub mod config;
pub mod error;
pub mod fragment;
pub mod identity;
pub mod manifest;
pub mod package;
pub mod preview;
pub mod splitter;

// Re-export main types for convenience
pub use archive::{ArchiveBuilder, ArchiveSummary};
pub use backends::{BackendKind, PageRasterizer, PdfConverter, PreviewSource};
pub use config::{
    CleanupReport, OutputConfig, RenderConfig, SplitProgress, SplitRequest, SplitResult,
    SplitStage, SplitterConfig,
};
pub use error::{ErrorKind, Result, SplitError};
pub use fragment::FragmentExtractor;
pub use manifest::{Manifest, ManifestEntry, Validation};
pub use package::{Package, Presentation, Shape, Slide};
pub use preview::{PreviewRenderer, RenderedPreview};
pub use splitter::Splitter;

/// Supported presentation file extensions.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pptx"];

/// Check if a file extension is supported.
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|&e| e.eq_ignore_ascii_case(ext))
}

/// Initialize the library's logging.
/// Call this once at application startup if you want to see logs.
pub fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();
}
