//! Configuration types for slide bundle export.

use crate::backends::{BackendKind, PreviewSource};
use crate::manifest::Manifest;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for preview rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Rasterization DPI for the intermediate PDF.
    /// Default: 300.
    pub dpi: u32,

    /// Height in pixels of the preview stored in the archive.
    /// Default: 300.
    pub thumbnail_height: u32,

    /// Timeout for a single backend invocation.
    /// Default: 60 seconds.
    pub backend_timeout: Duration,

    /// Timeout for availability checks run during detection.
    /// Default: 5 seconds.
    pub detect_timeout: Duration,

    /// Number of threads for parallel PNG encoding.
    /// Default: number of CPU cores.
    pub render_threads: usize,

    /// Edge length of the synthetic placeholder preview.
    /// Default: 120.
    pub placeholder_size: u32,

    /// Fill color of the placeholder preview.
    pub placeholder_color: (u8, u8, u8),

    /// Background color composited under transparent page areas.
    /// Default: white (255, 255, 255).
    pub background_color: (u8, u8, u8),

    /// Directory for temporary previews and intermediate PDFs.
    /// Default: system temp directory.
    pub temp_dir: Option<PathBuf>,

    /// Path to soffice binary. If None, searches common locations and PATH.
    pub soffice_path: Option<PathBuf>,

    /// Directory holding the pdfium shared library. If None, searches
    /// `PDFIUM_DYNAMIC_LIB_PATH`, the working directory and system paths.
    pub pdfium_library_path: Option<PathBuf>,

    /// Backends skipped during detection.
    pub disabled_backends: Vec<BackendKind>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: 300,
            thumbnail_height: 300,
            backend_timeout: Duration::from_secs(60),
            detect_timeout: Duration::from_secs(5),
            render_threads: num_cpus::get(),
            placeholder_size: 120,
            placeholder_color: (46, 134, 193),
            background_color: (255, 255, 255),
            temp_dir: None,
            soffice_path: None,
            pdfium_library_path: None,
            disabled_backends: Vec::new(),
        }
    }
}

impl RenderConfig {
    /// Create a render config with specified DPI.
    pub fn with_dpi(dpi: u32) -> Self {
        Self {
            dpi,
            ..Default::default()
        }
    }

    /// Configuration with every external backend disabled, so every preview
    /// is a placeholder.
    pub fn placeholder_only() -> Self {
        Self {
            disabled_backends: BackendKind::EXTERNAL.to_vec(),
            ..Default::default()
        }
    }

    /// Set the stored preview height.
    pub fn thumbnail_height(mut self, height: u32) -> Self {
        self.thumbnail_height = height;
        self
    }

    /// Set the per-invocation backend timeout.
    pub fn backend_timeout(mut self, timeout: Duration) -> Self {
        self.backend_timeout = timeout;
        self
    }

    /// Set the number of encode threads.
    pub fn render_threads(mut self, threads: usize) -> Self {
        self.render_threads = threads;
        self
    }

    /// Set the temporary directory.
    pub fn temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }

    /// Set the soffice binary path.
    pub fn soffice_path(mut self, path: PathBuf) -> Self {
        self.soffice_path = Some(path);
        self
    }

    /// Skip a backend during detection.
    pub fn disable(mut self, backend: BackendKind) -> Self {
        if !self.disabled_backends.contains(&backend) {
            self.disabled_backends.push(backend);
        }
        self
    }

    /// Whether detection should consider this backend.
    pub fn is_enabled(&self, backend: BackendKind) -> bool {
        !self.disabled_backends.contains(&backend)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.dpi == 0 || self.dpi > 1200 {
            return Err(crate::error::SplitError::InvalidConfig(
                "dpi must be between 1 and 1200".to_string(),
            ));
        }
        if self.thumbnail_height == 0 {
            return Err(crate::error::SplitError::InvalidConfig(
                "thumbnail_height must be at least 1".to_string(),
            ));
        }
        if self.backend_timeout.is_zero() || self.detect_timeout.is_zero() {
            return Err(crate::error::SplitError::InvalidConfig(
                "backend timeouts must be greater than 0".to_string(),
            ));
        }
        if self.render_threads == 0 {
            return Err(crate::error::SplitError::InvalidConfig(
                "render_threads must be at least 1".to_string(),
            ));
        }
        if self.placeholder_size == 0 {
            return Err(crate::error::SplitError::InvalidConfig(
                "placeholder_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Naming and packaging conventions for the exported bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// File name of the manifest inside the archive.
    pub manifest_filename: String,

    /// Prefix of the working directory created when none is supplied.
    pub temp_prefix: String,

    /// chrono format string for the archive timestamp.
    pub timestamp_format: String,

    /// Extension of per-slide fragment files.
    pub fragment_extension: String,

    /// Extension of per-slide preview files.
    pub preview_extension: String,

    /// Deflate level for archive entries (0-9).
    pub compression_level: u8,

    /// Shapes with text shorter than this are taken as a slide title.
    pub title_max_chars: usize,

    /// Display names longer than this are truncated with an ellipsis.
    pub display_name_max_chars: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            manifest_filename: "MyElements.xml".to_string(),
            temp_prefix: "pptx_split_".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
            fragment_extension: "pptx".to_string(),
            preview_extension: "png".to_string(),
            compression_level: 6,
            title_max_chars: 100,
            display_name_max_chars: 50,
        }
    }
}

impl OutputConfig {
    /// Set the archive compression level.
    pub fn compression_level(mut self, level: u8) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// Set the manifest file name.
    pub fn manifest_filename(mut self, name: impl Into<String>) -> Self {
        self.manifest_filename = name.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.manifest_filename.trim().is_empty() {
            return Err(crate::error::SplitError::InvalidConfig(
                "manifest_filename must not be empty".to_string(),
            ));
        }
        if self.fragment_extension.is_empty() || self.preview_extension.is_empty() {
            return Err(crate::error::SplitError::InvalidConfig(
                "fragment and preview extensions must not be empty".to_string(),
            ));
        }
        if self.fragment_extension == self.preview_extension {
            return Err(crate::error::SplitError::InvalidConfig(
                "fragment and preview extensions must differ".to_string(),
            ));
        }
        if self.timestamp_format.is_empty()
            || StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error))
        {
            return Err(crate::error::SplitError::InvalidConfig(format!(
                "invalid timestamp_format '{}'",
                self.timestamp_format
            )));
        }
        // "..." must fit inside the limit.
        if self.display_name_max_chars < 4 {
            return Err(crate::error::SplitError::InvalidConfig(
                "display_name_max_chars must be at least 4".to_string(),
            ));
        }
        Ok(())
    }
}

/// Combined configuration for the splitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Render configuration.
    pub render: RenderConfig,

    /// Output configuration.
    pub output: OutputConfig,

    /// Number of slides processed concurrently.
    /// Default: 1.
    #[serde(default = "default_slide_workers")]
    pub slide_workers: usize,
}

fn default_slide_workers() -> usize {
    1
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl SplitterConfig {
    /// Create a splitter config around a render config.
    pub fn new(render: RenderConfig) -> Self {
        Self {
            render,
            output: OutputConfig::default(),
            slide_workers: default_slide_workers(),
        }
    }

    /// Set the number of concurrently processed slides.
    pub fn slide_workers(mut self, workers: usize) -> Self {
        self.slide_workers = workers;
        self
    }

    /// Validate the entire configuration.
    pub fn validate(&self) -> crate::error::Result<()> {
        self.render.validate()?;
        self.output.validate()?;
        if self.slide_workers == 0 {
            return Err(crate::error::SplitError::InvalidConfig(
                "slide_workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single export request.
#[derive(Debug, Clone)]
pub struct SplitRequest {
    /// Path to the input presentation.
    pub input_path: PathBuf,

    /// Working directory for intermediate files.
    /// Default: a fresh temporary directory removed after the run.
    pub work_dir: Option<PathBuf>,

    /// Group name written to the manifest.
    /// Default: input filename without extension.
    pub group_name: Option<String>,

    /// Base name of the archive.
    /// Default: input filename without extension.
    pub base_name: Option<String>,
}

impl SplitRequest {
    /// Create a new export request.
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            work_dir: None,
            group_name: None,
            base_name: None,
        }
    }

    /// Use a caller-owned working directory.
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set the manifest group name.
    pub fn with_group_name(mut self, name: impl Into<String>) -> Self {
        self.group_name = Some(name.into());
        self
    }

    /// Set the archive base name.
    pub fn with_base_name(mut self, name: impl Into<String>) -> Self {
        self.base_name = Some(name.into());
        self
    }

    fn input_stem(&self) -> String {
        self.input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("presentation")
            .to_string()
    }

    /// Get the group name, defaulting to the input filename.
    pub fn get_group_name(&self) -> String {
        self.group_name.clone().unwrap_or_else(|| self.input_stem())
    }

    /// Get the archive base name, defaulting to the input filename.
    pub fn get_base_name(&self) -> String {
        self.base_name.clone().unwrap_or_else(|| self.input_stem())
    }
}

/// Progress information for an export run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitProgress {
    /// Current unit (slide ordinal, then `slides + 1` and `slides + 2`).
    pub current: usize,

    /// Total units: slide count plus manifest and archive.
    pub total: usize,

    /// Slide display name or phase label.
    pub label: String,

    /// Current stage of processing.
    pub stage: SplitStage,
}

/// Stage of the export pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitStage {
    /// Writing the single-slide fragment.
    CreatingFragment,
    /// Rendering or resizing the preview.
    CreatingPreview,
    /// All artifacts of a slide are on disk.
    SlideCompleted,
    /// Writing the manifest.
    WritingManifest,
    /// Writing the archive.
    Archiving,
    /// Archive sealed and intermediates removed.
    Complete,
}

impl SplitStage {
    /// Stable phase tag reported to progress sinks.
    pub fn tag(&self) -> &'static str {
        match self {
            SplitStage::CreatingFragment => "creating_pptx",
            SplitStage::CreatingPreview => "creating_thumbnail",
            SplitStage::SlideCompleted => "completed",
            SplitStage::WritingManifest => "creating_xml",
            SplitStage::Archiving => "creating_zip",
            SplitStage::Complete => "export_complete",
        }
    }
}

/// Outcome of intermediate-file cleanup after archiving.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Generated files deleted.
    pub removed_files: usize,

    /// Unrelated files left in a caller-supplied directory.
    pub remaining_files: usize,

    /// Whether the working directory itself is gone.
    pub directory_removed: bool,
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct SplitResult {
    /// Path of the sealed archive.
    pub archive_path: PathBuf,

    /// Number of slides exported.
    pub slide_count: usize,

    /// Number of files stored in the archive.
    pub archived_files: usize,

    /// Archive size in bytes.
    pub archive_size_bytes: u64,

    /// Manifest written into the archive.
    pub manifest: Manifest,

    /// Where each slide's preview came from, in ordinal order.
    pub preview_sources: Vec<PreviewSource>,

    /// Intermediate cleanup outcome.
    pub cleanup: CleanupReport,

    /// Total processing time.
    pub duration: Duration,
}

impl SplitResult {
    /// Number of slides that ended up with a placeholder preview.
    pub fn placeholder_count(&self) -> usize {
        self.preview_sources
            .iter()
            .filter(|s| **s == PreviewSource::Placeholder)
            .count()
    }
}
