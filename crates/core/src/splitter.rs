//! Export orchestrator tying together fragments, previews, manifest and archive.
//!
//! One [`Splitter::split`] call turns a presentation into a single archive
//! holding a fragment and a preview per slide plus the manifest. Either the
//! whole archive is produced or nothing is: a failed run leaves no archive
//! behind and removes everything it generated.

use crate::archive::{self, ArchiveBuilder};
use crate::backends::{BackendKind, PreviewSource};
use crate::config::{
    CleanupReport, SplitProgress, SplitRequest, SplitResult, SplitStage, SplitterConfig,
};
use crate::error::{Result, SplitError};
use crate::fragment::FragmentExtractor;
use crate::identity;
use crate::manifest::{Manifest, ManifestEntry};
use crate::package::{Presentation, Slide};
use crate::preview::PreviewRenderer;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;
use tempfile::{TempDir, TempPath};
use tracing::{debug, info, warn};

/// Splits presentations into importable slide bundles.
pub struct Splitter {
    config: SplitterConfig,
    renderer: PreviewRenderer,
    extractor: FragmentExtractor,
    archiver: ArchiveBuilder,
}

impl std::fmt::Debug for Splitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Splitter")
            .field("config", &self.config)
            .field("renderer", &self.renderer)
            .finish()
    }
}

/// Files produced for one slide.
struct SlideArtifacts {
    fragment_path: PathBuf,
    preview_path: PathBuf,
    entry: ManifestEntry,
    source: PreviewSource,
}

impl Splitter {
    /// Create a splitter, detecting the rendering backends on this machine.
    pub async fn new(config: SplitterConfig) -> Result<Self> {
        config.validate()?;

        info!(
            "Initializing splitter with dpi={}, thumbnail_height={}, slide_workers={}",
            config.render.dpi, config.render.thumbnail_height, config.slide_workers
        );

        let renderer = PreviewRenderer::detect(config.render.clone()).await?;
        Self::with_renderer(config, renderer)
    }

    /// Create a splitter around an existing renderer.
    pub fn with_renderer(config: SplitterConfig, renderer: PreviewRenderer) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            extractor: FragmentExtractor::new(&config.output),
            archiver: ArchiveBuilder::new(config.output.compression_level),
            renderer,
            config,
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// Preview backends in priority order.
    pub fn backends(&self) -> Vec<BackendKind> {
        self.renderer.backends()
    }

    /// Export a presentation.
    pub async fn split(&self, request: SplitRequest) -> Result<SplitResult> {
        self.split_with_progress(request, |_| {}).await
    }

    /// Export a presentation, reporting progress.
    ///
    /// Per slide the callback sees `creating_pptx`, `creating_thumbnail` and
    /// `completed` with `current` equal to the ordinal, then `creating_xml`
    /// at `slides + 1`, `creating_zip` and `export_complete` at `slides + 2`.
    pub async fn split_with_progress<F>(&self, request: SplitRequest, progress: F) -> Result<SplitResult>
    where
        F: Fn(SplitProgress) + Send + Sync,
    {
        let start = Instant::now();
        let input = request.input_path.clone();

        validate_input(&input)?;
        let presentation = Presentation::open(&input)?;
        let slide_count = presentation.slide_count();
        if slide_count == 0 {
            return Err(SplitError::InvalidPackage {
                path: input,
                message: "presentation contains no slides".to_string(),
            });
        }

        info!("Splitting {:?} ({} slides)", input, slide_count);

        let work_dir = WorkDir::create(&request, &self.config)?;
        let manifest_path = work_dir.claim(&self.config.output.manifest_filename)?;
        let group_name = request.get_group_name();
        let total = slide_count + 2;

        debug!("Rendering whole deck");
        let bulk = self.renderer.render_all_bulk(&input, slide_count).await;

        let jobs = presentation.slides().iter().zip(bulk);
        let artifacts: Vec<SlideArtifacts> = stream::iter(jobs)
            .map(|(slide, bulk_preview)| {
                self.process_slide(&presentation, slide, bulk_preview, &work_dir, total, &progress)
            })
            .buffered(self.config.slide_workers)
            .try_collect()
            .await?;

        progress(SplitProgress {
            current: slide_count + 1,
            total,
            label: "XML Metadata".to_string(),
            stage: SplitStage::WritingManifest,
        });
        let manifest = Manifest::build(
            &group_name,
            artifacts.iter().map(|a| a.entry.clone()).collect(),
        );
        manifest.write_to(&manifest_path)?;

        progress(SplitProgress {
            current: total,
            total,
            label: "Zip Archive".to_string(),
            stage: SplitStage::Archiving,
        });
        let archive_path = self.archive_destination(&request);
        let files: Vec<PathBuf> = artifacts
            .iter()
            .map(|a| a.fragment_path.clone())
            .chain(artifacts.iter().map(|a| a.preview_path.clone()))
            .chain(std::iter::once(manifest_path))
            .collect();
        let summary = self.archiver.build(&files, &archive_path)?;

        let cleanup = work_dir.seal();
        progress(SplitProgress {
            current: total,
            total,
            label: "Export Complete".to_string(),
            stage: SplitStage::Complete,
        });

        let preview_sources: Vec<PreviewSource> = artifacts.iter().map(|a| a.source).collect();
        let placeholders = preview_sources
            .iter()
            .filter(|s| **s == PreviewSource::Placeholder)
            .count();
        if placeholders > 0 {
            warn!("{} of {} previews are placeholders", placeholders, slide_count);
        }

        info!(
            "Exported {} slides from {:?} to {:?} in {:?}",
            slide_count,
            input,
            summary.path,
            start.elapsed()
        );

        Ok(SplitResult {
            archive_path: summary.path,
            slide_count,
            archived_files: summary.file_count,
            archive_size_bytes: summary.size_bytes,
            manifest,
            preview_sources,
            cleanup,
            duration: start.elapsed(),
        })
    }

    async fn process_slide<F>(
        &self,
        presentation: &Presentation,
        slide: &Slide,
        bulk_preview: Option<TempPath>,
        work_dir: &WorkDir,
        total: usize,
        progress: &F,
    ) -> Result<SlideArtifacts>
    where
        F: Fn(SplitProgress) + Send + Sync,
    {
        let ordinal = slide.ordinal;
        let name = self.extractor.display_name(slide);
        let report = |stage: SplitStage| {
            progress(SplitProgress {
                current: ordinal,
                total,
                label: name.clone(),
                stage,
            })
        };
        let output = &self.config.output;

        report(SplitStage::CreatingFragment);
        let id = identity::unique_id();
        let fragment = self.extractor.extract(presentation, ordinal)?;
        let fragment_path = work_dir.claim(&format!("{}.{}", id, output.fragment_extension))?;
        fragment
            .save(&fragment_path)
            .map_err(|e| SplitError::FragmentFailed {
                ordinal,
                message: e.to_string(),
            })?;

        report(SplitStage::CreatingPreview);
        let (raw, source) = match bulk_preview {
            Some(path) => (path, PreviewSource::Bulk),
            None => {
                let rendered = self
                    .renderer
                    .render_with_fallback(&fragment_path, ordinal)
                    .await?;
                (rendered.path, rendered.source)
            }
        };

        let resized = self
            .renderer
            .resize(&raw, self.config.render.thumbnail_height)?;
        self.renderer.release_temp(raw);

        let preview_path = work_dir.claim(&format!("{}.{}", id, output.preview_extension))?;
        std::fs::copy(&resized, &preview_path)?;
        self.renderer.release_temp(resized);

        report(SplitStage::SlideCompleted);
        debug!("Slide {} '{}' done ({:?})", ordinal, name, source);

        Ok(SlideArtifacts {
            fragment_path,
            preview_path,
            entry: ManifestEntry::new(name, id),
            source,
        })
    }

    fn archive_destination(&self, request: &SplitRequest) -> PathBuf {
        let dir = match request.input_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = archive::archive_file_name(
            &request.get_base_name(),
            &self.config.output.timestamp_format,
            &chrono::Local::now(),
        );
        dir.join(name)
    }
}

/// Check that the input exists, is a readable file and has a supported
/// extension, before any work starts.
pub fn validate_input(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(SplitError::InputNotFound(path.to_path_buf()));
    }
    if !path.is_file() {
        return Err(SplitError::InputNotAFile(path.to_path_buf()));
    }
    std::fs::File::open(path).map_err(|e| SplitError::InputUnreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !crate::is_supported_extension(ext) {
        return Err(SplitError::UnsupportedFormat {
            extension: ext.to_string(),
        });
    }
    Ok(())
}

/// Working directory of one run.
///
/// Dropping an unsealed guard (error or cancellation) removes what the run
/// generated: an owned temporary directory goes entirely, a caller-supplied
/// directory loses only the tracked files.
struct WorkDir {
    path: PathBuf,
    owned: Option<TempDir>,
    generated: Mutex<Vec<PathBuf>>,
    sealed: bool,
}

impl WorkDir {
    fn create(request: &SplitRequest, config: &SplitterConfig) -> Result<Self> {
        match &request.work_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir).map_err(|e| SplitError::OutputDirError {
                    path: dir.clone(),
                    message: e.to_string(),
                })?;
                Ok(Self {
                    path: dir.clone(),
                    owned: None,
                    generated: Mutex::new(Vec::new()),
                    sealed: false,
                })
            }
            None => {
                let root = config
                    .render
                    .temp_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir);
                let dir = tempfile::Builder::new()
                    .prefix(&config.output.temp_prefix)
                    .tempdir_in(&root)
                    .map_err(|e| SplitError::OutputDirError {
                        path: root.clone(),
                        message: e.to_string(),
                    })?;
                debug!("Working directory {:?}", dir.path());
                Ok(Self {
                    path: dir.path().to_path_buf(),
                    owned: Some(dir),
                    generated: Mutex::new(Vec::new()),
                    sealed: false,
                })
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Reserve `name` in the directory for this run.
    ///
    /// The file is created empty and tracked. An existing file is never
    /// overwritten or removed.
    fn claim(&self, name: &str) -> Result<PathBuf> {
        let path = self.path.join(name);
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| SplitError::OutputDirError {
                path: path.clone(),
                message: match e.kind() {
                    std::io::ErrorKind::AlreadyExists => {
                        "refusing to overwrite an existing file".to_string()
                    }
                    _ => e.to_string(),
                },
            })?;
        self.track(path.clone());
        Ok(path)
    }

    fn track(&self, path: PathBuf) {
        self.generated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(path);
    }

    fn generated(&self) -> Vec<PathBuf> {
        self.generated
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Clean up after a sealed archive.
    fn seal(mut self) -> CleanupReport {
        let report =
            archive::finalize_and_cleanup(&self.path, &self.generated(), self.owned.is_some());
        self.sealed = true;
        report
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.sealed {
            return;
        }
        if self.owned.is_some() {
            warn!("Discarding working directory {:?}", self.path);
            return;
        }
        let generated = self.generated();
        warn!(
            "Removing {} generated file(s) from {:?}",
            generated.len(),
            self.path
        );
        for path in generated {
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to remove {:?}: {}", path, e);
                }
            }
        }
    }
}
