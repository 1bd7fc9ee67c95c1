//! Final archive assembly and intermediate cleanup.

use crate::config::CleanupReport;
use crate::error::{Result, SplitError};
use chrono::{DateTime, TimeZone};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Operating-system metadata files never stored in an archive.
pub const SYSTEM_FILES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini", ".git", ".gitignore"];

/// A sealed archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Entries written.
    pub file_count: usize,
    pub size_bytes: u64,
}

/// Writes flat deflate archives.
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    compression_level: u8,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new(6)
    }
}

impl ArchiveBuilder {
    pub fn new(compression_level: u8) -> Self {
        Self {
            compression_level: compression_level.min(9),
        }
    }

    /// Store `files` at the archive root under their base names.
    ///
    /// System metadata files are skipped. An existing file at `destination`
    /// is never replaced. On failure the partial archive is removed.
    pub fn build(&self, files: &[PathBuf], destination: &Path) -> Result<ArchiveSummary> {
        if files.is_empty() {
            return Err(SplitError::NothingToArchive(destination.to_path_buf()));
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(destination)
            .map_err(|e| SplitError::ArchiveFailed {
                path: destination.to_path_buf(),
                message: match e.kind() {
                    std::io::ErrorKind::AlreadyExists => "archive already exists".to_string(),
                    _ => e.to_string(),
                },
            })?;

        let file_count = match self.write_entries(file, files, destination) {
            Ok(count) => count,
            Err(e) => {
                if destination.exists() {
                    if let Err(rm) = std::fs::remove_file(destination) {
                        warn!("Failed to remove partial archive {:?}: {}", destination, rm);
                    }
                }
                return Err(match e {
                    SplitError::ArchiveFailed { .. } => e,
                    other => SplitError::ArchiveFailed {
                        path: destination.to_path_buf(),
                        message: other.to_string(),
                    },
                });
            }
        };

        let size_bytes = std::fs::metadata(destination)?.len();
        info!(
            "Archived {} files into {:?} ({} bytes)",
            file_count, destination, size_bytes
        );

        Ok(ArchiveSummary {
            path: destination.to_path_buf(),
            file_count,
            size_bytes,
        })
    }

    fn write_entries(&self, file: File, files: &[PathBuf], destination: &Path) -> Result<usize> {
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level as i64));

        let mut names: HashSet<String> = HashSet::new();
        let mut count = 0;

        for path in files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!("Skipping file without a usable name: {:?}", path);
                continue;
            };
            if SYSTEM_FILES.contains(&name) {
                debug!("Skipping system file {:?}", path);
                continue;
            }
            if !path.is_file() {
                return Err(SplitError::ArchiveFailed {
                    path: destination.to_path_buf(),
                    message: format!("{:?} is not a file", path),
                });
            }
            if !names.insert(name.to_string()) {
                return Err(SplitError::ArchiveFailed {
                    path: destination.to_path_buf(),
                    message: format!("duplicate entry name '{}'", name),
                });
            }

            zip.start_file(name, options)?;
            let mut source = File::open(path)?;
            std::io::copy(&mut source, &mut zip)?;
            count += 1;
        }

        zip.finish()?.flush()?;
        Ok(count)
    }
}

/// `<base>_<timestamp>.zip` using a chrono format string.
pub fn archive_file_name<Tz>(base: &str, timestamp_format: &str, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}_{}.zip", base, now.format(timestamp_format))
}

/// Remove generated intermediates once the archive is sealed.
///
/// A directory created by us is removed entirely. A caller-supplied directory
/// only loses the generated files, and is removed only if nothing else is
/// left in it. Failures are logged, never raised.
pub fn finalize_and_cleanup(work_dir: &Path, generated: &[PathBuf], created_by_us: bool) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in generated {
        match std::fs::remove_file(path) {
            Ok(()) => report.removed_files += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {:?}: {}", path, e),
        }
    }

    if created_by_us {
        match std::fs::remove_dir_all(work_dir) {
            Ok(()) => report.directory_removed = true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => report.directory_removed = true,
            Err(e) => warn!("Failed to remove working directory {:?}: {}", work_dir, e),
        }
        return report;
    }

    let remaining = std::fs::read_dir(work_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    if remaining == 0 {
        report.directory_removed = std::fs::remove_dir(work_dir).is_ok();
    } else {
        report.remaining_files = remaining;
        info!(
            "Kept {:?}: {} unrelated file(s) remain",
            work_dir, remaining
        );
    }

    report
}
