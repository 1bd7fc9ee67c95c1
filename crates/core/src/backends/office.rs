//! LibreOffice headless conversion to PDF.
//!
//! Each converter owns a private user profile so it never collides with a
//! desktop LibreOffice session. soffice does not tolerate two conversions on
//! one profile, so calls on the same converter are serialized.

use super::{find_with_extension, run_tool, BackendKind, PdfConverter};
use crate::config::RenderConfig;
use crate::error::{Result, SplitError};
use async_process::Command;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// PDF converter driving `soffice --convert-to pdf`.
#[derive(Debug)]
pub struct LibreOfficeConverter {
    soffice_path: PathBuf,
    /// Unique user profile directory.
    profile_dir: TempDir,
    lock: Mutex<()>,
    docs_processed: AtomicU32,
}

impl LibreOfficeConverter {
    /// Locate soffice and prepare a private profile.
    pub fn new(config: &RenderConfig) -> Result<Self> {
        let soffice_path = find_soffice(config)?;
        info!("Found LibreOffice at: {:?}", soffice_path);

        let profile_dir = TempDir::with_prefix("lo-profile-").map_err(|e| {
            SplitError::BackendUnavailable {
                backend: BackendKind::LibreOffice,
                message: format!("cannot create profile directory: {}", e),
            }
        })?;
        debug!("LibreOffice profile at {:?}", profile_dir.path());

        Ok(Self {
            soffice_path,
            profile_dir,
            lock: Mutex::new(()),
            docs_processed: AtomicU32::new(0),
        })
    }

    /// Path of the soffice binary in use.
    pub fn soffice_path(&self) -> &Path {
        &self.soffice_path
    }

    /// Number of documents converted so far.
    pub fn docs_processed(&self) -> u32 {
        self.docs_processed.load(Ordering::SeqCst)
    }

    fn command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.soffice_path);
        cmd.args([
            "--headless",
            "--invisible",
            "--nologo",
            "--nofirststartwizard",
            "--norestore",
        ]);
        cmd.arg(format!(
            "-env:UserInstallation=file://{}",
            self.profile_dir.path().display()
        ));
        cmd.args(["--convert-to", "pdf:impress_pdf_Export", "--outdir"]);
        cmd.arg(out_dir);
        cmd.arg(input);
        cmd
    }
}

#[async_trait]
impl PdfConverter for LibreOfficeConverter {
    fn kind(&self) -> BackendKind {
        BackendKind::LibreOffice
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        let _guard = self.lock.lock().await;
        let start = Instant::now();

        run_tool(BackendKind::LibreOffice, self.command(input, out_dir), input).await?;

        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let expected = out_dir.join(format!("{}.pdf", stem));

        // soffice may adjust the output name.
        let pdf = if expected.exists() {
            expected
        } else {
            find_with_extension(out_dir, "pdf").ok_or_else(|| SplitError::BackendFailed {
                backend: BackendKind::LibreOffice,
                path: input.to_path_buf(),
                message: "PDF output file not found".to_string(),
            })?
        };

        self.docs_processed.fetch_add(1, Ordering::SeqCst);
        debug!("Converted {:?} in {:?}", input.file_name(), start.elapsed());
        Ok(pdf)
    }
}

/// Find the soffice binary: explicit path, then common install locations,
/// then `PATH`.
pub fn find_soffice(config: &RenderConfig) -> Result<PathBuf> {
    let not_found = |message: String| SplitError::BackendUnavailable {
        backend: BackendKind::LibreOffice,
        message,
    };

    if let Some(ref path) = config.soffice_path {
        if path.exists() {
            return Ok(path.clone());
        }
        return Err(not_found(format!("configured soffice {:?} does not exist", path)));
    }

    let candidates = [
        // macOS
        "/Applications/LibreOffice.app/Contents/MacOS/soffice",
        // Linux
        "/usr/bin/soffice",
        "/usr/lib/libreoffice/program/soffice",
        "/opt/libreoffice/program/soffice",
        // Snap (Ubuntu)
        "/snap/bin/libreoffice.soffice",
    ];

    for candidate in candidates {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    which::which("soffice")
        .or_else(|_| which::which("libreoffice"))
        .map_err(|_| not_found("soffice not found in common locations or PATH".to_string()))
}
