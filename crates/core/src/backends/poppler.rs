//! Page rasterization through poppler's `pdftoppm`.

use super::{responds, run_tool, BackendKind, PageRasterizer};
use crate::error::{Result, SplitError};
use async_process::Command;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const PAGE_PREFIX: &str = "page";

/// Page rasterizer shelling out to `pdftoppm -png`.
#[derive(Debug, Clone)]
pub struct PopplerRasterizer {
    pdftoppm: PathBuf,
}

impl PopplerRasterizer {
    /// Locate `pdftoppm` on `PATH` and check that it runs.
    pub async fn detect(detect_timeout: Duration) -> Result<Self> {
        let pdftoppm = which::which("pdftoppm").map_err(|_| SplitError::BackendUnavailable {
            backend: BackendKind::Poppler,
            message: "pdftoppm not found in PATH".to_string(),
        })?;

        let mut cmd = Command::new(&pdftoppm);
        cmd.arg("-v");
        if !responds(cmd, detect_timeout).await {
            return Err(SplitError::BackendUnavailable {
                backend: BackendKind::Poppler,
                message: format!("{:?} did not answer the version check", pdftoppm),
            });
        }

        info!("Found pdftoppm at: {:?}", pdftoppm);
        Ok(Self { pdftoppm })
    }

    /// Use a known `pdftoppm` binary without checking it.
    pub fn with_binary(pdftoppm: impl Into<PathBuf>) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
        }
    }
}

#[async_trait]
impl PageRasterizer for PopplerRasterizer {
    fn kind(&self) -> BackendKind {
        BackendKind::Poppler
    }

    async fn rasterize(&self, pdf: &Path, dpi: u32, out_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut cmd = Command::new(&self.pdftoppm);
        cmd.args(["-png", "-r"]).arg(dpi.to_string());
        cmd.arg(pdf);
        cmd.arg(out_dir.join(PAGE_PREFIX));
        run_tool(BackendKind::Poppler, cmd, pdf).await?;

        let pages = collect_pages(out_dir)?;
        debug!("pdftoppm wrote {} pages for {:?}", pages.len(), pdf);
        Ok(pages)
    }
}

/// `page-N.png` files in `dir`, ordered by page number.
///
/// pdftoppm zero-pads the number to the width of the page count, so the
/// order has to come from the number rather than the name.
pub(crate) fn collect_pages(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pages: Vec<(u32, PathBuf)> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let name = path.file_name()?.to_str()?;
            let number = name
                .strip_prefix(PAGE_PREFIX)?
                .strip_prefix('-')?
                .strip_suffix(".png")?
                .parse::<u32>()
                .ok()?;
            Some((number, path))
        })
        .collect();

    pages.sort_by_key(|(number, _)| *number);
    Ok(pages.into_iter().map(|(_, path)| path).collect())
}
