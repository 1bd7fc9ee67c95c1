//! PowerPoint and Keynote export driven through `osascript` (macOS only).

use super::{find_with_extension, responds, run_tool, BackendKind, PdfConverter};
use crate::error::{Result, SplitError};
use async_process::Command;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Presentation application that can export PDFs over AppleScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfficeApp {
    PowerPoint,
    Keynote,
}

impl OfficeApp {
    /// Backend this application maps to.
    pub fn kind(&self) -> BackendKind {
        match self {
            OfficeApp::PowerPoint => BackendKind::PowerPoint,
            OfficeApp::Keynote => BackendKind::Keynote,
        }
    }

    /// Application name as AppleScript knows it.
    pub fn application_name(&self) -> &'static str {
        match self {
            OfficeApp::PowerPoint => "Microsoft PowerPoint",
            OfficeApp::Keynote => "Keynote",
        }
    }

    fn export_script(&self, input: &Path, pdf: &Path) -> String {
        let input = applescript_string(&input.to_string_lossy());
        let pdf = applescript_string(&pdf.to_string_lossy());
        match self {
            OfficeApp::PowerPoint => format!(
                r#"tell application "Microsoft PowerPoint"
    open POSIX file {input}
    set thePresentation to active presentation
    save thePresentation in POSIX file {pdf} as save as PDF
    close thePresentation saving no
end tell"#
            ),
            OfficeApp::Keynote => format!(
                r#"tell application "Keynote"
    set thePresentation to open POSIX file {input}
    export thePresentation to POSIX file {pdf} as PDF
    close thePresentation saving no
end tell"#
            ),
        }
    }
}

/// Quote `text` as an AppleScript string literal.
fn applescript_string(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// PDF converter scripting a desktop presentation application.
#[derive(Debug)]
pub struct AppleScriptConverter {
    app: OfficeApp,
}

impl AppleScriptConverter {
    /// Look for `app`; only succeeds on macOS with the application installed.
    pub async fn detect(app: OfficeApp, detect_timeout: Duration) -> Result<Self> {
        let unavailable = |message: &str| SplitError::BackendUnavailable {
            backend: app.kind(),
            message: message.to_string(),
        };

        if !cfg!(target_os = "macos") {
            return Err(unavailable("AppleScript automation requires macOS"));
        }

        let osascript = which::which("osascript").map_err(|_| unavailable("osascript not found"))?;
        let mut cmd = Command::new(osascript);
        cmd.arg("-e").arg(format!(
            "tell application \"{}\" to get version",
            app.application_name()
        ));

        if !responds(cmd, detect_timeout).await {
            return Err(unavailable("application did not answer the version check"));
        }

        info!("{} available via AppleScript", app.application_name());
        Ok(Self { app })
    }
}

#[async_trait]
impl PdfConverter for AppleScriptConverter {
    fn kind(&self) -> BackendKind {
        self.app.kind()
    }

    async fn convert(&self, input: &Path, out_dir: &Path) -> Result<PathBuf> {
        let input = std::fs::canonicalize(input)?;
        let stem = input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("output");
        let pdf = out_dir.join(format!("{}.pdf", stem));

        let mut cmd = Command::new("osascript");
        cmd.arg("-e").arg(self.app.export_script(&input, &pdf));
        run_tool(self.kind(), cmd, &input).await?;

        if pdf.exists() {
            debug!("{} exported {:?}", self.app.application_name(), pdf);
            return Ok(pdf);
        }
        find_with_extension(out_dir, "pdf").ok_or_else(|| SplitError::BackendFailed {
            backend: self.kind(),
            path: input,
            message: "PDF output file not found".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_applescript_string_escapes() {
        assert_eq!(applescript_string("plain"), "\"plain\"");
        assert_eq!(applescript_string("a \"b\""), "\"a \\\"b\\\"\"");
        assert_eq!(applescript_string("c\\d"), "\"c\\\\d\"");
    }

    #[test]
    fn test_export_script_mentions_application_and_paths() {
        let script = OfficeApp::Keynote.export_script(Path::new("/a/deck.pptx"), Path::new("/b/deck.pdf"));
        assert!(script.starts_with("tell application \"Keynote\""));
        assert!(script.contains("\"/a/deck.pptx\""));
        assert!(script.contains("as PDF"));

        let script = OfficeApp::PowerPoint.export_script(Path::new("/a/deck.pptx"), Path::new("/b/deck.pdf"));
        assert!(script.contains("save as PDF"));
    }

    #[test]
    fn test_app_kinds() {
        assert_eq!(OfficeApp::PowerPoint.kind(), BackendKind::PowerPoint);
        assert_eq!(OfficeApp::Keynote.kind(), BackendKind::Keynote);
    }

    #[cfg(not(target_os = "macos"))]
    #[tokio::test]
    async fn test_detect_unavailable_off_macos() {
        let err = AppleScriptConverter::detect(OfficeApp::Keynote, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("macOS"));
    }
}
