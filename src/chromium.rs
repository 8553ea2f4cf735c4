//! HTML to PDF rendering through a headless Chromium subprocess.
//!
//! Each render writes the document into a private temporary directory,
//! runs `chromium --headless --print-to-pdf=<out> file://<input>` and reads
//! the printed PDF back. The subprocess is killed once the render timeout
//! expires, so a hung browser never outlives its job.

use crate::converter::{RenderError, Renderer};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tempfile::TempDir;
use tracing::{info, warn};

pub const DEFAULT_CHROMIUM_PATH: &str = "chromium";

const DEFAULT_FLAGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--no-sandbox",
    "--no-pdf-header-footer",
];

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    binary: PathBuf,
    flags: Vec<String>,
    timeout: Duration,
}

impl ChromiumRenderer {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            flags: DEFAULT_FLAGS.iter().map(|f| f.to_string()).collect(),
            timeout,
        }
    }

    /// Replaces the flags passed ahead of `--print-to-pdf`.
    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl Renderer for ChromiumRenderer {
    /// Prints HTML content to PDF bytes.
    ///
    /// # Errors
    ///
    /// - The browser binary cannot be started
    /// - Non-zero exit, with its stderr attached
    /// - The browser exits cleanly but writes no PDF
    /// - The render runs past the configured timeout
    fn render(&self, content: &str) -> Result<Vec<u8>, RenderError> {
        let started_at = Instant::now();
        let workdir = TempDir::new().map_err(io_error)?;
        let input_path = workdir.path().join("input.html");
        let output_path = workdir.path().join("output.pdf");
        let stderr_path = workdir.path().join("stderr.log");

        fs::write(&input_path, content).map_err(io_error)?;
        let stderr_file = fs::File::create(&stderr_path).map_err(io_error)?;

        let mut child = Command::new(&self.binary)
            .args(&self.flags)
            .arg(format!("--print-to-pdf={}", output_path.display()))
            .arg(format!("file://{}", input_path.display()))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_file))
            .spawn()
            .map_err(|err| {
                warn!(
                    binary = %self.binary.display(),
                    error = %err,
                    "Failed to spawn Chromium"
                );
                if err.kind() == ErrorKind::NotFound {
                    RenderError::Spawn(format!("{} not found", self.binary.display()))
                } else {
                    RenderError::Spawn(err.to_string())
                }
            })?;

        let deadline = started_at + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait().map_err(io_error)? {
                break status;
            }
            if Instant::now() >= deadline {
                // Already exited between the poll and the kill is fine.
                let _ = child.kill();
                let _ = child.wait();
                warn!(
                    binary = %self.binary.display(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Chromium render timed out, process killed"
                );
                return Err(RenderError::Timeout(self.timeout.as_secs()));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            let exit_code = status.code();
            warn!(
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                stderr = %stderr.trim(),
                "Chromium render failed"
            );
            return Err(RenderError::Engine {
                exit_code,
                stderr: stderr.trim().to_string(),
            });
        }

        let pdf = match fs::read(&output_path) {
            Ok(bytes) if !bytes.is_empty() => bytes,
            Ok(_) => return Err(RenderError::Io("Chromium wrote an empty PDF".to_string())),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(RenderError::Io("Chromium produced no PDF".to_string()))
            }
            Err(err) => return Err(io_error(err)),
        };

        info!(
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            pdf_bytes = pdf.len(),
            "PDF render complete (HTML)"
        );
        Ok(pdf)
    }
}

fn io_error(err: std::io::Error) -> RenderError {
    RenderError::Io(err.to_string())
}
