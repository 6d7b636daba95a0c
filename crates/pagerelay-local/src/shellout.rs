//! Shellouts to local model CLIs.
//!
//! - **Probe first**: availability is a PATH lookup, never a spawn.
//! - **Bounded**: every run has a timeout; the child is killed when the run is dropped.
//! - **No secrets**: no env dumps; callers decide what to surface.

use pagerelay_core::{Error, ProviderKind};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Resolve `bin` on `PATH`. Values containing a path separator are checked as-is.
pub fn which(bin: &str) -> Option<PathBuf> {
    let p = Path::new(bin);
    if p.is_absolute() || p.components().count() > 1 {
        return p.is_file().then(|| p.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let cand = dir.join(bin);
        if cand.is_file() {
            return Some(cand);
        }
        if cfg!(windows) {
            let cand = dir.join(format!("{bin}.exe"));
            if cand.is_file() {
                return Some(cand);
            }
        }
    }
    None
}

pub fn has(bin: &str) -> bool {
    which(bin).is_some()
}

#[derive(Debug, Clone)]
pub struct CliOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    /// Diagnostic for a failed run: stderr, else stdout, else empty.
    pub fn error_text(&self) -> &str {
        let err = self.stderr.trim();
        if !err.is_empty() {
            return err;
        }
        self.stdout.trim()
    }
}

/// A failed [`run`]: a stable `shellout_*` code plus the io error text when there is one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunError {
    pub code: &'static str,
    pub detail: Option<String>,
}

impl RunError {
    fn bare(code: &'static str) -> Self {
        Self { code, detail: None }
    }

    fn io(code: &'static str, e: std::io::Error) -> Self {
        Self {
            code,
            detail: Some(e.to_string()),
        }
    }
}

/// Run `cmd`, optionally feeding `stdin`, and capture both output streams.
///
/// Stdin is written concurrently with output collection so a chatty child cannot deadlock on a
/// full pipe. A child that exits without reading its stdin is not an error here; its exit status
/// decides.
pub async fn run(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
) -> Result<CliOutput, RunError> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RunError::io("shellout_tool_not_found", e)
        } else {
            RunError::io("shellout_spawn_failed", e)
        }
    })?;

    let pipe = child.stdin.take();
    let feed = async move {
        let (Some(mut pipe), Some(bytes)) = (pipe, stdin) else {
            return Ok(());
        };
        match pipe.write_all(bytes).await {
            Ok(()) => pipe.shutdown().await,
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(e),
        }
    };

    let both = async { tokio::join!(feed, child.wait_with_output()) };
    let (fed, out) = tokio::time::timeout(timeout, both)
        .await
        .map_err(|_| RunError::bare("shellout_timeout"))?;
    fed.map_err(|e| RunError::io("shellout_stdin_failed", e))?;
    let out = out.map_err(|e| RunError::io("shellout_wait_failed", e))?;

    Ok(CliOutput {
        success: out.status.success(),
        code: out.status.code(),
        stdout: String::from_utf8_lossy(&out.stdout).to_string(),
        stderr: String::from_utf8_lossy(&out.stderr).to_string(),
    })
}

/// Map a [`run`] failure onto the provider error taxonomy.
///
/// Other failures surface as `<code>: <io error>` so spawn problems like an oversized argv stay
/// diagnosable.
pub fn classify(err: RunError, provider: ProviderKind, timeout: Duration, not_found: &str) -> Error {
    match err.code {
        "shellout_tool_not_found" => Error::ProviderUnavailable(not_found.to_string()),
        "shellout_timeout" => Error::upstream(
            provider,
            None,
            format!("timed out after {}ms", timeout.as_millis()),
        ),
        code => match err.detail {
            Some(detail) => Error::upstream(provider, None, format!("{code}: {detail}")),
            None => Error::upstream(provider, None, code),
        },
    }
}
