//! External retrieval tools and per-platform selection.
//!
//! Each tool is driven as a child process with a connect timeout, an overall
//! transfer timeout, and a browser identity. The orchestrator only sees the
//! [`Downloader`] trait, so tests substitute an in-process fake.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DownloadError;
use super::constants::{
    CONNECT_TIMEOUT, MAX_DIAGNOSTIC_CHARS, MAX_TRANSFER_TIME, PROBE_TIMEOUT, PROCESS_GRACE,
};
use crate::user_agent::BROWSER_USER_AGENT;

/// Host platform family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// macOS.
    MacOs,
    /// Linux and other Unix-likes.
    Linux,
    /// Windows.
    Windows,
}

impl Platform {
    /// Detects the platform this binary was built for.
    #[must_use]
    pub fn detect() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Tools to try, primary first.
    #[must_use]
    pub fn candidate_tools(self) -> &'static [ToolKind] {
        match self {
            Self::MacOs => &[ToolKind::Curl],
            Self::Linux => &[ToolKind::Curl, ToolKind::Wget],
            Self::Windows => &[ToolKind::PowerShell, ToolKind::Curl],
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
        })
    }
}

/// What to fetch and how.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Source URL.
    pub url: String,
    /// File the tool writes to.
    pub destination: PathBuf,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Whole-transfer timeout.
    pub max_time: Duration,
    /// Identity presented to the server.
    pub user_agent: String,
    /// Size cap passed to tools that support one.
    pub max_bytes: u64,
}

impl FetchRequest {
    /// Creates a request with the standard timeouts and browser identity.
    #[must_use]
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            connect_timeout: CONNECT_TIMEOUT,
            max_time: MAX_TRANSFER_TIME,
            user_agent: BROWSER_USER_AGENT.to_string(),
            max_bytes,
        }
    }
}

/// Result of a completed tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Whether the tool reported success.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Trimmed tool output for diagnostics.
    pub diagnostic: String,
}

/// A retrieval capability.
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Tool name recorded in the ledger.
    fn name(&self) -> &'static str;

    /// Fetches `request.url` into `request.destination`.
    ///
    /// A tool that runs but fails is `Ok` with `success == false`; spawn
    /// failures, timeouts, and cancellation are errors.
    async fn fetch(
        &self,
        id: &str,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError>;
}

/// Supported external tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    /// `curl`.
    Curl,
    /// GNU `wget`.
    Wget,
    /// Windows PowerShell `Invoke-WebRequest`.
    PowerShell,
}

impl ToolKind {
    /// Tool name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Wget => "wget",
            Self::PowerShell => "powershell",
        }
    }

    fn program(self) -> &'static str {
        match self {
            Self::Curl => "curl",
            Self::Wget => "wget",
            Self::PowerShell => "powershell",
        }
    }

    fn version_args(self) -> &'static [&'static str] {
        match self {
            Self::Curl | Self::Wget => &["--version"],
            Self::PowerShell => &["-NoProfile", "-NonInteractive", "-Command", "exit 0"],
        }
    }

    /// Arguments for one fetch.
    #[must_use]
    pub fn fetch_args(self, request: &FetchRequest) -> Vec<String> {
        let destination = request.destination.to_string_lossy().to_string();
        match self {
            Self::Curl => vec![
                "--location".into(),
                "--fail".into(),
                "--silent".into(),
                "--show-error".into(),
                "--connect-timeout".into(),
                request.connect_timeout.as_secs().to_string(),
                "--max-time".into(),
                request.max_time.as_secs().to_string(),
                "--max-filesize".into(),
                request.max_bytes.to_string(),
                "--user-agent".into(),
                request.user_agent.clone(),
                "--output".into(),
                destination,
                request.url.clone(),
            ],
            Self::Wget => vec![
                "--quiet".into(),
                format!("--connect-timeout={}", request.connect_timeout.as_secs()),
                format!("--timeout={}", request.max_time.as_secs()),
                "--tries=1".into(),
                format!("--user-agent={}", request.user_agent),
                format!("--output-document={destination}"),
                request.url.clone(),
            ],
            Self::PowerShell => vec![
                "-NoProfile".into(),
                "-NonInteractive".into(),
                "-Command".into(),
                format!(
                    "$ProgressPreference='SilentlyContinue'; Invoke-WebRequest -Uri '{}' -OutFile '{}' -UserAgent '{}' -TimeoutSec {} -MaximumRedirection 10 -UseBasicParsing",
                    ps_quote(&request.url),
                    ps_quote(&destination),
                    ps_quote(&request.user_agent),
                    request.max_time.as_secs()
                ),
            ],
        }
    }
}

fn ps_quote(value: &str) -> String {
    value.replace('\'', "''")
}

/// [`Downloader`] backed by an external program.
#[derive(Debug, Clone, Copy)]
pub struct CommandDownloader {
    kind: ToolKind,
}

impl CommandDownloader {
    /// Wraps `kind` without checking that it is installed.
    #[must_use]
    pub fn new(kind: ToolKind) -> Self {
        Self { kind }
    }

    /// The wrapped tool.
    #[must_use]
    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Checks whether the tool runs at all.
    pub async fn is_available(kind: ToolKind) -> bool {
        let mut command = Command::new(kind.program());
        command
            .args(kind.version_args())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(PROBE_TIMEOUT, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(error)) => {
                debug!(tool = kind.name(), error = %error, "tool not runnable");
                false
            }
            Err(_) => {
                debug!(tool = kind.name(), "tool availability check timed out");
                false
            }
        }
    }
}

#[async_trait]
impl Downloader for CommandDownloader {
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    #[tracing::instrument(
        skip(self, request, cancel),
        fields(tool = self.kind.name(), url = %request.url)
    )]
    async fn fetch(
        &self,
        id: &str,
        request: &FetchRequest,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome, DownloadError> {
        let tool = self.kind.name();
        let mut command = Command::new(self.kind.program());
        command
            .args(self.kind.fetch_args(request))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|source| DownloadError::Spawn { tool, source })?;

        let budget = request.max_time + PROCESS_GRACE;
        // Dropping the wait future kills the child (kill_on_drop).
        let output = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return Err(DownloadError::Cancelled { id: id.to_string() });
            }
            waited = tokio::time::timeout(budget, child.wait_with_output()) => match waited {
                Ok(Ok(output)) => output,
                Ok(Err(source)) => return Err(DownloadError::Spawn { tool, source }),
                Err(_) => {
                    return Err(DownloadError::Timeout {
                        tool,
                        url: request.url.clone(),
                        after: budget,
                    });
                }
            },
        };

        let mut diagnostic = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if diagnostic.is_empty() {
            diagnostic = String::from_utf8_lossy(&output.stdout).trim().to_string();
        }
        Ok(FetchOutcome {
            success: output.status.success(),
            exit_code: output.status.code(),
            diagnostic: truncate_diagnostic(&diagnostic),
        })
    }
}

fn truncate_diagnostic(text: &str) -> String {
    if text.chars().count() <= MAX_DIAGNOSTIC_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(MAX_DIAGNOSTIC_CHARS).collect();
    format!("{head}...")
}

/// Picks the first installed tool for `platform`.
///
/// # Errors
///
/// Returns [`DownloadError::NoTool`] when none of the candidates runs.
pub async fn select_downloader(platform: Platform) -> Result<Arc<dyn Downloader>, DownloadError> {
    let candidates = platform.candidate_tools();
    for (position, kind) in candidates.iter().copied().enumerate() {
        if CommandDownloader::is_available(kind).await {
            if position > 0 {
                warn!(
                    %platform,
                    tool = kind.name(),
                    "primary download tool unavailable; using fallback"
                );
            } else {
                info!(%platform, tool = kind.name(), "download tool selected");
            }
            return Ok(Arc::new(CommandDownloader::new(kind)));
        }
    }
    Err(DownloadError::NoTool {
        platform: platform.to_string(),
        tried: candidates
            .iter()
            .map(|kind| kind.name())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Temp file a tool writes into before the rename.
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FetchRequest {
        FetchRequest::new("https://example.org/a.pdf", "/tmp/out/1.pdf.part", 1024)
    }

    #[test]
    fn test_platform_candidates_have_documented_fallbacks() {
        assert_eq!(Platform::MacOs.candidate_tools(), &[ToolKind::Curl]);
        assert_eq!(
            Platform::Linux.candidate_tools(),
            &[ToolKind::Curl, ToolKind::Wget]
        );
        assert_eq!(
            Platform::Windows.candidate_tools(),
            &[ToolKind::PowerShell, ToolKind::Curl]
        );
    }

    #[test]
    fn test_curl_args_carry_timeouts_identity_and_cap() {
        let args = ToolKind::Curl.fetch_args(&request());
        let joined = args.join(" ");
        assert!(joined.contains("--connect-timeout 30"), "{joined}");
        assert!(joined.contains("--max-time 120"), "{joined}");
        assert!(joined.contains("--max-filesize 1024"), "{joined}");
        assert!(args.contains(&BROWSER_USER_AGENT.to_string()));
        assert_eq!(args.last().map(String::as_str), Some("https://example.org/a.pdf"));
    }

    #[test]
    fn test_wget_args_write_to_destination() {
        let args = ToolKind::Wget.fetch_args(&request());
        assert!(args.contains(&"--output-document=/tmp/out/1.pdf.part".to_string()));
        assert!(args.contains(&"--connect-timeout=30".to_string()));
    }

    #[test]
    fn test_powershell_command_escapes_quotes() {
        let mut req = request();
        req.url = "https://example.org/it's.pdf".into();
        let args = ToolKind::PowerShell.fetch_args(&req);
        let script = args.last().cloned().unwrap_or_default();
        assert!(script.contains("Invoke-WebRequest"));
        assert!(script.contains("it''s.pdf"));
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/a/b/123.pdf")),
            PathBuf::from("/a/b/123.pdf.part")
        );
    }

    #[test]
    fn test_long_diagnostics_are_truncated() {
        let long = "e".repeat(MAX_DIAGNOSTIC_CHARS + 50);
        assert_eq!(
            truncate_diagnostic(&long).chars().count(),
            MAX_DIAGNOSTIC_CHARS + 3
        );
        assert_eq!(truncate_diagnostic("short"), "short");
    }
}
