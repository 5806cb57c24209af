//! Download orchestrator: builds the extractor invocation for a validated
//! request, probes the title, runs the transfer on a worker task, and routes
//! every progress line into the UI channel.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rust_embed::RustEmbed;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::error::ExtractError;
use crate::model::{DownloadMode, DownloadRequest};
use crate::probe;
use crate::progress::{self, ProgressEvent};

/// Optional bundled yt-dlp binary; when absent we fall back to PATH.
#[derive(RustEmbed)]
#[folder = "assets/"]
pub struct Asset;

/// Locates the extractor: a bundled binary is extracted to the temp dir on
/// first use, otherwise the bare name resolves through PATH at spawn time.
pub fn resolve_binary() -> Result<PathBuf, ExtractError> {
    let name = if cfg!(target_os = "windows") { "yt-dlp.exe" } else { "yt-dlp" };
    if let Some(data) = Asset::get(name) {
        let tmp = std::env::temp_dir().join(name);
        if !tmp.exists() {
            let mut f = std::fs::File::create(&tmp)?;
            f.write_all(&data.data)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o755))?;
            }
        }
        return Ok(tmp);
    }
    Ok(PathBuf::from(name))
}

/// Format-selector expression for the request: best video at or below the
/// selected height merged with best audio (with a combined-stream fallback),
/// or best audio alone for audio-only mode.
pub fn format_selector(mode: DownloadMode, quality: Option<u32>) -> String {
    match (mode, quality) {
        (DownloadMode::AudioOnly, _) => "bestaudio/best".to_string(),
        (DownloadMode::VideoAndAudio, Some(q)) => {
            format!("bestvideo[height<={q}]+bestaudio/best[height<={q}]")
        }
        // Unreachable after validation; kept as a safe fallback
        (DownloadMode::VideoAndAudio, None) => "best".to_string(),
    }
}

/// Full argument list for the transfer invocation.
pub fn build_args(req: &DownloadRequest, dest_dir: &Path) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "--progress-template".to_string(),
        progress::PROGRESS_TEMPLATE.to_string(),
        "-o".to_string(),
        format!("{}/%(title)s.%(ext)s", dest_dir.display()),
        "-f".to_string(),
        format_selector(req.mode, req.quality),
    ];
    if req.mode == DownloadMode::AudioOnly {
        args.push("-x".to_string());
        args.push("--audio-format".to_string());
        args.push("mp3".to_string());
    }
    args.push(req.url.clone());
    args
}

/// Events marshalled from the download worker to the interaction thread.
#[derive(Debug)]
pub enum DownloadEvent {
    /// Display title obtained by the pre-transfer metadata probe
    Title(String),
    /// Thumbnail URL from the same probe, preview only
    Thumbnail(String),
    Progress(ProgressEvent),
    /// Child exited successfully; exactly one of Finished/Failed per attempt
    Finished,
    Failed(String),
}

/// Worker body for one download attempt. All errors are converted to a single
/// `Failed` event at this boundary; the process stays alive and retryable.
pub async fn run_download(
    req: DownloadRequest,
    tx: UnboundedSender<DownloadEvent>,
    cancel: Arc<AtomicBool>,
) {
    match transfer(&req, &tx, &cancel).await {
        Ok(()) => {
            info!(url = %req.url, "download finished");
            let _ = tx.send(DownloadEvent::Finished);
        }
        Err(err) => {
            warn!(url = %req.url, error = %err, "download failed");
            let _ = tx.send(DownloadEvent::Failed(err.to_string()));
        }
    }
}

async fn transfer(
    req: &DownloadRequest,
    tx: &UnboundedSender<DownloadEvent>,
    cancel: &AtomicBool,
) -> Result<(), ExtractError> {
    // Pre-flight checks run before anything external, even if the UI already
    // validated
    if let Err(err) = req.validate() {
        return Err(ExtractError::Failed(err.to_string()));
    }
    let dest_dir = req
        .dest_dir
        .as_deref()
        .ok_or_else(|| ExtractError::Failed("no destination folder".to_string()))?;
    if cancel.load(Ordering::Relaxed) {
        return Err(ExtractError::Cancelled);
    }

    // Probe for the display title (and thumbnail) before transferring
    let info = probe::fetch_metadata(&req.url).await?;
    if let Some(title) = info.title {
        let _ = tx.send(DownloadEvent::Title(title));
    }
    if let Some(thumbnail) = info.thumbnail {
        let _ = tx.send(DownloadEvent::Thumbnail(thumbnail));
    }
    if cancel.load(Ordering::Relaxed) {
        return Err(ExtractError::Cancelled);
    }

    let bin = resolve_binary()?;
    let args = build_args(req, dest_dir);
    debug!(?args, "spawning extractor");
    let mut child = Command::new(bin)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|err| match err.kind() {
            ErrorKind::NotFound => ExtractError::MissingBinary,
            _ => ExtractError::Spawn(err),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| ExtractError::Failed("could not capture extractor output".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| ExtractError::Failed("could not capture extractor errors".to_string()))?;

    // Collect the stderr tail for the failure message
    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        let mut tail: Vec<String> = Vec::new();
        while let Ok(Some(line)) = lines.next_line().await {
            if !line.trim().is_empty() {
                if tail.len() >= 8 {
                    tail.remove(0);
                }
                tail.push(line);
            }
        }
        tail
    });

    let mut lines = BufReader::new(stdout).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => match progress::parse_line(&line) {
                    Some(event) => {
                        let _ = tx.send(DownloadEvent::Progress(event));
                    }
                    // One malformed record never aborts the transfer
                    None => debug!(%line, "skipping non-progress line"),
                },
                None => break,
            },
            // The ticker keeps cancellation responsive while stdout is quiet
            _ = ticker.tick() => {
                if cancel.load(Ordering::Relaxed) {
                    child.start_kill()?;
                    let _ = child.wait().await;
                    return Err(ExtractError::Cancelled);
                }
            }
        }
    }

    let status = child.wait().await?;
    let tail = stderr_task.await.unwrap_or_default();
    if !status.success() {
        let message = if tail.is_empty() {
            format!("extractor exited with {status}")
        } else {
            tail.join("\n")
        };
        return Err(ExtractError::Failed(message));
    }
    Ok(())
}

/// Last non-empty stderr line, for one-shot invocations like the probe.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr)
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "unknown extractor error".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    fn request(mode: DownloadMode, quality: Option<u32>) -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            dest_dir: Some(PathBuf::from("/tmp/downloads")),
            mode,
            quality,
        }
    }

    #[test]
    fn video_selector_caps_height_and_merges_audio() {
        assert_eq!(
            format_selector(DownloadMode::VideoAndAudio, Some(1080)),
            "bestvideo[height<=1080]+bestaudio/best[height<=1080]"
        );
    }

    #[test]
    fn audio_selector_ignores_quality() {
        assert_eq!(format_selector(DownloadMode::AudioOnly, Some(720)), "bestaudio/best");
        assert_eq!(format_selector(DownloadMode::AudioOnly, None), "bestaudio/best");
    }

    #[test]
    fn video_args_carry_template_and_output_path() {
        let req = request(DownloadMode::VideoAndAudio, Some(720));
        let args = build_args(&req, Path::new("/tmp/downloads"));
        assert!(args.contains(&"--newline".to_string()));
        assert!(args.contains(&progress::PROGRESS_TEMPLATE.to_string()));
        assert!(args.contains(&"/tmp/downloads/%(title)s.%(ext)s".to_string()));
        assert!(args.contains(&"bestvideo[height<=720]+bestaudio/best[height<=720]".to_string()));
        assert!(!args.contains(&"-x".to_string()));
        assert_eq!(args.last(), Some(&req.url));
    }

    #[test]
    fn audio_args_request_mp3_transcode() {
        let req = request(DownloadMode::AudioOnly, None);
        let args = build_args(&req, Path::new("/tmp/downloads"));
        let x = args.iter().position(|a| a == "-x").expect("-x present");
        assert_eq!(args[x + 1], "--audio-format");
        assert_eq!(args[x + 2], "mp3");
    }

    #[test]
    fn stderr_tail_picks_last_meaningful_line() {
        let raw = b"WARNING: something\nERROR: Unsupported URL: xyz\n\n";
        assert_eq!(stderr_tail(raw), "ERROR: Unsupported URL: xyz");
        assert_eq!(stderr_tail(b""), "unknown extractor error");
    }

    #[tokio::test]
    async fn invalid_request_fails_before_any_spawn() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let req = DownloadRequest {
            url: String::new(),
            dest_dir: None,
            mode: DownloadMode::VideoAndAudio,
            quality: None,
        };
        run_download(req, tx, cancel).await;
        // Exactly one terminal event, and it is a failure
        assert!(matches!(rx.recv().await, Some(DownloadEvent::Failed(_))));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn missing_quality_rejected_in_video_mode() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        run_download(request(DownloadMode::VideoAndAudio, None), tx, cancel).await;
        match rx.recv().await {
            Some(DownloadEvent::Failed(msg)) => assert!(msg.contains("quality")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn preset_cancel_flag_aborts_without_probing() {
        let (tx, mut rx) = unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(true));
        run_download(request(DownloadMode::AudioOnly, None), tx, cancel).await;
        match rx.recv().await {
            Some(DownloadEvent::Failed(msg)) => assert!(msg.contains("cancelled")),
            other => panic!("expected cancellation, got {other:?}"),
        }
        assert!(rx.recv().await.is_none());
    }
}
