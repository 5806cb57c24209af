//! Metadata probe: asks the extractor for the JSON dump of a URL off the
//! interaction thread and reduces it to the available quality list.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::downloader::{resolve_binary, stderr_tail};
use crate::error::ExtractError;

/// Upper bound on one metadata query; a hung network call surfaces as a
/// failure instead of hanging forever.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// The slice of `yt-dlp -J` output this application cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub formats: Vec<FormatInfo>,
}

/// One format descriptor; only the vertical resolution matters here.
#[derive(Debug, Clone, Deserialize)]
pub struct FormatInfo {
    #[serde(default)]
    pub height: Option<u32>,
}

/// Distinct vertical resolutions across all formats, descending.
/// Formats without a height (audio-only, storyboards) are ignored.
pub fn available_heights(formats: &[FormatInfo]) -> Vec<u32> {
    let set: BTreeSet<u32> = formats.iter().filter_map(|f| f.height).collect();
    set.into_iter().rev().collect()
}

/// Runs the JSON probe for one URL and parses the dump.
pub async fn fetch_metadata(url: &str) -> Result<MediaInfo, ExtractError> {
    let bin = resolve_binary()?;
    let output = tokio::time::timeout(
        PROBE_TIMEOUT,
        Command::new(bin)
            .args(["--quiet", "--no-warnings", "-J", url])
            .kill_on_drop(true)
            .output(),
    )
    .await
    .map_err(|_| ExtractError::Timeout)??;

    if !output.status.success() {
        return Err(ExtractError::Failed(stderr_tail(&output.stderr)));
    }
    Ok(serde_json::from_slice(&output.stdout)?)
}

/// Result of one probe invocation, tagged with the generation it answers.
#[derive(Debug)]
pub enum ProbeOutcome {
    Qualities {
        heights: Vec<u32>,
        title: Option<String>,
        thumbnail: Option<String>,
    },
    Failed(String),
}

/// Worker body: exactly one of {success, failure} is sent per invocation.
/// The receiver drops outcomes whose generation is no longer current.
pub async fn run_probe(generation: u64, url: String, tx: UnboundedSender<(u64, ProbeOutcome)>) {
    info!(%url, "probing available qualities");
    let outcome = match fetch_metadata(&url).await {
        Ok(info) => {
            let heights = available_heights(&info.formats);
            info!(%url, count = heights.len(), "quality probe finished");
            ProbeOutcome::Qualities {
                heights,
                title: info.title,
                thumbnail: info.thumbnail,
            }
        }
        Err(err) => {
            warn!(%url, error = %err, "quality probe failed");
            ProbeOutcome::Failed(err.to_string())
        }
    };
    // The receiver half may be gone if the app is shutting down
    let _ = tx.send((generation, outcome));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(height: Option<u32>) -> FormatInfo {
        FormatInfo { height }
    }

    #[test]
    fn heights_deduplicated_and_descending() {
        let formats = vec![fmt(Some(720)), fmt(Some(1080)), fmt(Some(720)), fmt(Some(480)), fmt(None)];
        assert_eq!(available_heights(&formats), vec![1080, 720, 480]);
    }

    #[test]
    fn no_heights_is_a_valid_empty_result() {
        assert_eq!(available_heights(&[]), Vec::<u32>::new());
        assert_eq!(available_heights(&[fmt(None), fmt(None)]), Vec::<u32>::new());
    }

    #[test]
    fn json_dump_parses_with_missing_fields() {
        let dump = r#"{
            "title": "Test clip",
            "formats": [
                { "format_id": "18", "height": 360, "ext": "mp4" },
                { "format_id": "140", "ext": "m4a" },
                { "format_id": "137", "height": 1080 }
            ]
        }"#;
        let info: MediaInfo = serde_json::from_str(dump).unwrap();
        assert_eq!(info.title.as_deref(), Some("Test clip"));
        assert_eq!(info.thumbnail, None);
        assert_eq!(available_heights(&info.formats), vec![1080, 360]);
    }

    #[test]
    fn empty_dump_parses() {
        let info: MediaInfo = serde_json::from_str("{}").unwrap();
        assert!(info.formats.is_empty());
        assert_eq!(info.title, None);
    }
}
