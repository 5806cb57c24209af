use std::path::PathBuf;

use crate::error::RequestError;

/// What the user asked to download
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DownloadMode {
    /// Best video at or below the selected height, merged with best audio
    VideoAndAudio,
    /// Best audio stream, transcoded to mp3 after download
    AudioOnly,
}

/// Phase of the current download attempt
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Phase {
    /// No attempt in progress
    #[default]
    Idle,
    /// Transfer running, progress events arriving
    Downloading,
    /// Extractor signalled "finished"; muxing/transcoding may still run
    Finalizing,
    /// Child process exited successfully
    Complete,
    /// Attempt aborted; downloaded/total are not trusted for display
    Failed,
}

/// Progress of the current download attempt.
///
/// Written only by the progress sink (`apply` in the `progress` module) on the
/// interaction thread; read-only to the ring widget and the caption labels.
#[derive(Clone, Debug, Default)]
pub struct ProgressState {
    /// Normalized percentage in [0, 100], monotonic within one attempt
    pub percent: f32,
    /// Bytes transferred so far for the current file
    pub downloaded_bytes: u64,
    /// Total (or estimated total) bytes, when the extractor reports one
    pub total_bytes: Option<u64>,
    /// Transfer rate in bytes per second, when reported
    pub transfer_rate: Option<f64>,
    /// Current phase of the attempt
    pub phase: Phase,
}

impl ProgressState {
    /// Returns to the zeroed idle state at the start of a new attempt.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Marks the attempt failed; displayed progress drops back to 0.
    pub fn fail(&mut self) {
        self.percent = 0.0;
        self.phase = Phase::Failed;
    }
}

/// A request for one download; constructed when the user clicks Download,
/// never mutated, consumed exactly once by the orchestrator.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    pub url: String,
    pub dest_dir: Option<PathBuf>,
    pub mode: DownloadMode,
    /// Selected vertical resolution; `None` is the "Select Quality" sentinel
    pub quality: Option<u32>,
}

impl DownloadRequest {
    /// Local pre-flight checks; nothing external runs until these pass.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.url.trim().is_empty() {
            return Err(RequestError::EmptyUrl);
        }
        if self.dest_dir.is_none() {
            return Err(RequestError::NoDestination);
        }
        if self.mode == DownloadMode::VideoAndAudio && self.quality.is_none() {
            return Err(RequestError::NoQuality);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> DownloadRequest {
        DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc123".to_string(),
            dest_dir: Some(PathBuf::from("/tmp/downloads")),
            mode: DownloadMode::VideoAndAudio,
            quality: Some(720),
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn blank_url_rejected() {
        let mut req = request();
        req.url = "   ".to_string();
        assert!(matches!(req.validate(), Err(RequestError::EmptyUrl)));
    }

    #[test]
    fn missing_folder_rejected() {
        let mut req = request();
        req.dest_dir = None;
        assert!(matches!(req.validate(), Err(RequestError::NoDestination)));
    }

    #[test]
    fn video_mode_needs_concrete_quality() {
        let mut req = request();
        req.quality = None;
        assert!(matches!(req.validate(), Err(RequestError::NoQuality)));
    }

    #[test]
    fn audio_only_needs_no_quality() {
        let mut req = request();
        req.mode = DownloadMode::AudioOnly;
        req.quality = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn failure_resets_displayed_progress() {
        let mut state = ProgressState {
            percent: 73.0,
            downloaded_bytes: 9000,
            phase: Phase::Downloading,
            ..Default::default()
        };
        state.fail();
        assert_eq!(state.percent, 0.0);
        assert_eq!(state.phase, Phase::Failed);
    }
}
