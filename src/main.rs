//! Main application for the video downloader GUI

// Download orchestration and extractor spawning
mod downloader;
// Error taxonomy for validation and extractor failures
mod error;
// Data models: request, mode, progress state
mod model;
// Background metadata probe (available qualities)
mod probe;
// Progress sink: template-line parsing and normalization
mod progress;
// Circular progress widget
mod ring;
// Thumbnail fetching for the preview pane
mod thumbnail;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use eframe::{App, Frame, egui};
use egui::{Color32, ColorImage, TextureOptions, Visuals};
use once_cell::sync::OnceCell;
use rfd::FileDialog;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing_subscriber::EnvFilter;

use downloader::DownloadEvent;
use model::{DownloadMode, DownloadRequest, Phase, ProgressState};
use probe::ProbeOutcome;
use ring::CircularProgress;

// Global Tokio runtime stored in a OnceCell for lazy init
static RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

/// Program entry point: initializes logging and the runtime, launches the GUI
fn main() -> Result<(), eframe::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Create a new Tokio runtime and store it globally
    let rt = Arc::new(Runtime::new().expect("failed to start tokio runtime"));
    RUNTIME.set(rt).expect("runtime initialized twice");

    let options = eframe::NativeOptions::default();
    eframe::run_native(
        "Video Downloader",
        options,
        Box::new(|cc| {
            cc.egui_ctx.set_visuals(Visuals::dark());
            Box::new(DownloaderApp::default())
        }),
    )
}

/// Application-level status; the presentation layer maps this to colors so
/// state transitions stay free of style strings.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
enum AppStatus {
    #[default]
    Idle,
    Fetching,
    Downloading,
    Finalizing,
    Complete,
    Error,
}

/// Pure status → visual treatment mapping
fn status_color(status: AppStatus) -> Color32 {
    match status {
        AppStatus::Idle => Color32::from_rgb(0xcd, 0xd6, 0xf4),
        AppStatus::Fetching | AppStatus::Downloading | AppStatus::Finalizing => {
            Color32::from_rgb(0x89, 0xb4, 0xfa)
        }
        AppStatus::Complete => Color32::from_rgb(0xa6, 0xe3, 0xa1),
        AppStatus::Error => Color32::from_rgb(0xf3, 0x8b, 0xa8),
    }
}

/// Application state for the GUI
struct DownloaderApp {
    /// Input field for the video URL
    url_input: String,
    /// Destination folder for downloads; `None` until the user picks one
    dest_dir: Option<PathBuf>,
    /// Selected download type
    mode: DownloadMode,
    /// Available quality options, descending
    qualities: Vec<u32>,
    /// Selected quality; `None` is the "Select Quality" sentinel
    selected_quality: Option<u32>,
    /// Enumerated status plus the line of text shown for it
    status: AppStatus,
    status_line: String,
    /// Title from the last successful probe, shown with the result
    video_title: Option<String>,
    /// Progress of the current download attempt
    progress: ProgressState,
    /// Probe results channel; one receiver per fetch, tagged by generation
    probe_rx: Option<UnboundedReceiver<(u64, ProbeOutcome)>>,
    probe_generation: u64,
    /// Busy flag: at most one metadata query in flight
    probe_in_flight: bool,
    /// Download events channel; present while a transfer is in flight
    download_rx: Option<UnboundedReceiver<DownloadEvent>>,
    /// Cancel flag handed to the in-flight download worker
    cancel_flag: Option<Arc<AtomicBool>>,
    /// Incoming thumbnail fetch results
    thumbnail_results: Arc<Mutex<Vec<ColorImage>>>,
    /// Texture for the current thumbnail preview
    thumbnail_tex: Option<egui::TextureHandle>,
}

impl Default for DownloaderApp {
    fn default() -> Self {
        Self {
            url_input: String::new(),
            dest_dir: None,
            mode: DownloadMode::VideoAndAudio,
            qualities: Vec::new(),
            selected_quality: None,
            status: AppStatus::Idle,
            status_line: String::new(),
            video_title: None,
            progress: ProgressState::default(),
            probe_rx: None,
            probe_generation: 0,
            probe_in_flight: false,
            download_rx: None,
            cancel_flag: None,
            thumbnail_results: Arc::new(Mutex::new(Vec::new())),
            thumbnail_tex: None,
        }
    }
}

impl DownloaderApp {
    /// Kicks off a metadata probe for the current URL, unless one is already
    /// in flight.
    fn start_fetch(&mut self) {
        let url = self.url_input.trim().to_string();
        if url.is_empty() {
            self.status = AppStatus::Error;
            self.status_line = error::RequestError::EmptyUrl.to_string();
            return;
        }
        // Re-entrancy guard: the button is disabled too, but the flag is the
        // contract
        if self.probe_in_flight {
            return;
        }
        self.probe_generation += 1;
        self.probe_in_flight = true;
        self.status = AppStatus::Fetching;
        self.status_line = "Fetching available qualities...".to_string();

        let (tx, rx) = unbounded_channel();
        self.probe_rx = Some(rx);
        RUNTIME
            .get()
            .expect("runtime initialized")
            .spawn(probe::run_probe(self.probe_generation, url, tx));
    }

    /// Handles one probe outcome; stale generations are dropped. Returns a
    /// thumbnail URL to fetch, if the probe carried one.
    fn on_probe_outcome(&mut self, generation: u64, outcome: ProbeOutcome) -> Option<String> {
        if generation != self.probe_generation {
            return None;
        }
        self.probe_in_flight = false;
        match outcome {
            ProbeOutcome::Qualities { heights, title, thumbnail } => {
                if title.is_some() {
                    self.video_title = title;
                }
                // The list is replaced wholesale on every successful fetch;
                // an empty list is a valid result, distinct from failure
                if heights.is_empty() {
                    self.qualities.clear();
                    self.selected_quality = None;
                    self.status = AppStatus::Idle;
                    self.status_line = "No video qualities found".to_string();
                } else {
                    self.status = AppStatus::Idle;
                    self.status_line = format!("Found {} quality options", heights.len());
                    self.qualities = heights;
                    if self.selected_quality.is_some_and(|q| !self.qualities.contains(&q)) {
                        self.selected_quality = None;
                    }
                }
                thumbnail
            }
            ProbeOutcome::Failed(message) => {
                // The prior quality list is deliberately preserved for retry
                self.status = AppStatus::Error;
                self.status_line = format!("Error: {message}");
                None
            }
        }
    }

    /// Validates and launches a download attempt on a worker task.
    fn start_download(&mut self) {
        let request = DownloadRequest {
            url: self.url_input.trim().to_string(),
            dest_dir: self.dest_dir.clone(),
            mode: self.mode,
            quality: self.selected_quality,
        };
        self.progress.reset();

        if let Err(err) = request.validate() {
            self.status = AppStatus::Error;
            self.status_line = err.to_string();
            return;
        }

        let (tx, rx) = unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(false));
        self.download_rx = Some(rx);
        self.cancel_flag = Some(Arc::clone(&cancel));
        self.status = AppStatus::Downloading;
        self.status_line = "Starting download...".to_string();
        self.progress.phase = Phase::Downloading;

        RUNTIME
            .get()
            .expect("runtime initialized")
            .spawn(downloader::run_download(request, tx, cancel));
    }

    /// Handles one download event; returns a thumbnail URL to fetch, if any.
    fn on_download_event(&mut self, event: DownloadEvent) -> Option<String> {
        match event {
            DownloadEvent::Title(title) => {
                self.status = AppStatus::Downloading;
                self.status_line = format!("🎬 {title}");
                self.video_title = Some(title);
                None
            }
            DownloadEvent::Thumbnail(url) => Some(url),
            DownloadEvent::Progress(event) => {
                progress::apply(&mut self.progress, &event);
                if self.progress.phase == Phase::Finalizing {
                    self.status = AppStatus::Finalizing;
                }
                None
            }
            DownloadEvent::Finished => {
                self.progress.percent = 100.0;
                self.progress.phase = Phase::Complete;
                self.status = AppStatus::Complete;
                self.status_line = match &self.video_title {
                    Some(title) => format!("Downloaded: {title}"),
                    None => "Download complete".to_string(),
                };
                None
            }
            DownloadEvent::Failed(message) => {
                self.progress.fail();
                self.status = AppStatus::Error;
                self.status_line = format!("Error: {message}");
                None
            }
        }
    }

    /// Fetches a thumbnail on a blocking worker; result lands in
    /// `thumbnail_results` and triggers a repaint.
    fn spawn_thumbnail_fetch(&self, url: String, ctx: &egui::Context) {
        let results = Arc::clone(&self.thumbnail_results);
        let ctx = ctx.clone();
        RUNTIME.get().expect("runtime initialized").spawn_blocking(move || {
            if let Some(img) = thumbnail::fetch_thumbnail(&url) {
                results.lock().unwrap().push(img);
                ctx.request_repaint();
            }
        });
    }

    /// Drains worker channels; the only place renderable state is written.
    fn drain_channels(&mut self, ctx: &egui::Context) {
        // Probe results
        if let Some(mut rx) = self.probe_rx.take() {
            let mut done = false;
            while let Ok((generation, outcome)) = rx.try_recv() {
                done |= generation == self.probe_generation;
                if let Some(url) = self.on_probe_outcome(generation, outcome) {
                    self.spawn_thumbnail_fetch(url, ctx);
                }
            }
            if !done {
                self.probe_rx = Some(rx);
            }
        }

        // Download events
        if let Some(mut rx) = self.download_rx.take() {
            let mut terminal = false;
            while let Ok(event) = rx.try_recv() {
                terminal |= matches!(event, DownloadEvent::Finished | DownloadEvent::Failed(_));
                if let Some(url) = self.on_download_event(event) {
                    self.spawn_thumbnail_fetch(url, ctx);
                }
            }
            if terminal {
                self.cancel_flag = None;
            } else {
                self.download_rx = Some(rx);
            }
        }

        // Completed thumbnail fetches
        {
            let mut pending = self.thumbnail_results.lock().unwrap();
            for img in pending.drain(..) {
                let tex = ctx.load_texture("thumbnail", img, TextureOptions::default());
                self.thumbnail_tex = Some(tex);
            }
        }
    }
}

/// GUI update loop: called each frame to redraw and handle interactions
impl App for DownloaderApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        self.drain_channels(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.heading("🎬 Video Downloader");
            ui.add_space(8.0);

            // URL input
            ui.label("Video URL:");
            ui.text_edit_singleline(&mut self.url_input);
            ui.add_space(4.0);

            // Fetch button, disabled while a probe is in flight
            let fetch_label = if self.probe_in_flight {
                "⏳ Fetching..."
            } else {
                "🔍 Fetch Available Qualities"
            };
            if ui
                .add_enabled(!self.probe_in_flight, egui::Button::new(fetch_label))
                .clicked()
            {
                self.start_fetch();
            }
            ui.add_space(8.0);

            // Download type
            ui.label("Download Type:");
            ui.horizontal(|ui| {
                ui.radio_value(&mut self.mode, DownloadMode::VideoAndAudio, "🎥 Video + Audio");
                ui.radio_value(&mut self.mode, DownloadMode::AudioOnly, "🎵 Audio Only");
            });
            ui.add_space(8.0);

            // Quality dropdown; audio-only mode needs no quality
            ui.label("Video Quality:");
            let quality_enabled =
                self.mode == DownloadMode::VideoAndAudio && !self.qualities.is_empty();
            ui.add_enabled_ui(quality_enabled, |ui| {
                let selected_text = match self.selected_quality {
                    Some(q) => format!("{q}p"),
                    None if self.qualities.is_empty() => {
                        "Fetch available qualities first".to_string()
                    }
                    None => "Select Quality".to_string(),
                };
                egui::ComboBox::from_id_source("quality")
                    .selected_text(selected_text)
                    .show_ui(ui, |ui| {
                        for q in &self.qualities {
                            ui.selectable_value(&mut self.selected_quality, Some(*q), format!("{q}p"));
                        }
                    });
            });
            ui.add_space(8.0);

            // Download location
            ui.label("Download Location:");
            ui.horizontal(|ui| {
                match &self.dest_dir {
                    Some(dir) => ui.label(format!("📂 {}", dir.display())),
                    None => ui.colored_label(status_color(AppStatus::Error), "No folder selected"),
                };
                if ui.button("📁 Select Folder").clicked() {
                    if let Some(folder) = FileDialog::new().pick_folder() {
                        self.dest_dir = Some(folder);
                    }
                }
            });
            ui.add_space(8.0);

            // Status line and byte caption
            if !self.status_line.is_empty() {
                ui.colored_label(status_color(self.status), &self.status_line);
            }
            if let Some(caption) = progress::size_caption(&self.progress) {
                ui.colored_label(status_color(AppStatus::Complete), format!("📊 {caption}"));
            }

            // Thumbnail preview, when one arrived
            if let Some(tex) = &self.thumbnail_tex {
                ui.add(egui::Image::new(tex).max_height(90.0));
            }

            // Circular progress indicator
            ui.vertical_centered(|ui| {
                ui.add(CircularProgress::new(self.progress.percent));
            });

            // Download / Cancel
            ui.vertical_centered(|ui| {
                if self.download_rx.is_some() {
                    if ui.button("✖ Cancel").clicked() {
                        if let Some(flag) = &self.cancel_flag {
                            flag.store(true, Ordering::Relaxed);
                        }
                        self.status_line = "Cancelling...".to_string();
                    }
                } else if ui.button("⬇ Download").clicked() {
                    self.start_download();
                }
            });
        });

        // Keep polling worker channels while anything is in flight
        if self.probe_in_flight || self.download_rx.is_some() {
            ctx.request_repaint_after(Duration::from_millis(100));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::ProgressEvent;

    fn qualities(heights: Vec<u32>) -> ProbeOutcome {
        ProbeOutcome::Qualities { heights, title: None, thumbnail: None }
    }

    #[test]
    fn successful_probe_replaces_quality_list() {
        let mut app = DownloaderApp::default();
        app.probe_generation = 1;
        app.probe_in_flight = true;
        app.qualities = vec![480];
        app.selected_quality = Some(480);

        app.on_probe_outcome(1, qualities(vec![1080, 720]));
        assert_eq!(app.qualities, vec![1080, 720]);
        // Stale selection no longer offered, so it resets to the sentinel
        assert_eq!(app.selected_quality, None);
        assert!(!app.probe_in_flight);
        assert_eq!(app.status, AppStatus::Idle);
    }

    #[test]
    fn stale_probe_generations_are_ignored() {
        let mut app = DownloaderApp::default();
        app.probe_generation = 2;
        app.probe_in_flight = true;

        app.on_probe_outcome(1, qualities(vec![720]));
        assert!(app.qualities.is_empty());
        assert!(app.probe_in_flight);
    }

    #[test]
    fn probe_failure_preserves_prior_quality_list() {
        let mut app = DownloaderApp::default();
        app.probe_generation = 1;
        app.probe_in_flight = true;
        app.qualities = vec![1080, 720];

        app.on_probe_outcome(1, ProbeOutcome::Failed("network down".to_string()));
        assert_eq!(app.qualities, vec![1080, 720]);
        assert_eq!(app.status, AppStatus::Error);
        assert!(app.status_line.contains("network down"));
        assert!(!app.probe_in_flight);
    }

    #[test]
    fn empty_probe_result_is_success_and_clears_list() {
        let mut app = DownloaderApp::default();
        app.probe_generation = 1;
        app.probe_in_flight = true;
        app.qualities = vec![720];

        app.on_probe_outcome(1, qualities(Vec::new()));
        assert!(app.qualities.is_empty());
        assert_eq!(app.status, AppStatus::Idle);
    }

    #[test]
    fn busy_flag_blocks_reentrant_fetch() {
        let mut app = DownloaderApp::default();
        app.url_input = "https://example.com/watch?v=x".to_string();
        app.probe_in_flight = true;
        let generation = app.probe_generation;

        app.start_fetch();
        assert_eq!(app.probe_generation, generation);
        assert!(app.probe_rx.is_none());
    }

    #[test]
    fn empty_url_blocks_fetch_locally() {
        let mut app = DownloaderApp::default();
        app.url_input = "   ".to_string();
        app.start_fetch();
        assert_eq!(app.status, AppStatus::Error);
        assert!(!app.probe_in_flight);
        assert!(app.probe_rx.is_none());
    }

    #[test]
    fn invalid_download_request_never_spawns() {
        let mut app = DownloaderApp::default();
        app.url_input = "https://example.com/watch?v=x".to_string();
        app.dest_dir = None;

        app.start_download();
        assert_eq!(app.status, AppStatus::Error);
        assert!(app.download_rx.is_none());
        assert!(app.cancel_flag.is_none());
    }

    #[test]
    fn finished_event_completes_the_attempt() {
        let mut app = DownloaderApp::default();
        app.video_title = Some("Some clip".to_string());
        app.on_download_event(DownloadEvent::Progress(ProgressEvent::Finished));
        assert_eq!(app.status, AppStatus::Finalizing);
        assert_eq!(app.progress.percent, 100.0);

        app.on_download_event(DownloadEvent::Finished);
        assert_eq!(app.status, AppStatus::Complete);
        assert_eq!(app.progress.phase, Phase::Complete);
        assert!(app.status_line.contains("Some clip"));
    }

    #[test]
    fn failed_event_resets_progress_but_keeps_app_usable() {
        let mut app = DownloaderApp::default();
        app.progress.percent = 60.0;
        app.progress.phase = Phase::Downloading;

        app.on_download_event(DownloadEvent::Failed("unsupported URL".to_string()));
        assert_eq!(app.status, AppStatus::Error);
        assert_eq!(app.progress.percent, 0.0);
        assert_eq!(app.progress.phase, Phase::Failed);
        assert!(app.status_line.contains("unsupported URL"));
    }

    #[test]
    fn status_colors_distinguish_outcomes() {
        assert_ne!(status_color(AppStatus::Error), status_color(AppStatus::Complete));
        assert_eq!(status_color(AppStatus::Fetching), status_color(AppStatus::Downloading));
    }
}
