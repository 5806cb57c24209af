//! Progress sink: turns the extractor's progress-template lines into
//! `ProgressState` updates and human-readable captions.

use crate::model::{Phase, ProgressState};

/// Passed to `yt-dlp --progress-template`; every progress hook invocation
/// becomes one `PROG|...`-prefixed line on stdout (with `--newline`).
pub const PROGRESS_TEMPLATE: &str = "download:PROG|%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress._percent_str)s";

const LINE_PREFIX: &str = "PROG|";

/// One normalized event parsed from a progress-template line.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    Downloading {
        /// Percent reported directly by the extractor, when parseable
        percent: Option<f32>,
        downloaded: u64,
        /// Known total, or the extractor's estimate when the total is absent
        total: Option<u64>,
        /// Bytes per second
        rate: Option<f64>,
    },
    /// Transfer done; the extractor may still be muxing/transcoding
    Finished,
}

/// Parses one stdout line. Non-progress lines and lines with an unparseable
/// status yield `None`; malformed numeric fields degrade to absent fields
/// rather than dropping the whole event.
pub fn parse_line(line: &str) -> Option<ProgressEvent> {
    let rest = line.trim().strip_prefix(LINE_PREFIX)?;
    let mut fields = rest.split('|');
    let status = fields.next()?;
    let downloaded = fields.next().and_then(parse_u64).unwrap_or(0);
    let total = fields.next().and_then(parse_u64);
    let estimate = fields.next().and_then(parse_u64);
    let rate = fields.next().and_then(parse_f64);
    let percent = fields.next().and_then(parse_percent);

    match status {
        "downloading" => Some(ProgressEvent::Downloading {
            percent,
            downloaded,
            total: total.filter(|t| *t > 0).or(estimate.filter(|t| *t > 0)),
            rate,
        }),
        "finished" => Some(ProgressEvent::Finished),
        _ => None,
    }
}

fn parse_u64(field: &str) -> Option<u64> {
    let field = field.trim();
    // yt-dlp renders some byte counts as floats
    field
        .parse::<u64>()
        .ok()
        .or_else(|| field.parse::<f64>().ok().filter(|v| *v >= 0.0).map(|v| v as u64))
}

fn parse_f64(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Parses a percent string like "  42.3%"; anything outside [0, 100] or not a
/// number is treated as absent.
fn parse_percent(field: &str) -> Option<f32> {
    let number = field.trim().strip_suffix('%').unwrap_or(field.trim());
    number
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite() && (0.0..=100.0).contains(v))
}

/// Applies one event to the progress state.
///
/// Percent resolution order: the extractor's own percent string first, then
/// `floor(downloaded / total * 100)` when a positive total is known, otherwise
/// the percentage is left alone and only the byte counters move. The percent
/// never decreases within an attempt.
pub fn apply(state: &mut ProgressState, event: &ProgressEvent) {
    match event {
        ProgressEvent::Downloading { percent, downloaded, total, rate } => {
            state.phase = Phase::Downloading;
            state.total_bytes = total.or(state.total_bytes);
            // Invariant: downloaded never exceeds a known total
            state.downloaded_bytes = match state.total_bytes {
                Some(t) => (*downloaded).min(t),
                None => *downloaded,
            };
            state.transfer_rate = *rate;

            let resolved = percent.or_else(|| match state.total_bytes {
                Some(t) if t > 0 => {
                    Some(((state.downloaded_bytes as f64 / t as f64) * 100.0).floor() as f32)
                }
                _ => None,
            });
            if let Some(p) = resolved {
                let p = p.clamp(0.0, 100.0);
                if p > state.percent {
                    state.percent = p;
                }
            }
        }
        ProgressEvent::Finished => {
            state.percent = 100.0;
            state.phase = Phase::Finalizing;
        }
    }
}

/// Converts a byte count to a human-readable string using binary units:
/// whole bytes below 1 KB, two decimals for KB/MB/GB.
pub fn format_size(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;
    if bytes < KB {
        format!("{} B", bytes as u64)
    } else if bytes < MB {
        format!("{:.2} KB", bytes / KB)
    } else if bytes < GB {
        format!("{:.2} MB", bytes / MB)
    } else {
        format!("{:.2} GB", bytes / GB)
    }
}

/// Caption under the ring: transferred / total and rate, whichever are known.
pub fn size_caption(state: &ProgressState) -> Option<String> {
    if state.phase == Phase::Finalizing {
        return Some("Merging streams...".to_string());
    }
    if state.downloaded_bytes == 0 && state.total_bytes.is_none() {
        return None;
    }
    let rate = state
        .transfer_rate
        .map(|r| format!(" at {}/s", format_size(r)))
        .unwrap_or_default();
    Some(match state.total_bytes {
        Some(total) => format!(
            "{} / {}{}",
            format_size(state.downloaded_bytes as f64),
            format_size(total as f64),
            rate
        ),
        None => format!("{}{}", format_size(state.downloaded_bytes as f64), rate),
    })
}
