// OverDrive Tools - Audiobook chapter lookup and loan downloads
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Download progress tracking and reporting
//!
//! # Progress Information
//! - Part number and file name for identification
//! - Bytes downloaded / total bytes (when the server sends a length)
//! - Current speed with a moving average
//! - Estimated time remaining
//! - Percentage complete

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Lifecycle of a single part download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Receiving data from the content server
    Downloading,
    /// File is complete under its final name
    Completed,
    /// Output file already existed
    Skipped,
    /// Download failed with error
    Failed,
}

/// Progress snapshot for one part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub part_number: u32,

    /// Total number of parts in the loan
    pub part_count: usize,

    /// Output file name
    pub file_name: String,

    pub bytes_downloaded: u64,

    /// Total bytes to download (0 if unknown)
    pub total_bytes: u64,

    /// Percentage complete (0.0 - 100.0)
    pub percent_complete: f64,

    /// Bytes per second
    pub download_speed: f64,

    /// Estimated time remaining in seconds (0 if unknown)
    pub eta_seconds: u64,

    pub state: DownloadState,

    /// Set when state is Failed
    pub error_message: Option<String>,
}

impl DownloadProgress {
    pub fn new(part_number: u32, part_count: usize, file_name: String, total_bytes: u64) -> Self {
        Self {
            part_number,
            part_count,
            file_name,
            bytes_downloaded: 0,
            total_bytes,
            percent_complete: 0.0,
            download_speed: 0.0,
            eta_seconds: 0,
            state: DownloadState::Downloading,
            error_message: None,
        }
    }

    /// Whether the server announced a content length
    pub fn has_total(&self) -> bool {
        self.total_bytes > 0
    }

    pub fn calculate_percentage(&mut self) {
        if self.total_bytes > 0 {
            self.percent_complete =
                (self.bytes_downloaded as f64 / self.total_bytes as f64) * 100.0;
        } else {
            self.percent_complete = 0.0;
        }
    }

    pub fn calculate_eta(&mut self) {
        if self.download_speed > 0.0 && self.total_bytes > 0 {
            let remaining_bytes = self.total_bytes.saturating_sub(self.bytes_downloaded);
            self.eta_seconds = (remaining_bytes as f64 / self.download_speed) as u64;
        } else {
            self.eta_seconds = 0;
        }
    }

    /// e.g. "2.5 MB/s"
    pub fn speed_string(&self) -> String {
        format!("{:.1} MB/s", self.download_speed / 1_000_000.0)
    }

    /// e.g. "5m 30s"
    pub fn eta_string(&self) -> String {
        if self.eta_seconds == 0 {
            return "calculating...".to_string();
        }

        let hours = self.eta_seconds / 3600;
        let minutes = (self.eta_seconds % 3600) / 60;
        let seconds = self.eta_seconds % 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// e.g. "45.2 MB"
    pub fn bytes_string(bytes: u64) -> String {
        format!("{:.1} MB", bytes as f64 / 1_000_000.0)
    }

    /// One status line, prefixed with `Part i/n`
    pub fn display_string(&self) -> String {
        let prefix = format!(
            "Part {}/{} ({})",
            self.part_number, self.part_count, self.file_name
        );
        match self.state {
            DownloadState::Downloading if self.has_total() => format!(
                "{}: {:.1}% ({} / {}) - {} - {}",
                prefix,
                self.percent_complete,
                Self::bytes_string(self.bytes_downloaded),
                Self::bytes_string(self.total_bytes),
                self.speed_string(),
                self.eta_string()
            ),
            DownloadState::Downloading => format!(
                "{}: {} - {}",
                prefix,
                Self::bytes_string(self.bytes_downloaded),
                self.speed_string()
            ),
            DownloadState::Completed => format!("{}: Completed", prefix),
            DownloadState::Skipped => format!("{}: Already downloaded", prefix),
            DownloadState::Failed => format!(
                "{}: Failed - {}",
                prefix,
                self.error_message.as_deref().unwrap_or("Unknown error")
            ),
        }
    }
}

/// Moving-average download speed over a sliding time window
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,
    /// Total bytes at this point in time
    position: u64,
}

impl SpeedTracker {
    /// 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Record the total bytes downloaded so far
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        while let Some(sample) = self.samples.front() {
            if now.duration_since(sample.timestamp) > self.window_duration {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Bytes per second across the window
    pub fn average_speed(&self) -> f64 {
        let (Some(first), Some(last)) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress snapshot plus speed tracking for one part
#[derive(Debug)]
pub struct ProgressTracker {
    progress: DownloadProgress,
    speed_tracker: SpeedTracker,
    start_time: Instant,
}

impl ProgressTracker {
    pub fn new(part_number: u32, part_count: usize, file_name: String, total_bytes: u64) -> Self {
        Self {
            progress: DownloadProgress::new(part_number, part_count, file_name, total_bytes),
            speed_tracker: SpeedTracker::new(),
            start_time: Instant::now(),
        }
    }

    /// Record the new byte position and refresh derived fields
    pub fn update(&mut self, bytes_downloaded: u64) {
        self.progress.bytes_downloaded = bytes_downloaded;
        self.speed_tracker.add_position(bytes_downloaded);

        self.progress.download_speed = self.speed_tracker.average_speed();
        self.progress.calculate_percentage();
        self.progress.calculate_eta();
    }

    pub fn set_state(&mut self, state: DownloadState) {
        self.progress.state = state;
    }

    /// Mark as Failed with a message
    pub fn set_error(&mut self, message: String) {
        self.progress.state = DownloadState::Failed;
        self.progress.error_message = Some(message);
    }

    pub fn get_progress(&self) -> &DownloadProgress {
        &self.progress
    }

    pub fn clone_progress(&self) -> DownloadProgress {
        self.progress.clone()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
