//! Progress display for batch conversion using indicatif

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tracing::info;

/// Creates progress bars when enabled, `None` otherwise
pub struct ProgressTracker {
    enabled: bool,
}

impl ProgressTracker {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bar over a known number of files
    pub fn create_file_progress(&self, total: usize, operation: &str) -> Option<ProgressBar> {
        if !self.enabled || total == 0 {
            return None;
        }

        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );
        pb.set_message(format!("{}...", operation));
        pb.enable_steady_tick(Duration::from_millis(100));

        info!("Started progress tracking for: {}", operation);
        Some(pb)
    }

    /// Spinner for a single conversion
    pub fn create_spinner(&self, message: &str) -> Option<ProgressBar> {
        if !self.enabled {
            return None;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    }

    pub fn update_progress(pb: &Option<ProgressBar>, increment: u64, message: Option<&str>) {
        if let Some(progress) = pb {
            progress.inc(increment);
            if let Some(msg) = message {
                progress.set_message(msg.to_string());
            }
        }
    }

    /// Print a line above the bar, or to stderr when there is no bar
    pub fn println(pb: &Option<ProgressBar>, line: &str) {
        match pb {
            Some(progress) => progress.println(line),
            None => eprintln!("{}", line),
        }
    }

    pub fn finish_progress(pb: Option<ProgressBar>, success_message: &str) {
        if let Some(progress) = pb {
            progress.finish_with_message(success_message.to_string());
            info!("Progress completed: {}", success_message);
        }
    }

    pub fn finish_with_error(pb: Option<ProgressBar>, error_message: &str) {
        if let Some(progress) = pb {
            progress.abandon_with_message(format!("❌ {}", error_message));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_tracker_creation() {
        assert!(ProgressTracker::new(true).is_enabled());
        assert!(!ProgressTracker::new(false).is_enabled());
    }

    #[test]
    fn test_progress_bar_creation() {
        assert!(ProgressTracker::new(false).create_file_progress(10, "Converting").is_none());
        assert!(ProgressTracker::new(true).create_file_progress(0, "Converting").is_none());

        let pb = ProgressTracker::new(true).create_file_progress(3, "Converting");
        assert!(pb.is_some());
        ProgressTracker::update_progress(&pb, 2, Some("two done"));
        assert_eq!(pb.as_ref().map(|p| p.position()), Some(2));
        ProgressTracker::finish_progress(pb, "done");
    }

    #[test]
    fn test_spinner_creation() {
        assert!(ProgressTracker::new(true).create_spinner("Converting...").is_some());
        assert!(ProgressTracker::new(false).create_spinner("Converting...").is_none());
    }
}
