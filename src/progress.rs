//! Spinner for the data-connection receive loop

use crossterm::style::{Color, Stylize};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

pub struct ReceiveProgress {
    spinner: ProgressBar,
    start_time: Instant,
    bytes: u64,
}

impl ReceiveProgress {
    pub fn new(label: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message(label.to_string());
        Self {
            spinner,
            start_time: Instant::now(),
            bytes: 0,
        }
    }

    /// Draws nothing; used when --progress is off.
    pub fn hidden() -> Self {
        Self {
            spinner: ProgressBar::hidden(),
            start_time: Instant::now(),
            bytes: 0,
        }
    }

    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
        if self.spinner.is_hidden() {
            return;
        }
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        let throughput = if elapsed_secs > 0.1 {
            format!(" @ {:.1} KB/s", self.bytes as f64 / elapsed_secs / 1024.0)
        } else {
            String::new()
        };
        self.spinner.set_message(format!(
            "{} {} bytes in {:.1}s{}",
            "Receiving".with(Color::Green).bold(),
            self.bytes,
            elapsed_secs,
            throughput
        ));
    }

    pub fn finish_success(&self) {
        self.spinner.finish_with_message(format!(
            "{} {} bytes in {:.1}s",
            "Completed".with(Color::Green).bold(),
            self.bytes,
            self.start_time.elapsed().as_secs_f64()
        ));
    }

    pub fn finish_error(&self, msg: &str) {
        self.spinner
            .finish_with_message(format!("{} {}", "Failed".with(Color::Red).bold(), msg));
    }
}
