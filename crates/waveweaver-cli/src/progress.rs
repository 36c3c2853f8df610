use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use waveweaver_core::separation::Notification;

/// How the job ended, as far as the terminal is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ending {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Terminal progress bar fed by monitor notifications
pub struct CliProgress {
    pb: ProgressBar,
    ending: Ending,
}

impl CliProgress {
    pub fn new() -> Result<Self> {
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}",
            )?
            .progress_chars("#>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(120));
        Ok(Self {
            pb,
            ending: Ending::Running,
        })
    }

    pub fn ending(&self) -> Ending {
        self.ending
    }

    /// Print a line above the bar
    pub fn notice(&self, message: &str) {
        self.pb.println(message);
    }

    pub fn render(&mut self, notification: Notification) {
        match notification {
            Notification::Progress(value) => self.pb.set_position(value as u64),
            Notification::Status(text) => self.pb.set_message(text.replace('\n', " | ")),
            Notification::ErrorMessage(message) => {
                self.pb.println(format!("Error: {}", message));
            }
            Notification::ExtractionFailed => {
                self.ending = Ending::Failed;
                self.pb.abandon_with_message("Extraction failed!");
            }
            Notification::Completed { files, elapsed } => {
                self.ending = Ending::Completed;
                self.pb.finish_with_message(format!(
                    "Extraction complete! ({:.1}s)",
                    elapsed.as_secs_f64()
                ));
                for file in files {
                    println!("{}", file.display());
                }
            }
            Notification::Cancelled => {
                self.ending = Ending::Cancelled;
                self.pb.abandon_with_message("Operation cancelled!");
            }
        }
    }
}
