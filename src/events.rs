use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Started { total: usize },
    Submitted { index: usize, prompt: String },
    Saved { index: usize, path: PathBuf },
    Failed { index: usize, error: String },
    Finished { saved: usize },
}

/// Sink for batch progress, handed to the driver explicitly.
pub trait Reporter {
    fn emit(&self, evt: RunEvent);
}

/// Progress bar on stderr plus log lines for each event.
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::no_length();
        if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}") {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ProgressReporter {
    fn emit(&self, evt: RunEvent) {
        match evt {
            RunEvent::Started { total } => {
                self.bar.set_length(total as u64);
                self.bar.suspend(|| tracing::info!("submitting {total} prompt(s)"));
            }
            RunEvent::Submitted { index, prompt } => {
                self.bar.set_message(format!("#{index}"));
                self.bar.suspend(|| tracing::debug!("[{index}] prompt: {prompt}"));
            }
            RunEvent::Saved { index, path } => {
                self.bar.inc(1);
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.bar.suspend(|| tracing::info!("[{index}] saved {name}"));
            }
            RunEvent::Failed { index, error } => {
                self.bar.suspend(|| tracing::error!("[{index}] {error}"));
                self.bar.abandon_with_message(format!("#{index} failed"));
            }
            RunEvent::Finished { saved } => {
                self.bar.finish_and_clear();
                tracing::info!("done, {saved} image(s) saved");
            }
        }
    }
}
