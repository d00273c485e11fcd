use std::fmt::Write;

use indicatif::{ProgressBar, ProgressState, ProgressStyle};

/// Displays a progress bar over the repetitions of a workload series.
///
/// The bar is hidden when progress is disabled, so callers can update it unconditionally.
pub struct SeriesProgress {
    bar: ProgressBar,
}

impl SeriesProgress {
    pub fn new(label: &str, repetitions: u32, enabled: bool) -> Self {
        if !enabled {
            return Self {
                bar: ProgressBar::hidden(),
            };
        }

        let bar = ProgressBar::new(u64::from(repetitions));
        match ProgressStyle::with_template(
            "{spinner:.green} {label} [{wide_bar:.cyan/blue}] {pos}/{len} [{elapsed_precise}] {msg}",
        ) {
            Ok(style) => {
                let label = label.to_string();
                bar.set_style(
                    style
                        .with_key("label", move |_state: &ProgressState, w: &mut dyn Write| {
                            let _ = write!(w, "{label}");
                        })
                        .progress_chars("#>-"),
                );
            }
            Err(e) => log::debug!("Failed to set progress style: {e}"),
        }

        Self { bar }
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.bar.set_message(message.into());
    }

    pub fn repetition_done(&self) {
        self.bar.inc(1);
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
