use std::sync::Arc;

use indicatif::ProgressBar;

use crate::ui::renderer::ProgressHandle;

pub const PROGRESS_LENGTH: u64 = 100;

#[derive(Debug, Default)]
pub struct NoopProgressHandle;

impl ProgressHandle for NoopProgressHandle {
    fn set_percent(&self, _percent: f64) {}

    fn finish_success(&self, _message: &str) {}

    fn finish_error(&self, _message: &str) {}
}

#[derive(Debug, Clone)]
pub struct IndicatifProgressHandle {
    progress: Arc<ProgressBar>,
}

impl IndicatifProgressHandle {
    pub fn new(progress: ProgressBar) -> Self {
        Self {
            progress: Arc::new(progress),
        }
    }
}

impl ProgressHandle for IndicatifProgressHandle {
    fn set_percent(&self, percent: f64) {
        self.progress
            .set_position(percent_position(percent));
    }

    fn finish_success(&self, message: &str) {
        self.progress.set_position(PROGRESS_LENGTH);
        self.progress.finish_with_message(message.to_owned());
    }

    fn finish_error(&self, message: &str) {
        self.progress.abandon_with_message(message.to_owned());
    }
}

pub(crate) fn percent_position(percent: f64) -> u64 {
    if percent.is_nan() {
        return 0;
    }
    percent.clamp(0.0, 100.0).round() as u64
}
