use crate::commands::{UploadProgress, COMPLETE_MARKER};

/// Owns the progress of one batch and reports every change to the caller's
/// callback. `uploaded` only ever moves forward.
pub struct ProgressTracker<F>
where
    F: FnMut(UploadProgress),
{
    progress: UploadProgress,
    on_progress: F,
}

impl<F> ProgressTracker<F>
where
    F: FnMut(UploadProgress),
{
    pub fn new(total: usize, on_progress: F) -> Self {
        Self {
            progress: UploadProgress {
                total,
                uploaded: 0,
                current: "Starting...".to_string(),
            },
            on_progress,
        }
    }

    #[cfg(test)]
    fn snapshot(&self) -> &UploadProgress {
        &self.progress
    }

    fn emit(&mut self) {
        (self.on_progress)(self.progress.clone());
    }

    /// Announce the file about to be uploaded.
    pub fn begin_file(&mut self, name: &str) {
        self.progress.current = name.to_string();
        log::debug!(
            "Progress: uploading {} ({}/{})",
            name,
            self.progress.uploaded + 1,
            self.progress.total
        );
        self.emit();
    }

    /// Count the current file as processed, whatever its outcome.
    pub fn finish_file(&mut self) {
        if self.progress.uploaded < self.progress.total {
            self.progress.uploaded += 1;
        }
        self.emit();
    }

    pub fn complete(&mut self) {
        self.progress.uploaded = self.progress.total;
        self.progress.current = COMPLETE_MARKER.to_string();
        self.emit();
    }
}
