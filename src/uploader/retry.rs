use std::collections::HashSet;

use crate::commands::{UploadProgress, UploadResult, UploadTask};
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

use super::upload_queue::process_upload_batch;
use super::ImageUploader;

/// Narrow `task` down to the files that failed in `previous`.
pub fn retry_task(task: &UploadTask, previous: &UploadResult) -> AppResult<UploadTask> {
    let listing_id = InputValidator::validate_listing_id(task.listing_id)?;

    let failed: HashSet<&str> = previous.failed_files.iter().map(|f| f.name.as_str()).collect();
    let files: Vec<_> = InputValidator::normalize_files(task.kind, listing_id, &task.files)
        .into_iter()
        .filter(|f| failed.contains(f.name.as_str()))
        .collect();

    if files.is_empty() {
        return Err(AppError::validation("files", "No failed uploads to retry"));
    }

    Ok(UploadTask {
        listing_id: Some(listing_id),
        kind: task.kind,
        files,
    })
}

/// Retry a failed upload batch
pub async fn retry_failed_uploads<U, F>(
    uploader: &U,
    task: &UploadTask,
    previous: &UploadResult,
    on_progress: F,
) -> AppResult<UploadResult>
where
    U: ImageUploader + ?Sized,
    F: FnMut(UploadProgress),
{
    let retry = retry_task(task, previous)?;
    log::info!(
        "Retrying {} failed upload(s) for {} {}",
        retry.files.len(),
        retry.kind,
        retry.listing_id.unwrap_or_default()
    );
    process_upload_batch(uploader, &retry, on_progress).await
}

/// Fold the outcome of a retry into the batch it retried. Failures are
/// replaced by whatever still failed; URLs are appended without duplicates.
pub fn merge_results(previous: UploadResult, retried: UploadResult) -> UploadResult {
    let mut seen: HashSet<String> = previous.succeeded_urls.iter().cloned().collect();
    let mut succeeded_urls = previous.succeeded_urls;

    for url in retried.succeeded_urls {
        if seen.insert(url.clone()) {
            succeeded_urls.push(url);
        }
    }

    UploadResult {
        total: previous.total,
        succeeded_urls,
        failed_files: retried.failed_files,
    }
}
