use std::collections::HashSet;

use crate::commands::{FailedUpload, ListingKind, LocalFile, UploadProgress, UploadResult, UploadTask};
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;

use super::marketplace_client::extract_image_urls;
use super::progress_tracker::ProgressTracker;
use super::ImageUploader;

const NO_URL_RETURNED: &str = "No image URL returned";

/// Upload every file of `task` to its listing, one request per file, in
/// input order.
///
/// A failing file is recorded in `failed_files` and the batch moves on. The
/// call only fails when its preconditions are not met (no network activity
/// happens then) or when no file produced a URL, in which case the error
/// carries the first per-file message.
///
/// `on_progress` is called before and after each attempt and once more with
/// the `"Complete"` marker. The batch has no cancellation of its own; drop
/// the future to abandon it.
pub async fn process_upload_batch<U, F>(
    uploader: &U,
    task: &UploadTask,
    on_progress: F,
) -> AppResult<UploadResult>
where
    U: ImageUploader + ?Sized,
    F: FnMut(UploadProgress),
{
    let listing_id = InputValidator::validate_listing_id(task.listing_id)?;
    let files = InputValidator::prepare_files(task.kind, listing_id, &task.files)?;

    let batch_id = uuid::Uuid::new_v4();
    log::info!(
        "Batch {}: uploading {} image(s) to {} {}",
        batch_id,
        files.len(),
        task.kind,
        listing_id
    );

    let mut tracker = ProgressTracker::new(files.len(), on_progress);
    let mut succeeded_urls: Vec<String> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut failed_files: Vec<FailedUpload> = Vec::new();

    for file in &files {
        tracker.begin_file(&file.name);

        match upload_single_file(uploader, task.kind, listing_id, file).await {
            Ok(urls) if urls.iter().all(|url| url.trim().is_empty()) => {
                log::error!("Batch {}: {} stored but no URL came back", batch_id, file.name);
                failed_files.push(FailedUpload {
                    name: file.name.clone(),
                    error: NO_URL_RETURNED.to_string(),
                });
            }
            Ok(urls) => {
                // URLs another file already returned are not stored twice
                let before = succeeded_urls.len();
                for url in urls {
                    if url.trim().is_empty() || seen_urls.contains(&url) {
                        continue;
                    }
                    seen_urls.insert(url.clone());
                    succeeded_urls.push(url);
                }
                log::debug!(
                    "Batch {}: {} stored ({} new URL(s))",
                    batch_id,
                    file.name,
                    succeeded_urls.len() - before
                );
            }
            Err(e) => {
                log::error!("Batch {}: upload of {} failed: {}", batch_id, file.name, e);
                failed_files.push(FailedUpload {
                    name: file.name.clone(),
                    error: e.user_message(),
                });
            }
        }

        tracker.finish_file();
    }

    tracker.complete();

    if succeeded_urls.is_empty() {
        let reason = failed_files
            .first()
            .map(|f| f.error.clone())
            .unwrap_or_else(|| "All uploads failed".to_string());
        log::error!("Batch {}: no image uploaded: {}", batch_id, reason);
        return Err(AppError::AllUploadsFailed { reason });
    }

    log::info!(
        "Batch {}: {} URL(s) stored, {} file(s) failed",
        batch_id,
        succeeded_urls.len(),
        failed_files.len()
    );

    Ok(UploadResult {
        total: files.len(),
        succeeded_urls,
        failed_files,
    })
}

async fn upload_single_file<U>(
    uploader: &U,
    kind: ListingKind,
    listing_id: i64,
    file: &LocalFile,
) -> AppResult<Vec<String>>
where
    U: ImageUploader + ?Sized,
{
    let body = uploader
        .upload_images(kind, listing_id, std::slice::from_ref(file))
        .await?;
    extract_image_urls(body)
}
