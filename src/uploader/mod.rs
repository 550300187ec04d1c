// Uploader module - runs listing photo batches against the marketplace API
//
// Files are uploaded one request at a time; per-file failures are folded
// into the batch result and retries are left to the caller.

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::{ListingKind, LocalFile};
use crate::errors::AppResult;

pub mod marketplace_client;
pub mod progress_tracker;
pub mod retry;
pub mod upload_queue;

pub use marketplace_client::{MarketplaceClient, MobileListing};
pub use retry::{merge_results, retry_failed_uploads, retry_task};
pub use upload_queue::process_upload_batch;

/// Transport that stores images for a listing and returns the decoded
/// response body.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_images(&self, kind: ListingKind, listing_id: i64, files: &[LocalFile]) -> AppResult<Value>;
}
