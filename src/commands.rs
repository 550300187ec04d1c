use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::AppResult;
use crate::security::InputValidator;
use crate::session::Session;
use crate::uploader::{self, MarketplaceClient, MobileListing};

/// Label reported by the final progress update of a batch.
pub const COMPLETE_MARKER: &str = "Complete";

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    Mobile,
    Laptop,
    Car,
}

impl ListingKind {
    /// Query parameter that keys uploads and deletes to a listing.
    pub fn id_param(&self) -> &'static str {
        match self {
            ListingKind::Mobile => "mobileId",
            ListingKind::Laptop => "laptopId",
            ListingKind::Car => "carId",
        }
    }

    pub fn file_prefix(&self) -> &'static str {
        match self {
            ListingKind::Mobile => "mobile",
            ListingKind::Laptop => "laptop",
            ListingKind::Car => "car",
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            ListingKind::Mobile => "mobiles",
            ListingKind::Laptop => "laptops",
            ListingKind::Car => "cars",
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_prefix())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    pub uri: String,
    pub name: String,
    pub mime_type: String,
}

impl LocalFile {
    /// Build a file entry from a local path, deriving name and MIME type.
    pub fn from_path(path: &str) -> Self {
        let name = std::path::Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let mime_type = InputValidator::mime_type_for(path).to_string();
        Self {
            uri: path.to_string(),
            name,
            mime_type,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub listing_id: Option<i64>,
    pub kind: ListingKind,
    pub files: Vec<LocalFile>,
}

impl UploadTask {
    pub fn new(kind: ListingKind, listing_id: i64, files: Vec<LocalFile>) -> Self {
        Self {
            listing_id: Some(listing_id),
            kind,
            files,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct UploadProgress {
    pub total: usize,
    pub uploaded: usize,
    pub current: String,
}

impl UploadProgress {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.uploaded as f32 / self.total as f32) * 100.0
    }

    pub fn is_complete(&self) -> bool {
        self.uploaded == self.total && self.current == COMPLETE_MARKER
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FailedUpload {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub total: usize,
    pub succeeded_urls: Vec<String>,
    pub failed_files: Vec<FailedUpload>,
}

impl UploadResult {
    pub fn is_complete(&self) -> bool {
        self.failed_files.is_empty()
    }

    pub fn is_partial(&self) -> bool {
        !self.failed_files.is_empty()
    }

    pub fn failed_names(&self) -> Vec<&str> {
        self.failed_files.iter().map(|f| f.name.as_str()).collect()
    }
}

/// Upload a batch of photos to an existing listing.
pub async fn upload_photos<F>(
    client: &MarketplaceClient,
    task: &UploadTask,
    on_progress: F,
) -> AppResult<UploadResult>
where
    F: FnMut(UploadProgress),
{
    let result = uploader::process_upload_batch(client, task, on_progress).await?;

    if result.is_partial() {
        log::warn!(
            "{} of {} images uploaded for {} {:?}; {} failed",
            result.succeeded_urls.len(),
            result.total,
            task.kind,
            task.listing_id,
            result.failed_files.len()
        );
    } else {
        log::info!(
            "All {} images uploaded for {} {:?}",
            result.succeeded_urls.len(),
            task.kind,
            task.listing_id
        );
    }

    Ok(result)
}

/// Re-run only the files that failed in `previous`, folding the new
/// successes into the earlier result.
pub async fn retry_failed_photos<F>(
    client: &MarketplaceClient,
    task: &UploadTask,
    previous: UploadResult,
    on_progress: F,
) -> AppResult<UploadResult>
where
    F: FnMut(UploadProgress),
{
    let retried = uploader::retry_failed_uploads(client, task, &previous, on_progress).await?;
    Ok(uploader::merge_results(previous, retried))
}

pub async fn create_mobile_listing(client: &MarketplaceClient, listing: MobileListing) -> AppResult<i64> {
    let id = client.create_mobile(&listing).await?;
    log::info!("Created mobile listing {}", id);
    Ok(id)
}

pub async fn delete_listing(client: &MarketplaceClient, kind: ListingKind, listing_id: i64) -> AppResult<()> {
    let listing_id = InputValidator::validate_listing_id(Some(listing_id))?;
    client.delete_listing(kind, listing_id).await
}

pub async fn login(client: &MarketplaceClient, username: &str, password: &str) -> AppResult<Session> {
    InputValidator::validate_credentials(username, password)?;
    client.login(username.trim(), password).await
}

pub async fn logout(client: &MarketplaceClient) -> AppResult<()> {
    client.logout().await
}
