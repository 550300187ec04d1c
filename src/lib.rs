//! Listing photo uploads for the marketplace REST API.
//!
//! The core is [`uploader::process_upload_batch`], which pushes a batch of
//! local images to an existing listing one file at a time and reports a
//! partial-failure aware [`commands::UploadResult`].

pub mod commands;
pub mod config;
pub mod errors;
pub mod security;
pub mod session;
pub mod uploader;

pub use commands::{
    FailedUpload, ListingKind, LocalFile, UploadProgress, UploadResult, UploadTask,
};
pub use errors::{AppError, AppResult};
