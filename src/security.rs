use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::commands::{ListingKind, LocalFile};
use crate::errors::{AppError, AppResult};

static UNSAFE_FILENAME_CHARS: OnceLock<Regex> = OnceLock::new();
static BASE_URL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn unsafe_filename_chars() -> &'static Regex {
    UNSAFE_FILENAME_CHARS
        .get_or_init(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("static pattern compiles"))
}

fn base_url_pattern() -> &'static Regex {
    BASE_URL_PATTERN.get_or_init(|| {
        Regex::new(r"^https?://[A-Za-z0-9.\-]+(:\d{1,5})?(/[\w\-./]*)?$")
            .expect("static pattern compiles")
    })
}

pub struct InputValidator;

impl InputValidator {
    /// A batch needs a listing to attach to. Absence is reported separately
    /// from a malformed id so the caller can tell the user to create the
    /// listing first.
    pub fn validate_listing_id(listing_id: Option<i64>) -> AppResult<i64> {
        match listing_id {
            None => Err(AppError::MissingListingId),
            Some(id) if id <= 0 => Err(AppError::validation(
                "listing_id",
                "Listing id must be a positive integer",
            )),
            Some(id) => Ok(id),
        }
    }

    /// Drop entries without a source uri and fill in missing names and MIME
    /// types. Default names use the position among the kept files, so the
    /// same input always yields the same names.
    pub fn normalize_files(kind: ListingKind, listing_id: i64, files: &[LocalFile]) -> Vec<LocalFile> {
        files
            .iter()
            .filter(|f| !f.uri.trim().is_empty())
            .enumerate()
            .map(|(idx, f)| {
                let name = if f.name.trim().is_empty() {
                    format!("{}_{}_{}.jpg", kind.file_prefix(), listing_id, idx)
                } else {
                    f.name.trim().to_string()
                };
                let mime_type = if f.mime_type.trim().is_empty() {
                    let source = if Path::new(&name).extension().is_some() {
                        name.as_str()
                    } else {
                        f.uri.as_str()
                    };
                    Self::mime_type_for(source).to_string()
                } else {
                    f.mime_type.trim().to_string()
                };
                LocalFile {
                    uri: f.uri.trim().to_string(),
                    name,
                    mime_type,
                }
            })
            .collect()
    }

    pub fn prepare_files(kind: ListingKind, listing_id: i64, files: &[LocalFile]) -> AppResult<Vec<LocalFile>> {
        let valid = Self::normalize_files(kind, listing_id, files);
        if valid.is_empty() {
            return Err(AppError::NoValidFiles);
        }
        Ok(valid)
    }

    pub fn mime_type_for(file_name: &str) -> &'static str {
        let ext = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        match ext.as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("heic") => "image/heic",
            _ => "image/jpeg",
        }
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let sanitized = unsafe_filename_chars().replace_all(filename.trim(), "_");

        // Limit length
        if sanitized.len() > 255 {
            let mut cut = 252;
            while !sanitized.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}...", &sanitized[..cut])
        } else {
            sanitized.to_string()
        }
    }

    pub fn validate_base_url(url: &str) -> AppResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(AppError::validation("api_base_url", "API base URL cannot be empty"));
        }

        if !base_url_pattern().is_match(trimmed) {
            return Err(AppError::validation(
                "api_base_url",
                "Must be an http(s) URL without query or fragment",
            ));
        }

        Ok(())
    }

    pub fn validate_credentials(username: &str, password: &str) -> AppResult<()> {
        if username.trim().is_empty() {
            return Err(AppError::validation("username", "Username cannot be empty"));
        }
        if password.is_empty() {
            return Err(AppError::validation("password", "Password cannot be empty"));
        }
        Ok(())
    }
}
