use async_trait::async_trait;
use reqwest::{multipart, Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::commands::{ListingKind, LocalFile};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::security::InputValidator;
use crate::session::{Session, SessionStore};

use super::ImageUploader;

const UPLOAD_PATH: &str = "/api/photo/upload";

/// HTTP client for the marketplace REST API
pub struct MarketplaceClient {
    client: Client,
    base_url: String,
    upload_field_name: String,
    session: Arc<dyn SessionStore>,
}

impl MarketplaceClient {
    pub fn new(config: &Config, session: Arc<dyn SessionStore>) -> AppResult<Self> {
        InputValidator::validate_base_url(&config.api_base_url)?;

        let client = Client::builder().timeout(config.request_timeout()).build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim().trim_end_matches('/').to_string(),
            upload_field_name: config.upload_field_name.clone(),
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.client.request(method, url);

        match self.session.token() {
            Ok(Some(token)) => builder.bearer_auth(token),
            Ok(None) => builder,
            Err(e) => {
                log::warn!("Token read error: {}", e);
                builder
            }
        }
    }

    /// Send a request and turn non-2xx statuses into `AppError::Api`.
    async fn send(&self, builder: RequestBuilder) -> AppResult<Response> {
        let request = builder.build()?;
        let method = request.method().clone();
        let url = request.url().clone();
        log::debug!("[REQ] {} {}", method, url);

        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("[ERR] {} {}: {}", method, url, e);
                return Err(AppError::Network(e));
            }
        };

        let status = response.status();
        log::debug!("[RES] {} {}", status.as_u16(), url);

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_error_message(status.as_u16(), &body);
        log::debug!("[ERR] {} {}: {}", status.as_u16(), url, message);
        Err(AppError::api(status.as_u16(), &message))
    }

    /// Upload one or more files to a listing and return the decoded body.
    pub async fn upload_listing_images(
        &self,
        kind: ListingKind,
        listing_id: i64,
        files: &[LocalFile],
    ) -> AppResult<Value> {
        let mut payload = UploadPayload::new();
        for file in files {
            payload.add_file(file, &self.upload_field_name).await?;
        }
        if payload.is_empty() {
            return Err(AppError::NoValidFiles);
        }

        let builder = self
            .request(Method::POST, UPLOAD_PATH)
            .query(&[(kind.id_param(), listing_id)])
            .multipart(payload.build_form()?);

        let response = self.send(builder).await?;
        let body = response.text().await?;
        parse_json_body(&body)
    }

    pub async fn create_mobile(&self, listing: &MobileListing) -> AppResult<i64> {
        let body = listing.normalized();
        let response = self
            .send(self.request(Method::POST, "/api/v1/mobiles/add").json(&body))
            .await?;
        let created: CreateListingResponse = response.json().await?;

        created.mobile_id.filter(|id| *id > 0).ok_or_else(|| {
            log::warn!(
                "Listing created without an id ({}: {})",
                created.code.unwrap_or_default(),
                created.message.unwrap_or_default()
            );
            AppError::InvalidResponse
        })
    }

    pub async fn delete_listing(&self, kind: ListingKind, listing_id: i64) -> AppResult<()> {
        let path = format!("/api/{}/delete", kind.collection());
        self.send(
            self.request(Method::DELETE, &path)
                .query(&[(kind.id_param(), listing_id)]),
        )
        .await?;
        log::info!("Deleted {} listing {}", kind, listing_id);
        Ok(())
    }

    pub async fn login(&self, username: &str, password: &str) -> AppResult<Session> {
        let body = LoginRequest { username, password };
        let response = self
            .send(self.request(Method::POST, "/jwt/login").json(&body))
            .await?;
        let login: LoginResponse = response.json().await?;

        let session = Session::new(login.access_token, login.user_id, login.roles, login.seller_id);
        self.session.save(&session)?;
        log::info!("Logged in as user {}", session.user_id);
        Ok(session)
    }

    /// Tell the server, then forget the local session even if the call failed.
    pub async fn logout(&self) -> AppResult<()> {
        if let Err(e) = self
            .send(self.request(Method::POST, "/api/v1/auth/logout"))
            .await
        {
            log::warn!("Logout request failed (non-critical): {}", e);
        }
        self.session.clear()
    }
}

#[async_trait]
impl ImageUploader for MarketplaceClient {
    async fn upload_images(&self, kind: ListingKind, listing_id: i64, files: &[LocalFile]) -> AppResult<Value> {
        self.upload_listing_images(kind, listing_id, files).await
    }
}

/// Helper struct to hold upload payload data
#[derive(Debug, Clone, Default)]
pub struct UploadPayload {
    files: Vec<(String, Vec<u8>, String, String)>, // (filename, data, mime_type, field_name)
}

impl UploadPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_file(&mut self, file: &LocalFile, field_name: &str) -> AppResult<()> {
        let file_contents = tokio::fs::read(&file.uri).await?;
        let filename = InputValidator::sanitize_filename(&file.name);
        let mime_type = if file.mime_type.is_empty() {
            InputValidator::mime_type_for(&filename).to_string()
        } else {
            file.mime_type.clone()
        };

        self.files
            .push((filename, file_contents, mime_type, field_name.to_string()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn build_form(&self) -> AppResult<multipart::Form> {
        let mut form = multipart::Form::new();

        for (filename, data, mime_type, field_name) in &self.files {
            let part = multipart::Part::bytes(data.clone())
                .file_name(filename.clone())
                .mime_str(mime_type)?;

            form = form.part(field_name.clone(), part);
        }

        Ok(form)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MobileListing {
    pub title: String,
    pub description: String,
    pub price: f64,
    pub negotiable: bool,
    pub condition: String,
    pub brand: String,
    pub model: String,
    pub color: String,
    pub year_of_purchase: i32,
    pub seller_id: i64,
}

impl MobileListing {
    fn normalized(&self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            description: self.description.trim().to_string(),
            price: if self.price.is_finite() { self.price } else { 0.0 },
            negotiable: self.negotiable,
            condition: self.condition.trim().to_uppercase(),
            brand: self.brand.trim().to_string(),
            model: self.model.trim().to_string(),
            color: self.color.trim().to_string(),
            year_of_purchase: self.year_of_purchase,
            seller_id: self.seller_id,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateListingResponse {
    code: Option<String>,
    message: Option<String>,
    mobile_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    user_id: i64,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    seller_id: Option<i64>,
}

/// Accepted shapes of a successful upload response.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageUrlsBody {
    List(Vec<String>),
    Wrapped {
        #[serde(rename = "imageUrls")]
        image_urls: Vec<String>,
    },
}

/// Extract stored URLs from an upload response: either a bare array of
/// strings or an object with an `imageUrls` array.
pub fn extract_image_urls(body: Value) -> AppResult<Vec<String>> {
    match serde_json::from_value::<ImageUrlsBody>(body) {
        Ok(ImageUrlsBody::List(urls)) => Ok(urls),
        Ok(ImageUrlsBody::Wrapped { image_urls }) => Ok(image_urls),
        Err(e) => {
            log::debug!("Upload response has no usable URL list: {}", e);
            Err(AppError::InvalidResponse)
        }
    }
}

/// Prefer the server's JSON `message`, fall back to a generic status text.
pub fn extract_error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| {
            json.get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.trim().to_string())
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("Request failed with status code {}", status))
}

fn parse_json_body(body: &str) -> AppResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| {
        log::debug!(
            "Upload response is not JSON ({}): {}",
            e,
            body.chars().take(200).collect::<String>()
        );
        AppError::InvalidResponse
    })
}
