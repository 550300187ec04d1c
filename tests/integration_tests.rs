use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use marketplace_uploader::commands::{self, ListingKind, LocalFile, UploadTask};
use marketplace_uploader::config::Config;
use marketplace_uploader::errors::AppError;
use marketplace_uploader::session::{MemorySessionStore, Session, SessionStore};
use marketplace_uploader::uploader::{MarketplaceClient, MobileListing};
use marketplace_uploader::AppResult;

/// Integration tests for the marketplace uploader
/// These run the HTTP client and the batch orchestrator against a local server

#[derive(Debug, Clone)]
struct SeenUpload {
    query: HashMap<String, String>,
    authorization: Option<String>,
    parts: Vec<(String, String, String, usize)>, // (field, file name, content type, bytes)
}

#[derive(Clone, Default)]
struct ServerState {
    uploads: Arc<Mutex<Vec<SeenUpload>>>,
    deletes: Arc<Mutex<Vec<HashMap<String, String>>>>,
    attempts: Arc<Mutex<HashMap<String, u32>>>,
}

async fn upload_handler(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let field_name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        parts.push((field_name, file_name, content_type, data.len()));
    }

    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    state.uploads.lock().unwrap().push(SeenUpload {
        query: query.clone(),
        authorization,
        parts: parts.clone(),
    });

    let file_name = parts.first().map(|p| p.1.clone()).unwrap_or_default();
    let attempt = {
        let mut attempts = state.attempts.lock().unwrap();
        let counter = attempts.entry(file_name.clone()).or_insert(0);
        *counter += 1;
        *counter
    };
    let listing = query.values().next().cloned().unwrap_or_default();
    let url = format!("https://cdn.test/{}/{}", listing, file_name);

    if file_name.starts_with("fail") || (file_name.starts_with("flaky") && attempt == 1) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "disk full" })),
        )
            .into_response();
    }
    if file_name.starts_with("teapot") {
        return (StatusCode::IM_A_TEAPOT, "short and stout").into_response();
    }
    if file_name.starts_with("garbage") {
        return (StatusCode::OK, "stored").into_response();
    }
    if file_name.starts_with("wrapped") {
        return Json(json!({ "status": "OK", "imageUrls": [url] })).into_response();
    }
    Json(json!([url, url])).into_response()
}

async fn login_handler(Json(body): Json<Value>) -> Response {
    if body["password"] == "secret" {
        Json(json!({
            "accessToken": "jwt-from-server",
            "tokenType": "Bearer",
            "expiresIn": 3600,
            "roles": ["SELLER"],
            "userId": 17
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Bad credentials" })),
        )
            .into_response()
    }
}

async fn add_mobile_handler(Json(body): Json<Value>) -> Response {
    if body["title"] == "no id" {
        return Json(json!({ "code": "CREATED", "message": "ok" })).into_response();
    }
    assert_eq!(body["title"], "Pixel 8");
    assert_eq!(body["yearOfPurchase"], 2023);
    Json(json!({ "code": "CREATED", "message": "ok", "mobileId": 77 })).into_response()
}

async fn delete_laptop_handler(
    State(state): State<ServerState>,
    Query(query): Query<HashMap<String, String>>,
) -> StatusCode {
    state.deletes.lock().unwrap().push(query);
    StatusCode::OK
}

async fn spawn_server(state: ServerState) -> String {
    let app = Router::new()
        .route("/api/photo/upload", post(upload_handler))
        .route("/jwt/login", post(login_handler))
        .route("/api/v1/mobiles/add", post(add_mobile_handler))
        .route("/api/laptops/delete", delete(delete_laptop_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(base_url: &str, session: Arc<dyn SessionStore>) -> MarketplaceClient {
    let config = Config {
        api_base_url: base_url.to_string(),
        ..Config::default()
    };
    MarketplaceClient::new(&config, session).unwrap()
}

fn logged_in() -> Arc<dyn SessionStore> {
    Arc::new(MemorySessionStore::with_session(Session::new(
        "jwt-abc".to_string(),
        1,
        vec!["SELLER".to_string()],
        Some(2),
    )))
}

fn write_photo(dir: &Path, name: &str) -> LocalFile {
    let path = dir.join(name);
    std::fs::write(&path, format!("fake image bytes for {}", name)).unwrap();
    LocalFile::from_path(&path.to_string_lossy())
}

#[tokio::test]
async fn test_partial_batch_over_http() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, logged_in());

    let dir = tempfile::tempdir().unwrap();
    let mut files = vec![
        write_photo(dir.path(), "a.jpg"),
        write_photo(dir.path(), "fail.jpg"),
        write_photo(dir.path(), "wrapped.png"),
    ];
    files.push(LocalFile {
        uri: String::new(),
        name: "never-picked.jpg".to_string(),
        mime_type: "image/jpeg".to_string(),
    });
    let task = UploadTask::new(ListingKind::Laptop, 42, files);

    let mut progress = Vec::new();
    let result = commands::upload_photos(&client, &task, |p| progress.push(p))
        .await
        .unwrap();

    assert_eq!(result.total, 3);
    assert_eq!(
        result.succeeded_urls,
        vec![
            "https://cdn.test/42/a.jpg".to_string(),
            "https://cdn.test/42/wrapped.png".to_string()
        ]
    );
    assert_eq!(result.failed_names(), vec!["fail.jpg"]);
    assert_eq!(result.failed_files[0].error, "disk full");
    assert!(progress.last().unwrap().is_complete());
    assert_eq!(progress.len(), 7);

    let uploads = state.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 3);
    for upload in &uploads {
        assert_eq!(upload.query.get("laptopId").map(String::as_str), Some("42"));
        assert_eq!(upload.authorization.as_deref(), Some("Bearer jwt-abc"));
        assert_eq!(upload.parts.len(), 1);
        assert_eq!(upload.parts[0].0, "files");
        assert!(upload.parts[0].3 > 0);
    }
    assert_eq!(uploads[2].parts[0].2, "image/png");
}

#[tokio::test]
async fn test_all_failed_batch_over_http() {
    let base = spawn_server(ServerState::default()).await;
    let client = client_for(&base, Arc::new(MemorySessionStore::default()));

    let dir = tempfile::tempdir().unwrap();
    let task = UploadTask::new(
        ListingKind::Mobile,
        3,
        vec![
            write_photo(dir.path(), "teapot.jpg"),
            write_photo(dir.path(), "fail.jpg"),
            write_photo(dir.path(), "garbage.jpg"),
        ],
    );

    let err = commands::upload_photos(&client, &task, |_| {}).await.unwrap_err();
    match err {
        AppError::AllUploadsFailed { reason } => {
            assert_eq!(reason, "Request failed with status code 418")
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthenticated_requests_carry_no_token() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, Arc::new(MemorySessionStore::default()));

    let dir = tempfile::tempdir().unwrap();
    let task = UploadTask::new(ListingKind::Car, 9, vec![write_photo(dir.path(), "a.jpg")]);
    commands::upload_photos(&client, &task, |_| {}).await.unwrap();

    let uploads = state.uploads.lock().unwrap().clone();
    assert!(uploads[0].authorization.is_none());
    assert_eq!(uploads[0].query.get("carId").map(String::as_str), Some("9"));
}

#[tokio::test]
async fn test_missing_local_file_is_recorded_per_file() {
    let base = spawn_server(ServerState::default()).await;
    let client = client_for(&base, logged_in());

    let dir = tempfile::tempdir().unwrap();
    let task = UploadTask::new(
        ListingKind::Laptop,
        5,
        vec![
            LocalFile::from_path("/definitely/not/here.jpg"),
            write_photo(dir.path(), "b.jpg"),
        ],
    );

    let result = commands::upload_photos(&client, &task, |_| {}).await.unwrap();
    assert_eq!(result.failed_names(), vec!["here.jpg"]);
    assert_eq!(result.succeeded_urls, vec!["https://cdn.test/5/b.jpg".to_string()]);
}

#[tokio::test]
async fn test_unreachable_server_fails_batch() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let client = client_for(&base, logged_in());
    let dir = tempfile::tempdir().unwrap();
    let task = UploadTask::new(ListingKind::Laptop, 5, vec![write_photo(dir.path(), "a.jpg")]);

    let err = commands::upload_photos(&client, &task, |_| {}).await.unwrap_err();
    assert!(matches!(err, AppError::AllUploadsFailed { .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_retry_failed_photos_merges_results() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, logged_in());

    let dir = tempfile::tempdir().unwrap();
    let task = UploadTask::new(
        ListingKind::Laptop,
        11,
        vec![
            write_photo(dir.path(), "a.jpg"),
            write_photo(dir.path(), "flaky.jpg"),
        ],
    );

    let first = commands::upload_photos(&client, &task, |_| {}).await.unwrap();
    assert_eq!(first.failed_names(), vec!["flaky.jpg"]);

    let mut progress = Vec::new();
    let merged = commands::retry_failed_photos(&client, &task, first, |p| progress.push(p))
        .await
        .unwrap();

    assert!(merged.is_complete());
    assert_eq!(merged.total, 2);
    assert_eq!(
        merged.succeeded_urls,
        vec![
            "https://cdn.test/11/a.jpg".to_string(),
            "https://cdn.test/11/flaky.jpg".to_string()
        ]
    );
    // only the failed file is sent again
    assert_eq!(progress.first().unwrap().total, 1);
    assert_eq!(state.uploads.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_login_stores_session_and_logout_clears_it() {
    let base = spawn_server(ServerState::default()).await;
    let store = Arc::new(MemorySessionStore::default());
    let client = client_for(&base, store.clone());

    let bad = commands::login(&client, "me@example.com", "wrong").await.unwrap_err();
    match bad {
        AppError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Bad credentials");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(store.load().unwrap().is_none());

    let session = commands::login(&client, " me@example.com ", "secret").await.unwrap();
    assert_eq!(session.user_id, 17);
    assert_eq!(store.token().unwrap().as_deref(), Some("jwt-from-server"));

    // the logout route does not exist on the test server; the session is
    // still cleared locally
    commands::logout(&client).await.unwrap();
    assert!(store.load().unwrap().is_none());
}

#[tokio::test]
async fn test_empty_credentials_rejected_before_network() {
    let client = client_for("http://127.0.0.1:9", logged_in());
    let err = commands::login(&client, "  ", "secret").await.unwrap_err();
    assert!(err.is_precondition());
}

#[tokio::test]
async fn test_create_and_delete_listing() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, logged_in());

    let listing = MobileListing {
        title: " Pixel 8 ".to_string(),
        description: "Barely used".to_string(),
        price: 450.0,
        negotiable: true,
        condition: "used".to_string(),
        brand: "Google".to_string(),
        model: "Pixel 8".to_string(),
        color: "Obsidian".to_string(),
        year_of_purchase: 2023,
        seller_id: 2,
    };
    let id = commands::create_mobile_listing(&client, listing.clone()).await.unwrap();
    assert_eq!(id, 77);

    let no_id = MobileListing {
        title: "no id".to_string(),
        ..listing
    };
    let err = commands::create_mobile_listing(&client, no_id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidResponse));

    commands::delete_listing(&client, ListingKind::Laptop, 31).await.unwrap();
    let deletes = state.deletes.lock().unwrap().clone();
    assert_eq!(deletes[0].get("laptopId").map(String::as_str), Some("31"));

    assert!(commands::delete_listing(&client, ListingKind::Laptop, 0).await.is_err());
}

#[tokio::test]
async fn test_precondition_errors_skip_network() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, logged_in());

    let no_id = UploadTask {
        listing_id: None,
        kind: ListingKind::Laptop,
        files: vec![LocalFile::from_path("/tmp/a.jpg")],
    };
    let err = commands::upload_photos(&client, &no_id, |_| {}).await.unwrap_err();
    assert!(matches!(err, AppError::MissingListingId));

    let no_files = UploadTask::new(ListingKind::Laptop, 1, vec![]);
    let err = commands::upload_photos(&client, &no_files, |_| {}).await.unwrap_err();
    assert!(matches!(err, AppError::NoValidFiles));

    assert!(state.uploads.lock().unwrap().is_empty());
}

struct BrokenSessionStore;

impl SessionStore for BrokenSessionStore {
    fn load(&self) -> AppResult<Option<Session>> {
        Err(AppError::Session("session file is locked".to_string()))
    }

    fn save(&self, _session: &Session) -> AppResult<()> {
        Err(AppError::Session("session file is locked".to_string()))
    }

    fn clear(&self) -> AppResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_unreadable_session_sends_request_without_token() {
    let state = ServerState::default();
    let base = spawn_server(state.clone()).await;
    let client = client_for(&base, Arc::new(BrokenSessionStore));
    let dir = tempfile::tempdir().unwrap();

    let task = UploadTask::new(ListingKind::Car, 8, vec![write_photo(dir.path(), "front.jpg")]);
    let result = commands::upload_photos(&client, &task, |_| {}).await.unwrap();
    assert_eq!(result.succeeded_urls, vec!["https://cdn.test/8/front.jpg"]);

    let uploads = state.uploads.lock().unwrap().clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].authorization, None);
}
