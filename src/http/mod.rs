//! HTTP surface: upload, list months, list files, download.
//!
//! Every route requires HTTP Basic credentials, and a user may only touch
//! their own directory. Storage calls block, so they run on the blocking pool;
//! downloads are streamed from there through a bounded channel.

use std::io::{self, Read};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::json;
use time::OffsetDateTime;

use crate::auth::Verifier;
use crate::error::{ArchiveError, Error};
use crate::month::Month;
use crate::storage::{LogReader, LogStore};

const DATE_HEADER: &str = "x-file-date";
const NAME_HEADER: &str = "x-file-name";
const CHUNK_SIZE: usize = 64 * 1024;
const STREAM_DEPTH: usize = 4;

#[derive(Clone)]
pub struct AppState {
    store: Arc<LogStore>,
    verifier: Arc<dyn Verifier>,
}

impl AppState {
    pub fn new(store: Arc<LogStore>, verifier: Arc<dyn Verifier>) -> Self {
        Self { store, verifier }
    }
}

/// Builds the router; `max_upload_bytes` caps request bodies.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/api/logs", post(upload))
        .route("/api/logs/:user", get(list_months))
        .route("/api/logs/:user/:date", get(list_files))
        .route("/api/logs/:user/:date/:name", get(get_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}

/// JSON error body `{error, code, detail}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    error: &'static str,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, error: &'static str, detail: impl Into<String>) -> Self {
        Self {
            status,
            code,
            error,
            detail: detail.into(),
        }
    }

    fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Unauthorized",
            "Invalid credentials",
        )
    }

    fn forbidden() -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            "forbidden",
            "Forbidden",
            "You can only access your own files",
        )
    }

    fn invalid_date(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_date",
            "Invalid date format",
            detail,
        )
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Server error",
            detail,
        )
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_not_found() {
            return Self::new(
                StatusCode::NOT_FOUND,
                "file_not_found",
                "File not found",
                err.to_string(),
            );
        }
        match err {
            Error::InvalidInput(detail) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_input", "Invalid input", detail)
            }
            Error::OutOfRange(detail) => Self::new(
                StatusCode::BAD_REQUEST,
                "date_out_of_range",
                "Date out of range",
                detail,
            ),
            Error::Archive(err) => {
                if matches!(err, ArchiveError::Integrity { .. }) {
                    log::warn!("{err}");
                }
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "archive_error",
                    "Archive error",
                    err.to_string(),
                )
            }
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.error,
            "code": self.code,
            "detail": self.detail,
        }));
        (self.status, body).into_response()
    }
}

/// POST /api/logs - store the body under the caller's directory
async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let user = authenticate(&state, &headers).await?;

    let date = header_value(&headers, DATE_HEADER);
    let name = header_value(&headers, NAME_HEADER);
    let (Some(date), Some(name)) = (date, name) else {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "missing_headers",
            "Missing headers",
            "X-File-Date and X-File-Name are required",
        ));
    };
    let month = Month::parse(&date)
        .map_err(|_| ApiError::invalid_date("X-File-Date must be YYYY-MM"))?;

    let store = Arc::clone(&state.store);
    let owner = user.clone();
    let stored = name.clone();
    blocking(move || {
        store.upload(
            &owner,
            month,
            &stored,
            &mut body.as_ref(),
            OffsetDateTime::now_utc(),
        )
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": format!("File uploaded: {user}/{month}/{name}") })),
    ))
}

/// GET /api/logs/:user - months with live or archived data
async fn list_months(
    State(state): State<AppState>,
    Path(user): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers, &user).await?;

    let store = Arc::clone(&state.store);
    let months = blocking(move || store.list_months(&user)).await?;
    let results: Vec<String> = months.iter().map(Month::to_string).collect();
    Ok(Json(json!({ "results": results })))
}

/// GET /api/logs/:user/:date - file names in one month
async fn list_files(
    State(state): State<AppState>,
    Path((user, date)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&state, &headers, &user).await?;
    let month = Month::parse(&date).map_err(|_| ApiError::invalid_date("Date must be YYYY-MM"))?;

    let store = Arc::clone(&state.store);
    let results = blocking(move || store.list_files(&user, month)).await?;
    Ok(Json(json!({ "results": results })))
}

/// GET /api/logs/:user/:date/:name - file bytes
async fn get_file(
    State(state): State<AppState>,
    Path((user, date, name)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    authorize(&state, &headers, &user).await?;
    let month = Month::parse(&date).map_err(|_| ApiError::invalid_date("Date must be YYYY-MM"))?;

    let store = Arc::clone(&state.store);
    let reader = blocking(move || store.open(&user, month, &name)).await?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream_reader(reader)),
    )
        .into_response())
}

/// Pumps `reader` on the blocking pool into a stream of chunks.
fn stream_reader(
    mut reader: LogReader,
) -> impl futures_util::Stream<Item = io::Result<Bytes>> + Send + 'static {
    let (tx, rx) = tokio::sync::mpsc::channel::<io::Result<Bytes>>(STREAM_DEPTH);
    tokio::task::spawn_blocking(move || {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                        break;
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log::warn!("download aborted: {err}");
                    let _ = tx.blocking_send(Err(err));
                    break;
                }
            }
        }
    });
    futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    })
}

async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))?
        .map_err(ApiError::from)
}

/// Verifies Basic credentials and returns the identity.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let (user, password) = basic_credentials(headers).ok_or_else(ApiError::unauthorized)?;
    let verifier = Arc::clone(&state.verifier);
    let identity = user.clone();
    let ok = tokio::task::spawn_blocking(move || verifier.verify(&identity, &password))
        .await
        .map_err(|err| ApiError::internal(format!("worker failed: {err}")))?;
    if !ok {
        log::debug!("rejected credentials for {user}");
        return Err(ApiError::unauthorized());
    }
    Ok(user)
}

async fn authorize(state: &AppState, headers: &HeaderMap, owner: &str) -> Result<(), ApiError> {
    let user = authenticate(state, headers).await?;
    if user != owner {
        return Err(ApiError::forbidden());
    }
    Ok(())
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn with_auth(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_basic_credentials() {
        let encoded = STANDARD.encode("alice:se:cret");
        let headers = with_auth(&format!("Basic {encoded}"));
        assert_eq!(
            basic_credentials(&headers),
            Some(("alice".to_string(), "se:cret".to_string()))
        );
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert_eq!(basic_credentials(&with_auth("Bearer abc")), None);
        assert_eq!(basic_credentials(&with_auth("Basic !!!")), None);
        let no_colon = STANDARD.encode("alice");
        assert_eq!(basic_credentials(&with_auth(&format!("Basic {no_colon}"))), None);
        assert_eq!(basic_credentials(&HeaderMap::new()), None);
    }

    #[test]
    fn errors_map_to_statuses() {
        let cases = [
            (Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                Error::Archive(ArchiveError::Truncated { path: "a".into() }),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                Error::Archive(ArchiveError::MissingMember {
                    path: "a".into(),
                    member: "m".into(),
                }),
                StatusCode::NOT_FOUND,
            ),
            (
                Error::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }

        let window = ApiError::from(Error::OutOfRange("2001-01".into()));
        assert_eq!(window.status, StatusCode::BAD_REQUEST);
        assert_eq!(window.code, "date_out_of_range");
    }
}
