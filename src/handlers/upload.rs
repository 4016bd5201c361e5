use crate::config::AppConfig;
use crate::error::ApiError;
use crate::models::user::AuthenticatedUser;
use actix_multipart::Multipart;
use actix_web::{http::header::CONTENT_TYPE, web, HttpRequest, HttpResponse};
use futures_util::stream::{Stream, StreamExt};
use serde::Serialize;
use std::fmt::Display;
use std::io::ErrorKind;
use tracing::{debug, info};
use utoipa::ToSchema;

/// Form field carrying the file in a multipart upload.
const IMAGE_FIELD: &str = "image";

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub success: bool,
    pub url: String,
}

struct ImageUpload {
    extension: &'static str,
    bytes: web::Bytes,
}

/// File extension for an accepted image content type.
fn image_extension(content_type: &str) -> Option<&'static str> {
    match content_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Generated names only ever contain `[A-Za-z0-9-]` plus one extension dot.
fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn media_type(req: &HttpRequest) -> String {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|v| v.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn unsupported_type() -> ApiError {
    ApiError::InvalidInput("Only image uploads are supported (jpeg, png, gif, webp)".to_string())
}

/// Drains `stream`, failing as soon as it grows past `limit` bytes.
async fn read_limited<S, E>(stream: S, limit: usize) -> Result<web::Bytes, ApiError>
where
    S: Stream<Item = Result<web::Bytes, E>>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut body = web::BytesMut::new();

    while let Some(chunk) = stream.next().await {
        let chunk =
            chunk.map_err(|e| ApiError::InvalidInput(format!("Failed to read upload: {}", e)))?;
        if body.len() + chunk.len() > limit {
            return Err(ApiError::InvalidInput(format!(
                "File exceeds the {} byte limit",
                limit
            )));
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body.freeze())
}

/// The request body is the image itself; its type comes from `Content-Type`.
async fn raw_image(
    content_type: &str,
    payload: web::Payload,
    limit: usize,
) -> Result<ImageUpload, ApiError> {
    let extension = image_extension(content_type).ok_or_else(unsupported_type)?;
    let bytes = read_limited(payload, limit).await?;
    Ok(ImageUpload { extension, bytes })
}

/// First `image` part of a `multipart/form-data` body. Other parts are skipped.
async fn multipart_image(mut form: Multipart, limit: usize) -> Result<ImageUpload, ApiError> {
    while let Some(field) = form.next().await {
        let field = field
            .map_err(|e| ApiError::InvalidInput(format!("Malformed multipart body: {}", e)))?;

        let disposition = field.content_disposition();
        let name = disposition.get_name().map(str::to_owned);
        let filename = disposition.get_filename().map(str::to_owned);

        if name.as_deref() != Some(IMAGE_FIELD) {
            debug!(field = ?name, "Skipping multipart field");
            read_limited(field, limit).await?;
            continue;
        }

        // Part header wins; clients that omit it get a guess from the file name
        let declared = field
            .content_type()
            .map(|mime| mime.essence_str().to_ascii_lowercase())
            .or_else(|| {
                filename
                    .as_deref()
                    .and_then(|f| mime_guess::from_path(f).first())
                    .map(|mime| mime.essence_str().to_string())
            })
            .unwrap_or_default();

        let extension = image_extension(&declared).ok_or_else(unsupported_type)?;
        let bytes = read_limited(field, limit).await?;
        return Ok(ImageUpload { extension, bytes });
    }

    Err(ApiError::InvalidInput("No file uploaded".to_string()))
}

/// Store an uploaded image
///
/// Accepts `multipart/form-data` with the file in the `image` field, or the
/// raw image as the request body with an image `Content-Type`.
#[utoipa::path(
    post,
    path = "/api/upload",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Form with an `image` file part (jpeg, png, gif or webp)"),
    responses(
        (status = 200, description = "Image stored", body = UploadResponse),
        (status = 400, description = "Unsupported type, empty, or too large"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Uploads"
)]
pub async fn upload_image(
    req: HttpRequest,
    payload: web::Payload,
    config: web::Data<AppConfig>,
    user: web::ReqData<AuthenticatedUser>,
) -> Result<HttpResponse, ApiError> {
    let content_type = media_type(&req);
    let upload = if content_type == "multipart/form-data" {
        multipart_image(Multipart::new(req.headers(), payload), config.max_upload_bytes).await?
    } else {
        raw_image(&content_type, payload, config.max_upload_bytes).await?
    };

    if upload.bytes.is_empty() {
        return Err(ApiError::InvalidInput("No file uploaded".to_string()));
    }

    let filename = format!(
        "{}-{}.{}",
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple(),
        upload.extension
    );
    let dir = config.upload_dir.clone();
    let path = dir.join(&filename);
    let bytes = upload.bytes;
    let size = bytes.len();

    web::block(move || {
        std::fs::create_dir_all(&dir)?;
        std::fs::write(&path, &bytes)
    })
    .await?
    .map_err(|e| ApiError::Internal(format!("Failed to store upload: {}", e)))?;

    info!(user_id = %user.user_id, file = %filename, bytes = size, "User uploaded image");

    let conn = req.connection_info();
    let url = format!("{}://{}/uploads/{}", conn.scheme(), conn.host(), filename);

    Ok(HttpResponse::Ok().json(UploadResponse { success: true, url }))
}

/// Serve a previously uploaded image
#[utoipa::path(
    get,
    path = "/uploads/{filename}",
    params(("filename" = String, Path, description = "Name returned by the upload endpoint")),
    responses(
        (status = 200, description = "File contents"),
        (status = 400, description = "Invalid file name"),
        (status = 404, description = "No such file")
    ),
    tag = "Uploads"
)]
pub async fn serve_upload(
    path: web::Path<String>,
    config: web::Data<AppConfig>,
) -> Result<HttpResponse, ApiError> {
    let filename = path.into_inner();
    if !is_safe_filename(&filename) {
        return Err(ApiError::InvalidInput("Invalid file name".to_string()));
    }

    let full_path = config.upload_dir.join(&filename);
    let data = match web::block(move || std::fs::read(full_path)).await? {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()))
        }
        Err(e) => return Err(ApiError::Internal(format!("Failed to read upload: {}", e))),
    };

    let mime = mime_guess::from_path(&filename).first_or_octet_stream();
    Ok(HttpResponse::Ok().content_type(mime.as_ref()).body(data))
}
