use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::Redirect,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use tracing::{instrument, warn};

use crate::{
    auth::jwt::AuthUser,
    error::{AppError, AppResult},
    images::services::{ext_from_mime, presign_receipt_image, upload_receipt_image, MAX_IMAGE_BYTES},
    receipts::{
        dto::{CreateReceiptRequest, ListQuery},
        repo_types::{Receipt, ReceiptStats, ReceiptWithItems},
    },
    response::{ApiResponse, PaginatedResponse, PaginationMeta},
    state::AppState,
};

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/receipts", get(list_receipts))
        .route("/receipts/stats", get(get_stats))
        .route("/receipts/uuid/:uuid", get(get_receipt_by_uuid))
        .route(
            "/receipts/:id",
            get(get_receipt).put(update_receipt).delete(delete_receipt),
        )
        .route("/receipts/:id/image", get(get_receipt_image)) // redirect to a presigned url
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/receipts", axum::routing::post(create_receipt)) // multipart: image + data
        .layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024 * 1024))
}

struct ImagePart {
    body: Bytes,
    content_type: String,
    filename: Option<String>,
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::validation(format!("multipart: {}", e))
}

/// Pulls the `image` file and the `data` JSON out of the upload.
async fn read_upload(mut mp: Multipart) -> AppResult<(ImagePart, CreateReceiptRequest)> {
    let mut image = None;
    let mut data = None;
    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let filename = field.file_name().map(str::to_string);
                let body = field.bytes().await.map_err(bad_multipart)?;
                image = Some(ImagePart {
                    body,
                    content_type,
                    filename,
                });
            }
            Some("data") => {
                let text = field.text().await.map_err(bad_multipart)?;
                let req: CreateReceiptRequest = serde_json::from_str(&text)
                    .map_err(|e| AppError::validation(format!("data: {}", e)))?;
                data = Some(req);
            }
            _ => {}
        }
    }

    let image = image.ok_or_else(|| AppError::validation("image: this field is required"))?;
    if image.body.is_empty() {
        return Err(AppError::validation("image: file is empty"));
    }
    if image.body.len() > MAX_IMAGE_BYTES {
        return Err(AppError::validation("image: file too large"));
    }
    if ext_from_mime(&image.content_type).is_none() {
        return Err(AppError::validation(format!(
            "image: unsupported content type {}",
            image.content_type
        )));
    }
    let data = data.ok_or_else(|| AppError::validation("data: this field is required"))?;
    Ok((image, data))
}

#[instrument(skip(state, user, mp), fields(user_id = user.user_id))]
pub async fn create_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    mp: Multipart,
) -> AppResult<(StatusCode, [(header::HeaderName, String); 1], Json<ApiResponse<ReceiptWithItems>>)> {
    let (image, req) = read_upload(mp).await?;
    // fail before touching storage
    req.validate()?;

    let stored = upload_receipt_image(
        state.storage.as_ref(),
        user.user_id,
        image.body,
        &image.content_type,
        image.filename.as_deref(),
    )
    .await?;
    let key = stored.image_ref.clone();

    let created = match state.receipts.create_receipt(user.user_id, req, stored).await {
        Ok(r) => r,
        Err(e) => {
            if let Err(cleanup) = state.storage.delete_object(&key).await {
                warn!(error = %cleanup, %key, "orphaned receipt image");
            }
            return Err(e);
        }
    };

    let location = format!("/api/v1/receipts/{}", created.receipt.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(ApiResponse::ok("receipt created successfully", created)),
    ))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn list_receipts(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<PaginatedResponse<Receipt>>> {
    q.validate()?;
    let (receipts, total) = state
        .receipts
        .get_receipts_by_user_id(user.user_id, q.page, q.limit)
        .await?;
    Ok(Json(PaginatedResponse::new(
        receipts,
        PaginationMeta::new(q.page, q.limit, total),
    )))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn get_stats(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ApiResponse<ReceiptStats>>> {
    let stats = state.receipts.get_stats_by_user_id(user.user_id).await?;
    Ok(Json(ApiResponse::ok("stats retrieved", stats)))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn get_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<ReceiptWithItems>>> {
    let receipt = state.receipts.get_receipt_by_id(id, user.user_id).await?;
    Ok(Json(ApiResponse::ok("receipt retrieved", receipt)))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn get_receipt_by_uuid(
    State(state): State<AppState>,
    user: AuthUser,
    Path(uuid): Path<String>,
) -> AppResult<Json<ApiResponse<ReceiptWithItems>>> {
    let receipt = state.receipts.get_receipt_by_uuid(&uuid, user.user_id).await?;
    Ok(Json(ApiResponse::ok("receipt retrieved", receipt)))
}

#[instrument(skip(state, user, payload), fields(user_id = user.user_id))]
pub async fn update_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<CreateReceiptRequest>,
) -> AppResult<Json<ApiResponse<ReceiptWithItems>>> {
    let receipt = state.receipts.update_receipt(id, user.user_id, payload).await?;
    Ok(Json(ApiResponse::ok("receipt updated", receipt)))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn delete_receipt(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let removed = state.receipts.delete_receipt(id, user.user_id).await?;
    if let Err(e) = state.storage.delete_object(&removed.image_url).await {
        warn!(error = %e, key = %removed.image_url, "receipt image not removed");
    }
    Ok(Json(ApiResponse::message("receipt deleted")))
}

#[instrument(skip(state, user), fields(user_id = user.user_id))]
pub async fn get_receipt_image(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let receipt = state.receipts.get_receipt_by_id(id, user.user_id).await?;
    let url = presign_receipt_image(state.storage.as_ref(), &receipt.receipt.image_url).await?;
    Ok(Redirect::temporary(&url))
}
