use anyhow::Context;
use bytes::Bytes;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::receipts::services::StoredImage;
use crate::storage::StorageClient;

/// Lifetime of presigned image links.
pub const PRESIGN_TTL_SECS: u64 = 30 * 60;

/// Largest accepted receipt image.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

pub fn object_key(user_id: i64, id: Uuid, ext: &str) -> String {
    format!("receipts/{}/{}.{}", user_id, id, ext)
}

/// Stores one receipt image and returns what the receipt row needs to
/// reference it. Unknown content types are stored with a `bin` extension.
#[instrument(skip(storage, body), fields(size = body.len()))]
pub async fn upload_receipt_image(
    storage: &dyn StorageClient,
    user_id: i64,
    body: Bytes,
    content_type: &str,
    filename: Option<&str>,
) -> anyhow::Result<StoredImage> {
    anyhow::ensure!(!body.is_empty(), "empty image");

    let ext = ext_from_mime(content_type).unwrap_or("bin");
    let key = object_key(user_id, Uuid::new_v4(), ext);
    let file_size = body.len() as i64;

    storage
        .put_object(&key, body, content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    debug!(%key, "receipt image stored");

    let filename = filename
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("receipt.{}", ext));

    Ok(StoredImage {
        image_ref: key,
        filename,
        file_size,
    })
}

pub async fn presign_receipt_image(storage: &dyn StorageClient, key: &str) -> anyhow::Result<String> {
    storage
        .presign_get(key, PRESIGN_TTL_SECS)
        .await
        .with_context(|| format!("presign url for key {}", key))
}


#[cfg(test)]
mod image_tests {
    use super::fake::FakeStorage;
    use super::*;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("image/heic"), Some("heic"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn upload_uses_user_scoped_key() {
        let storage = FakeStorage::default();
        let stored = upload_receipt_image(
            &storage,
            42,
            Bytes::from_static(b"\xff\xd8jpeg"),
            "image/jpeg",
            Some("lunch.jpg"),
        )
        .await
        .unwrap();

        assert!(stored.image_ref.starts_with("receipts/42/"));
        assert!(stored.image_ref.ends_with(".jpg"));
        assert_eq!(stored.filename, "lunch.jpg");
        assert_eq!(stored.file_size, 6);
        assert_eq!(storage.keys(), vec![stored.image_ref.clone()]);
    }

    #[tokio::test]
    async fn upload_names_anonymous_files_and_rejects_empty_bodies() {
        let storage = FakeStorage::default();
        let stored = upload_receipt_image(&storage, 1, Bytes::from_static(b"png"), "image/png", None)
            .await
            .unwrap();
        assert_eq!(stored.filename, "receipt.png");

        assert!(upload_receipt_image(&storage, 1, Bytes::new(), "image/png", None)
            .await
            .is_err());
        assert_eq!(storage.keys().len(), 1);
    }

    #[tokio::test]
    async fn presign_mentions_key() {
        let storage = FakeStorage::default();
        let url = presign_receipt_image(&storage, "receipts/1/a.webp").await.unwrap();
        assert!(url.contains("receipts/1/a.webp"));
    }
}
