use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{error::AppError, storage::StorageClient};

/// Reference to an image held by the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub public_id: String,
    pub url: String,
}

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Uploads every item under `{prefix}/{owner}/`. Either all images end up
/// stored or none do: objects written before a failure are removed again.
pub async fn upload_images(
    storage: &dyn StorageClient,
    prefix: &str,
    owner: Uuid,
    items: Vec<UploadItem>,
) -> Result<Vec<ImageRef>, AppError> {
    let mut stored: Vec<ImageRef> = Vec::with_capacity(items.len());
    for item in items {
        let Some(ext) = ext_from_mime(&item.content_type) else {
            delete_images(storage, &stored).await;
            return Err(AppError::validation(format!(
                "Unsupported image type: {}",
                item.content_type
            )));
        };
        let key = format!("{}/{}/{}.{}", prefix, owner, Uuid::new_v4(), ext);
        if let Err(e) = storage.put_object(&key, item.body, &item.content_type).await {
            delete_images(storage, &stored).await;
            return Err(AppError::Storage(e.context(format!("put_object {}", key))));
        }
        debug!(%key, "image stored");
        stored.push(ImageRef {
            url: storage.public_url(&key),
            public_id: key,
        });
    }
    Ok(stored)
}

/// Best-effort removal; failures are logged and otherwise ignored.
pub async fn delete_images(storage: &dyn StorageClient, images: &[ImageRef]) {
    for image in images {
        if let Err(e) = storage.delete_object(&image.public_id).await {
            warn!(error = %e, key = %image.public_id, "failed to delete image");
        }
    }
}
