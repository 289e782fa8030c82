use std::collections::HashMap;

use axum::{
    async_trait,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request},
};

use crate::{error::AppError, images::UploadItem};

/// A multipart form split into text fields and uploaded files.
#[derive(Default)]
pub struct FormData {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Vec<UploadItem>>,
}

impl FormData {
    pub fn take_files(&mut self, name: &str) -> Vec<UploadItem> {
        self.files.remove(name).unwrap_or_default()
    }
}

fn bad_form(e: MultipartError) -> AppError {
    AppError::validation(format!("Malformed form data: {}", e.body_text()))
}

/// Parts with a file name are files; everything else is text.
async fn read_form(mut mp: Multipart) -> Result<FormData, AppError> {
    let mut form = FormData::default();
    while let Some(field) = mp.next_field().await.map_err(bad_form)? {
        let Some(name) = field.name().map(|s| s.trim_end_matches("[]").to_string()) else {
            continue;
        };
        if field.file_name().is_some() {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".into());
            let body = field.bytes().await.map_err(bad_form)?;
            if body.is_empty() {
                continue;
            }
            form.files
                .entry(name)
                .or_default()
                .push(UploadItem { body, content_type });
        } else {
            let text = field.text().await.map_err(bad_form)?;
            form.fields.insert(name, text);
        }
    }
    Ok(form)
}

#[async_trait]
impl<S> FromRequest<S> for FormData
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let mp = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        read_form(mp).await
    }
}
