mod multipart;
mod services;

pub use multipart::FormData;
pub use services::{delete_images, upload_images, ImageRef, UploadItem};
