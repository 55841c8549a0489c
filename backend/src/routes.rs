use std::io::Cursor;

use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError, web};
use futures_util::{StreamExt, TryStreamExt};
use image::{DynamicImage, ImageFormat};
use log::{error, info, warn};
use shared::{ErrorResponse, HealthResponse, UploadResponse};
use uuid::Uuid;

use crate::detection::{DetectError, Detector, verdict_message};
use crate::pipeline::BackgroundDispatcher;
use crate::storage::temp_store::{TempStore, TempStoreError, sanitize_filename};

const IMAGE_FIELD: &str = "imageFile";

#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_upload_bytes: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No image file provided")]
    MissingFile,
    #[error("No selected file")]
    NoSelectedFile,
    #[error("Invalid file format. Only PNG and JPEG are accepted.")]
    InvalidFormat,
    #[error("File exceeds the {0} byte upload limit")]
    TooLarge(usize),
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Malformed multipart body: {0}")]
    Multipart(String),
    #[error("Invalid image file")]
    Decode(#[source] image::ImageError),
    #[error("Error saving the file")]
    Storage(#[from] TempStoreError),
    #[error("Error encoding the annotated image")]
    Encode(#[source] image::ImageError),
    #[error("Object detection is unavailable")]
    Detection(#[from] DetectError),
}

impl ResponseError for UploadError {
    fn status_code(&self) -> StatusCode {
        match self {
            UploadError::MissingFile
            | UploadError::NoSelectedFile
            | UploadError::InvalidFormat
            | UploadError::EmptyFile
            | UploadError::Multipart(_)
            | UploadError::Decode(_) => StatusCode::BAD_REQUEST,
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Storage(_) | UploadError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UploadError::Detection(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("Upload failed: {:?}", self);
        } else {
            info!("Upload rejected: {}", self);
        }
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
        })
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(upload_image)))
        .service(web::resource("/health").route(web::get().to(health)));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
    })
}

struct Upload {
    filename: String,
    format: ImageFormat,
    bytes: Vec<u8>,
}

async fn upload_image(
    detector: web::Data<Detector>,
    temp_store: web::Data<TempStore>,
    dispatcher: web::Data<BackgroundDispatcher>,
    config: web::Data<UploadConfig>,
    mut payload: Multipart,
) -> Result<HttpResponse, UploadError> {
    let upload = read_image_field(&mut payload, config.max_upload_bytes).await?;
    if upload.bytes.is_empty() {
        return Err(UploadError::EmptyFile);
    }

    let image = image::load_from_memory(&upload.bytes).map_err(UploadError::Decode)?;

    let request_id = format!("{}_{}", Uuid::new_v4(), sanitize_filename(&upload.filename));
    info!("Processing upload {} ({} bytes)", request_id, upload.bytes.len());

    let original = temp_store
        .stage(&request_id, &upload.bytes, &upload.filename)
        .await?;

    let result = match detector.detect(&image).await {
        Ok(result) => result,
        Err(e) => {
            temp_store.release(&original).await;
            return Err(e.into());
        }
    };

    let target = detector.target_class();
    let Some(annotated) = result.annotated.as_ref().filter(|_| result.found) else {
        temp_store.release(&original).await;
        return Ok(HttpResponse::Ok().json(UploadResponse {
            message: verdict_message(target, false),
            status: false,
            confidence: None,
        }));
    };

    let encoded = match encode_like_upload(annotated, upload.format) {
        Ok(encoded) => encoded,
        Err(e) => {
            temp_store.release(&original).await;
            return Err(UploadError::Encode(e));
        }
    };

    let annotated_file = match temp_store
        .stage(&request_id, &encoded, &format!("label_{}", upload.filename))
        .await
    {
        Ok(file) => file,
        Err(e) => {
            temp_store.release(&original).await;
            return Err(e.into());
        }
    };

    if let Some(best) = &result.best {
        info!("Upload {}: {} at {:?}", request_id, best.label, best.bbox);
    }
    if let Err(e) = dispatcher.submit(&result, original, annotated_file) {
        warn!("Upload {} not scheduled for publishing: {}", request_id, e);
    }

    Ok(HttpResponse::Ok().json(UploadResponse {
        message: verdict_message(target, true),
        status: true,
        confidence: Some(result.confidence),
    }))
}

async fn read_image_field(payload: &mut Multipart, limit: usize) -> Result<Upload, UploadError> {
    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or_default()
            .to_string();
        if filename.is_empty() {
            return Err(UploadError::NoSelectedFile);
        }
        let format = format_for(&filename).ok_or(UploadError::InvalidFormat)?;

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = chunk.map_err(|e| UploadError::Multipart(e.to_string()))?;
            if bytes.len() + data.len() > limit {
                return Err(UploadError::TooLarge(limit));
            }
            bytes.extend_from_slice(&data);
        }

        return Ok(Upload {
            filename,
            format,
            bytes,
        });
    }

    Err(UploadError::MissingFile)
}

fn format_for(filename: &str) -> Option<ImageFormat> {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".png") {
        Some(ImageFormat::Png)
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        Some(ImageFormat::Jpeg)
    } else {
        None
    }
}

fn encode_like_upload(
    image: &DynamicImage,
    format: ImageFormat,
) -> Result<Vec<u8>, image::ImageError> {
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut encoded = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut encoded), format)?;
    Ok(encoded)
}
