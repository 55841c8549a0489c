use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use log::debug;
use shared::{DetectionCandidate, ModelResponse};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum DetectError {
    #[error("Failed to encode image for inference: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Model request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Model server answered with status {0}")]
    Status(reqwest::StatusCode),
}

/// Raw object detection: every candidate the model sees, unfiltered.
#[async_trait]
pub trait ObjectModel: Send + Sync + 'static {
    async fn infer(&self, image: &DynamicImage) -> Result<Vec<DetectionCandidate>, DetectError>;
}

/// Object detection served by an HTTP model server.
///
/// The image is posted as PNG; the server answers with
/// `{"detections": [{"label", "score", "bbox"}]}`.
#[derive(Clone)]
pub struct RemoteModel {
    client: reqwest::Client,
    endpoint: Url,
}

impl RemoteModel {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl ObjectModel for RemoteModel {
    async fn infer(&self, image: &DynamicImage) -> Result<Vec<DetectionCandidate>, DetectError> {
        let mut body = Vec::new();
        image.write_to(&mut Cursor::new(&mut body), ImageFormat::Png)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(reqwest::header::CONTENT_TYPE, "image/png")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectError::Status(status));
        }

        let parsed: ModelResponse = response.json().await?;
        debug!("Model returned {} candidates", parsed.detections.len());
        Ok(parsed.detections)
    }
}
