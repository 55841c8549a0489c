use async_trait::async_trait;

use crate::storage::temp_store::ScratchFile;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to read scratch file: {0}")]
    Read(#[from] std::io::Error),
    #[error("S3 error: {0}")]
    S3(String),
    #[error("Publish timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Durable, publicly readable storage keyed by path.
///
/// Publishing the same key twice overwrites the earlier object.
#[async_trait]
pub trait ArtifactPublisher: Send + Sync + 'static {
    async fn publish(&self, file: &ScratchFile, key: &str) -> Result<String, PublishError>;
}

pub fn original_key(id: &str) -> String {
    format!("vending/original/{}", id)
}

pub fn annotated_key(confidence: u8, id: &str) -> String {
    format!("vending/label/{}_{}", confidence, id)
}

pub fn content_type_for(name: &str) -> &'static str {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_follow_vending_layout() {
        assert_eq!(original_key("abc_a.png"), "vending/original/abc_a.png");
        assert_eq!(annotated_key(87, "abc_a.png"), "vending/label/87_abc_a.png");
    }

    #[test]
    fn content_type_is_guessed_from_extension() {
        assert_eq!(content_type_for("X.PNG"), "image/png");
        assert_eq!(content_type_for("x.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("x.bin"), "application/octet-stream");
    }
}
