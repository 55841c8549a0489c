use serde::{Deserialize, Serialize};

/// Body returned by `POST /upload` once a verdict exists.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct UploadResponse {
    pub message: String,
    pub status: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub confidence: Option<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthResponse {
    pub status: String,
}

/// Payload posted to the downstream endpoint after the original image is public.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NotificationEvent {
    pub message: String,
    pub url: String,
}

/// One raw detection as reported by the model server.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionCandidate {
    pub label: String,
    pub score: f32,
    /// `[x1, y1, x2, y2]` in pixels of the submitted image.
    pub bbox: [f32; 4],
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ModelResponse {
    #[serde(default)]
    pub detections: Vec<DetectionCandidate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_response_omits_confidence() {
        let body = UploadResponse {
            message: "No bottle detected".into(),
            status: false,
            confidence: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("confidence").is_none());
        assert_eq!(json["status"], false);
    }

    #[test]
    fn model_response_tolerates_missing_detections() {
        let parsed: ModelResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.detections.is_empty());
    }
}
