use std::sync::Arc;

use image::DynamicImage;
use log::info;
use shared::DetectionCandidate;

use crate::detection::annotation::annotate;
use crate::detection::model::{DetectError, ObjectModel};

/// Verdict for one uploaded image.
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub found: bool,
    /// Percentage in `0..=100`; zero when nothing was found.
    pub confidence: u8,
    pub best: Option<DetectionCandidate>,
    /// Copy of the input with the best match drawn on it.
    pub annotated: Option<DynamicImage>,
}

impl DetectionResult {
    fn not_found() -> Self {
        Self {
            found: false,
            confidence: 0,
            best: None,
            annotated: None,
        }
    }
}

/// Applies the target-class and threshold policy on top of an [`ObjectModel`].
///
/// Among candidates of the target class scoring strictly above the threshold
/// the highest-scoring one is reported.
#[derive(Clone)]
pub struct Detector {
    model: Arc<dyn ObjectModel>,
    target_class: String,
    min_confidence: f32,
}

impl Detector {
    pub fn new(model: Arc<dyn ObjectModel>, target_class: String, min_confidence: f32) -> Self {
        Self {
            model,
            target_class,
            min_confidence,
        }
    }

    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    pub async fn detect(&self, image: &DynamicImage) -> Result<DetectionResult, DetectError> {
        let candidates = self.model.infer(image).await?;

        let Some(best) = select_best(candidates, &self.target_class, self.min_confidence) else {
            info!("No {} detected", self.target_class);
            return Ok(DetectionResult::not_found());
        };

        let confidence = to_percent(best.score);
        info!("{} detected with confidence {}%", self.target_class, confidence);
        let annotated = annotate(image, best.bbox, confidence);

        Ok(DetectionResult {
            found: true,
            confidence,
            best: Some(best),
            annotated: Some(annotated),
        })
    }
}

fn select_best(
    candidates: Vec<DetectionCandidate>,
    target_class: &str,
    min_confidence: f32,
) -> Option<DetectionCandidate> {
    candidates
        .into_iter()
        .filter(|c| c.label.eq_ignore_ascii_case(target_class))
        .filter(|c| c.score.is_finite() && c.score > min_confidence)
        .max_by(|a, b| a.score.total_cmp(&b.score))
}

/// "Bottle detected" / "No bottle detected" for the configured class.
pub fn verdict_message(target_class: &str, found: bool) -> String {
    if found {
        let mut chars = target_class.chars();
        match chars.next() {
            Some(first) => format!("{}{} detected", first.to_uppercase(), chars.as_str()),
            None => "Object detected".to_string(),
        }
    } else {
        format!("No {} detected", target_class)
    }
}

/// Model score in `0..1` to a whole percentage, rounding half away from zero.
pub fn to_percent(score: f32) -> u8 {
    (score * 100.0).round().clamp(0.0, 100.0) as u8
}
