pub mod annotation;
pub mod detector;
pub mod model;

pub use detector::{DetectionResult, Detector, verdict_message};
pub use model::{DetectError, RemoteModel};
