mod backend;
mod backends;
mod detector;
mod result;

pub use backend::InferenceEngine;
#[cfg(feature = "backend-tract")]
pub use backends::TractEngine;
pub use detector::{Detector, DetectorSettings};
pub use result::{BoundingBox, Detection, FrameResult, ImageSize, Rect};
