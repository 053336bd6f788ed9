use serde::{Deserialize, Serialize};

/// Pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Axis-aligned box in original-image pixel coordinates.
///
/// Always non-negative and clipped to the source image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        crate::codec::iou(&Rect::from(*self), &Rect::from(*other))
    }
}

/// Corner-form float box used while decoding, before clipping and rounding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - 0.5 * w,
            y1: cy - 0.5 * h,
            x2: cx + 0.5 * w,
            y2: cy + 0.5 * h,
        }
    }

    pub fn scale(self, x_factor: f32, y_factor: f32) -> Self {
        Self {
            x1: self.x1 * x_factor,
            y1: self.y1 * y_factor,
            x2: self.x2 * x_factor,
            y2: self.y2 * y_factor,
        }
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Clamp every corner to `[0, width] x [0, height]`.
    pub fn clip(self, size: ImageSize) -> Self {
        let w = size.width as f32;
        let h = size.height as f32;
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Clip to `[0, width] x [0, height]` and snap to whole pixels.
    pub fn clip_to(&self, size: ImageSize) -> BoundingBox {
        let clipped = self.clip(size);
        let left = clipped.x1.round() as u32;
        let top = clipped.y1.round() as u32;
        let right = clipped.x2.round() as u32;
        let bottom = clipped.y2.round() as u32;
        BoundingBox {
            x: left,
            y: top,
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

impl From<BoundingBox> for Rect {
    fn from(b: BoundingBox) -> Self {
        Self {
            x1: b.x as f32,
            y1: b.y as f32,
            x2: (b.x + b.width) as f32,
            y2: (b.y + b.height) as f32,
        }
    }
}

/// One kept detection. Immutable once produced by the codec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub class_name: String,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl Detection {
    /// Label-only detection, used when only class names survive (legacy journal lines).
    pub fn labelled(class_name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            confidence: 0.0,
            bounding_box: BoundingBox::default(),
        }
    }
}

/// Combined output of one `process_frame` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameResult {
    pub detections: Vec<Detection>,
    pub extracted_text: String,
}
