//! Text extraction (OCR) path.
//!
//! Flow per image: decode -> grayscale -> optional Otsu binarization ->
//! recognition engine -> whitespace trim. The recognition engine lives on its
//! own single-flight worker, independent of the detector's.

mod binarize;
mod extractor;
#[cfg(feature = "ocr-tesseract")]
mod tesseract;

use anyhow::Result;
use image::GrayImage;

pub use binarize::{binarize, otsu_threshold};
pub use extractor::{OcrSettings, TextExtractor};
#[cfg(feature = "ocr-tesseract")]
pub use tesseract::TesseractEngine;

/// Text recognition engine. Not assumed safe for concurrent use.
pub trait RecognitionEngine: Send {
    fn name(&self) -> &'static str;

    fn recognize(&mut self, image: &GrayImage) -> Result<String>;
}

/// Engine that never finds text. Used when the build has no OCR backend.
#[derive(Debug, Default)]
pub struct NullRecognizer;

impl RecognitionEngine for NullRecognizer {
    fn name(&self) -> &'static str {
        "null"
    }

    fn recognize(&mut self, _image: &GrayImage) -> Result<String> {
        Ok(String::new())
    }
}
