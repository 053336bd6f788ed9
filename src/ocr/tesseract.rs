#![cfg(feature = "ocr-tesseract")]

use std::io::Cursor;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, ImageFormat};
use leptess::LepTess;

use crate::ocr::RecognitionEngine;

/// Tesseract recognizer via leptess. Loaded once from a tessdata directory.
pub struct TesseractEngine {
    inner: LepTess,
}

impl TesseractEngine {
    pub fn new<P: AsRef<Path>>(tessdata: P, language: &str) -> Result<Self> {
        let tessdata = tessdata.as_ref();
        if !tessdata.is_dir() {
            return Err(anyhow!("tessdata directory {} not found", tessdata.display()));
        }
        let path = tessdata
            .to_str()
            .ok_or_else(|| anyhow!("tessdata path is not valid UTF-8"))?;
        let inner = LepTess::new(Some(path), language)
            .with_context(|| format!("failed to initialize tesseract ({})", language))?;
        Ok(Self { inner })
    }
}

impl RecognitionEngine for TesseractEngine {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&mut self, image: &GrayImage) -> Result<String> {
        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageFormat::Png)
            .context("encode OCR input")?;
        self.inner
            .set_image_from_mem(png.get_ref())
            .context("tesseract rejected image")?;
        self.inner
            .get_utf8_text()
            .context("tesseract recognition failed")
    }
}
