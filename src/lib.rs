//! Intelligent Video Analysis kernel (IVA)
//!
//! This crate implements the frame-analysis pipeline and the log
//! consolidation worker.
//!
//! # Architecture
//!
//! ```text
//! caller -> FrameCoordinator -+-> Detector      (single-flight) -+-> FrameResult
//!                             +-> TextExtractor (single-flight) -+        |
//!                                                                         v
//!                                                                  EventJournal
//!                                                                         |
//!                                  ConsolidationWorker (periodic) <-------+
//!                                     -> SceneEnricher -> DetectionLogStore
//! ```
//!
//! # Module Structure
//!
//! - `codec`: image -> tensor encoding, proposal decoding and NMS
//! - `detect`: inference engine seam and the single-flight `Detector`
//! - `ocr`: recognition engine seam and the single-flight `TextExtractor`
//! - `coordinator`: concurrent fan-out/join per frame
//! - `journal`: append-only, drain-and-clear event buffer
//! - `worker`: periodic consolidation into durable logs
//! - `enrich`, `storage`: external collaborator interfaces

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod enrich;
pub mod error;
pub mod event;
pub mod journal;
pub mod ocr;
pub mod runtime;
pub mod single_flight;
pub mod status;
pub mod storage;
pub mod worker;

pub use codec::{decode, encode, DecodeParams, EncodedFrame};
pub use config::IvaConfig;
pub use coordinator::FrameCoordinator;
pub use detect::{
    BoundingBox, Detection, Detector, DetectorSettings, FrameResult, ImageSize, InferenceEngine,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractEngine;
pub use enrich::{SceneEnricher, StaticEnricher};
#[cfg(feature = "enrich-gemini")]
pub use enrich::GeminiEnricher;
pub use error::PipelineError;
pub use event::{DetectionEvent, DetectionLog};
pub use journal::{EventJournal, FileJournal, MemoryJournal};
#[cfg(feature = "ocr-tesseract")]
pub use ocr::TesseractEngine;
pub use ocr::{NullRecognizer, OcrSettings, RecognitionEngine, TextExtractor};
pub use single_flight::{Pending, SingleFlight};
pub use status::ReadinessFlag;
pub use storage::{DetectionLogStore, InMemoryDetectionLogStore, SqliteDetectionLogStore};
pub use worker::{ConsolidationWorker, CycleReport, WorkerHandle};
