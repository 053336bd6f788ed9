//! Periodic log consolidation.
//!
//! Each cycle drains the journal, groups events by subject, keeps the single
//! best reliable event per subject, enriches it, and persists one log.
//! Cycles are independent: nothing carries over between iterations, and an
//! event drained by a cycle that crashes is gone.

use anyhow::{anyhow, Result};
use base64::Engine as _;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::enrich::SceneEnricher;
use crate::event::{DetectionEvent, DetectionLog};
use crate::journal::EventJournal;
use crate::storage::DetectionLogStore;

const STOP_POLL: Duration = Duration::from_millis(50);

/// Outcome of one consolidation cycle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub drained: usize,
    pub parse_failures: usize,
    pub groups: usize,
    pub skipped_unreliable: usize,
    pub skipped_missing_image: usize,
    /// Store-assigned ids, in group encounter order.
    pub persisted: Vec<i64>,
    pub persist_failures: usize,
}

/// Group events by subject, preserving first-encounter order of subjects and
/// of events within each subject.
pub fn group_by_subject(events: Vec<DetectionEvent>) -> Vec<(String, Vec<DetectionEvent>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<DetectionEvent>)> = Vec::new();
    for event in events {
        match index.get(&event.subject_id) {
            Some(&slot) => groups[slot].1.push(event),
            None => {
                index.insert(event.subject_id.clone(), groups.len());
                groups.push((event.subject_id.clone(), vec![event]));
            }
        }
    }
    groups
}

/// Highest `object_count` among reliable events; the first maximum wins.
pub fn pick_representative(events: &[DetectionEvent]) -> Option<&DetectionEvent> {
    let mut best: Option<&DetectionEvent> = None;
    for event in events.iter().filter(|e| e.is_reliable()) {
        match best {
            Some(current) if current.object_count >= event.object_count => {}
            _ => best = Some(event),
        }
    }
    best
}

pub struct ConsolidationWorker {
    journal: Arc<dyn EventJournal>,
    enricher: Box<dyn SceneEnricher>,
    store: Box<dyn DetectionLogStore>,
}

impl ConsolidationWorker {
    pub fn new(
        journal: Arc<dyn EventJournal>,
        enricher: Box<dyn SceneEnricher>,
        store: Box<dyn DetectionLogStore>,
    ) -> Self {
        Self {
            journal,
            enricher,
            store,
        }
    }

    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let lines = self.journal.drain_all()?;
        let mut report = CycleReport {
            drained: lines.len(),
            ..CycleReport::default()
        };
        if lines.is_empty() {
            return Ok(report);
        }

        let mut events = Vec::with_capacity(lines.len());
        for line in &lines {
            match DetectionEvent::from_line(line) {
                Ok(event) => events.push(event),
                Err(e) => {
                    report.parse_failures += 1;
                    log::warn!(
                        "dropping unparseable journal line ({} bytes): {:#}",
                        line.len(),
                        e
                    );
                }
            }
        }

        let groups = group_by_subject(events);
        report.groups = groups.len();
        for (subject, group) in groups {
            let Some(best) = pick_representative(&group) else {
                report.skipped_unreliable += 1;
                log::info!("no reliable events for subject {} in this cycle", subject);
                continue;
            };

            let image = match decode_image(best) {
                Ok(image) => image,
                Err(e) => {
                    report.skipped_missing_image += 1;
                    log::warn!(
                        "best event for subject {} has no usable image, skipping enrichment: {:#}",
                        subject,
                        e
                    );
                    continue;
                }
            };

            log::info!(
                "generating scene analysis for subject {} ({} of {} events reliable)",
                subject,
                group.iter().filter(|e| e.is_reliable()).count(),
                group.len()
            );
            let description = self.enricher.describe(
                &image,
                &best.enrichment_detections(),
                &best.extracted_text,
            );

            let record = DetectionLog::from_event(best, description);
            match self.store.insert(&record) {
                Ok(id) => {
                    log::info!(
                        "saved detection log {} for subject {} ({} objects)",
                        id,
                        subject,
                        record.object_count
                    );
                    report.persisted.push(id);
                }
                Err(e) => {
                    report.persist_failures += 1;
                    log::error!(
                        "failed to persist detection log for subject {}: {:#}",
                        subject,
                        e
                    );
                }
            }
        }
        Ok(report)
    }

    /// Run cycles on a background thread every `interval` until stopped.
    pub fn spawn(mut self, interval: Duration) -> Result<WorkerHandle> {
        if interval.is_zero() {
            return Err(anyhow!("consolidation interval must be greater than zero"));
        }
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("consolidation".to_string())
            .spawn(move || {
                log::info!(
                    "consolidation worker running every {}s",
                    interval.as_secs_f32()
                );
                'outer: loop {
                    let started = Instant::now();
                    while started.elapsed() < interval {
                        if shutdown_thread.load(Ordering::SeqCst) {
                            break 'outer;
                        }
                        std::thread::sleep(STOP_POLL.min(interval));
                    }
                    match self.run_cycle() {
                        Ok(report) if report.drained > 0 => log::debug!("cycle: {:?}", report),
                        Ok(_) => {}
                        Err(e) => log::error!("consolidation cycle failed: {:#}", e),
                    }
                }
                log::info!("consolidation worker stopped");
            })?;
        Ok(WorkerHandle {
            shutdown,
            join: Some(join),
        })
    }
}

fn decode_image(event: &DetectionEvent) -> Result<Vec<u8>> {
    let encoded = event
        .image_base64
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| anyhow!("image data missing"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| anyhow!("invalid base64 image: {}", e))?;
    if bytes.is_empty() {
        return Err(anyhow!("image data empty"));
    }
    Ok(bytes)
}

#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("consolidation thread panicked"))?;
        }
        Ok(())
    }
}
