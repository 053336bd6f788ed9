//! ivad - Intelligent Video Analysis daemon
//!
//! This daemon:
//! 1. Loads the detector and OCR engines once (missing artifacts are fatal)
//! 2. Starts the periodic consolidation worker
//! 3. Reads frame requests as JSON lines on stdin:
//!    `{"subject_id": "...", "image_base64": "..."}` (or the bare line `status`)
//! 4. Processes requests concurrently and writes one JSON line per response
//! 5. Stops the worker on Ctrl-C or end of input

use anyhow::{anyhow, Result};
use clap::Parser;
use serde::Deserialize;
use serde_json::json;
use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use iva_kernel::runtime;
use iva_kernel::{
    ConsolidationWorker, FrameCoordinator, IvaConfig, ReadinessFlag, SqliteDetectionLogStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Frame analysis daemon with periodic log consolidation")]
struct Args {
    /// Number of concurrent request threads.
    #[arg(long, env = "IVA_REQUEST_THREADS", default_value_t = 4)]
    request_threads: usize,
}

#[derive(Debug, Deserialize)]
struct FrameRequest {
    subject_id: String,
    #[serde(default)]
    image_base64: String,
}

enum Signal {
    Interrupted,
    InputClosed,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    if args.request_threads == 0 {
        return Err(anyhow!("--request-threads must be at least 1"));
    }

    let cfg = IvaConfig::load()?;
    let readiness = ReadinessFlag::new();

    let journal = runtime::open_journal(&cfg)?;
    let coordinator = Arc::new(runtime::build_coordinator(&cfg, journal.clone())?);
    let store = SqliteDetectionLogStore::open(&cfg.db_path)?;
    let worker = ConsolidationWorker::new(journal, runtime::build_enricher(&cfg), Box::new(store))
        .spawn(cfg.consolidation_interval)?;

    readiness.mark_ready();
    log::info!("all models loaded; ivad is {}", readiness.status());
    log::info!(
        "journal={} db={} consolidation every {}s",
        cfg.journal_path.display(),
        cfg.db_path,
        cfg.consolidation_interval.as_secs()
    );

    let (signal_tx, signal_rx) = mpsc::channel();
    let ctrlc_tx = signal_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Signal::Interrupted);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let (work_tx, work_rx) = mpsc::channel::<(u64, String)>();
    let work_rx = Arc::new(Mutex::new(work_rx));
    let request_threads: Vec<_> = (0..args.request_threads)
        .map(|_| {
            let work_rx = work_rx.clone();
            let coordinator = coordinator.clone();
            let readiness = readiness.clone();
            std::thread::spawn(move || loop {
                let next = match work_rx.lock() {
                    Ok(rx) => rx.recv(),
                    Err(_) => break,
                };
                let Ok((seq, line)) = next else {
                    break;
                };
                let response = handle_line(&coordinator, &readiness, seq, &line);
                let mut out = std::io::stdout().lock();
                if writeln!(out, "{}", response).and_then(|_| out.flush()).is_err() {
                    log::warn!("stdout closed; dropping response {}", seq);
                }
            })
        })
        .collect();

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for (seq, line) in stdin.lock().lines().enumerate() {
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => {
                    if work_tx.send((seq as u64, line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("stdin read failed: {}", e);
                    break;
                }
            }
        }
        drop(work_tx);
        let _ = signal_tx.send(Signal::InputClosed);
    });

    match signal_rx.recv() {
        Ok(Signal::InputClosed) => {
            log::info!("input closed, finishing in-flight requests...");
            for handle in request_threads {
                if handle.join().is_err() {
                    log::error!("request thread panicked");
                }
            }
        }
        Ok(Signal::Interrupted) | Err(_) => {
            log::info!("shutdown signal received");
        }
    }

    log::info!("stopping consolidation worker...");
    worker.stop()?;
    Ok(())
}

fn handle_line(
    coordinator: &FrameCoordinator,
    readiness: &ReadinessFlag,
    seq: u64,
    line: &str,
) -> serde_json::Value {
    if line.trim() == "status" {
        return json!({ "seq": seq, "status": readiness.status() });
    }
    let request: FrameRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("request {} rejected: malformed JSON: {}", seq, e);
            return json!({ "seq": seq, "error": format!("malformed request: {}", e) });
        }
    };
    match coordinator.process_frame(&request.image_base64, &request.subject_id) {
        Ok(result) => json!({ "seq": seq, "result": result }),
        Err(e) => {
            log::warn!(
                "request {} for subject {} failed: {}",
                seq,
                request.subject_id,
                e
            );
            json!({ "seq": seq, "error": e.to_string() })
        }
    }
}
