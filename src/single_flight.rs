//! Single-flight executor.
//!
//! A `SingleFlight<R>` moves a resource `R` onto one dedicated worker thread.
//! Callers never touch `R` directly: they `submit` a closure and wait on the
//! returned `Pending`. Jobs run strictly one at a time, in submission order.
//!
//! A job that panics is reported to its submitter as an engine failure; the
//! worker keeps running, so one bad frame never wedges later callers.
//!
//! A submitter that gives up calls `Pending::cancel`. A job still queued is
//! then skipped without touching `R`; a job already running is waited out.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::PipelineError;

type Job<R> = Box<dyn FnOnce(&mut R) + Send + 'static>;

const QUEUED: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

pub struct SingleFlight<R: Send + 'static> {
    name: &'static str,
    tx: Mutex<Option<Sender<Job<R>>>>,
    join: Option<JoinHandle<()>>,
}

impl<R: Send + 'static> SingleFlight<R> {
    pub fn spawn(name: &'static str, resource: R) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job<R>>();
        let join = std::thread::Builder::new()
            .name(format!("{}-single-flight", name))
            .spawn(move || {
                let mut resource = resource;
                while let Ok(job) = rx.recv() {
                    job(&mut resource);
                }
                log::debug!("{} executor stopped", name);
            })?;
        Ok(Self {
            name,
            tx: Mutex::new(Some(tx)),
            join: Some(join),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue a job against the owned resource.
    pub fn submit<T, F>(&self, task: F) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut R) -> Result<T, PipelineError> + Send + 'static,
    {
        let (done_tx, done_rx) = mpsc::channel();
        let name = self.name;
        let state = Arc::new(AtomicU8::new(QUEUED));
        let job_state = state.clone();
        let job: Job<R> = Box::new(move |resource: &mut R| {
            if job_state
                .compare_exchange(QUEUED, RUNNING, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                log::debug!("{} job cancelled before it started", name);
                let _ = done_tx.send(Err(PipelineError::Timeout));
                return;
            }
            let outcome = match catch_unwind(AssertUnwindSafe(|| task(resource))) {
                Ok(outcome) => outcome,
                Err(_) => {
                    log::error!("{} job panicked", name);
                    Err(PipelineError::Engine(format!("{} engine panicked", name)))
                }
            };
            // submitter may have given up; nothing to do then
            let _ = done_tx.send(outcome);
        });

        let sent = match self.tx.lock() {
            Ok(guard) => guard.as_ref().map(|tx| tx.send(job).is_ok()).unwrap_or(false),
            Err(_) => false,
        };
        if !sent {
            return Pending::failed(PipelineError::Engine(format!(
                "{} executor is not running",
                name
            )));
        }
        Pending {
            rx: Some(done_rx),
            early: None,
            state,
        }
    }
}

impl<R: Send + 'static> Drop for SingleFlight<R> {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("{} executor thread panicked", self.name);
            }
        }
    }
}

/// Handle to one submitted job.
#[must_use = "a pending job should be waited on"]
pub struct Pending<T> {
    rx: Option<Receiver<Result<T, PipelineError>>>,
    early: Option<PipelineError>,
    state: Arc<AtomicU8>,
}

impl<T> Pending<T> {
    fn failed(err: PipelineError) -> Self {
        Self {
            rx: None,
            early: Some(err),
            state: Arc::new(AtomicU8::new(RUNNING)),
        }
    }

    /// Give up on the job. Returns `true` if it was skipped before it ran;
    /// otherwise blocks until the running job finishes and drops its result.
    pub fn cancel(self) -> bool {
        if self
            .state
            .compare_exchange(QUEUED, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return true;
        }
        let _ = self.wait();
        false
    }

    /// Block until the job finishes.
    pub fn wait(mut self) -> Result<T, PipelineError> {
        if let Some(err) = self.early.take() {
            return Err(err);
        }
        match self.rx.take() {
            Some(rx) => rx.recv().unwrap_or_else(|_| {
                Err(PipelineError::Engine("executor dropped the job".to_string()))
            }),
            None => Err(PipelineError::Engine("job already consumed".to_string())),
        }
    }

    /// Wait at most `timeout`. On expiry the handle is returned so the caller
    /// can still drain it.
    pub fn wait_timeout(mut self, timeout: Duration) -> Result<Result<T, PipelineError>, Self> {
        if let Some(err) = self.early.take() {
            return Ok(Err(err));
        }
        let Some(rx) = self.rx.take() else {
            return Ok(Err(PipelineError::Engine("job already consumed".to_string())));
        };
        match rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Disconnected) => Ok(Err(PipelineError::Engine(
                "executor dropped the job".to_string(),
            ))),
            Err(RecvTimeoutError::Timeout) => Err(Pending {
                rx: Some(rx),
                early: None,
                state: self.state.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_run_one_at_a_time() {
        let active = Arc::new(AtomicUsize::new(0));
        let flight = Arc::new(SingleFlight::spawn("test", 0u64).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flight = flight.clone();
                let active = active.clone();
                std::thread::spawn(move || {
                    flight
                        .submit(move |counter: &mut u64| {
                            let now = active.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(now, 0, "two jobs ran at once");
                            std::thread::sleep(Duration::from_millis(5));
                            *counter += 1;
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok(*counter)
                        })
                        .wait()
                })
            })
            .collect();

        let mut seen: Vec<u64> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (1..=8).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_job_does_not_poison_the_executor() {
        let flight = SingleFlight::spawn("panicky", ()).unwrap();
        let err = flight
            .submit(|_: &mut ()| -> Result<(), PipelineError> { panic!("engine blew up") })
            .wait()
            .unwrap_err();
        assert!(matches!(err, PipelineError::Engine(_)));

        let ok = flight.submit(|_: &mut ()| Ok(7)).wait().unwrap();
        assert_eq!(ok, 7);
    }

    #[test]
    fn timed_out_wait_can_still_be_drained() {
        let flight = SingleFlight::spawn("slow", ()).unwrap();
        let pending = flight.submit(|_: &mut ()| {
            std::thread::sleep(Duration::from_millis(100));
            Ok("done")
        });
        let pending = match pending.wait_timeout(Duration::from_millis(1)) {
            Err(pending) => pending,
            Ok(_) => panic!("job finished before its deadline"),
        };
        assert_eq!(pending.wait().unwrap(), "done");
    }

    #[test]
    fn cancelled_queued_job_never_touches_the_resource() {
        let flight = SingleFlight::spawn("queue", 0u32).unwrap();
        let busy = flight.submit(|runs: &mut u32| {
            std::thread::sleep(Duration::from_millis(100));
            *runs += 1;
            Ok(*runs)
        });
        let queued = flight.submit(|runs: &mut u32| {
            *runs += 1;
            Ok(*runs)
        });

        assert!(queued.cancel());
        assert_eq!(busy.wait().unwrap(), 1);
        let after = flight.submit(|runs: &mut u32| Ok(*runs)).wait().unwrap();
        assert_eq!(after, 1, "cancelled job ran anyway");
    }

    #[test]
    fn cancelling_a_running_job_waits_for_it() {
        let flight = SingleFlight::spawn("running", 0u32).unwrap();
        let started = std::time::Instant::now();
        let pending = flight.submit(|runs: &mut u32| {
            std::thread::sleep(Duration::from_millis(80));
            *runs += 1;
            Ok(())
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(!pending.cancel());
        assert!(started.elapsed() >= Duration::from_millis(80));
        let runs = flight.submit(|runs: &mut u32| Ok(*runs)).wait().unwrap();
        assert_eq!(runs, 1);
    }
}
