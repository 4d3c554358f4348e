//! Background stretch rendering.
//!
//! Jobs go to a dedicated thread over a crossbeam channel; results come back
//! the same way. Every submission bumps a shared generation counter, and the
//! render loop polls it between frames, so submitting a new job cancels the
//! one in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use flurry_params::Seed;
use tracing::{debug, trace};

use super::cache::StretchKey;
use super::paulstretch::{render_cancellable, StretchBuffer, StretchSettings};
use crate::error::EngineResult;

/// One render request.
#[derive(Debug, Clone)]
pub struct StretchJob {
    pub key: StretchKey,
    pub source: Vec<f64>,
    pub sample_rate: f64,
    pub settings: StretchSettings,
    pub phase_seed: Seed,
}

/// What came back from the worker.
#[derive(Debug)]
pub enum StretchOutcome {
    Ready {
        generation: u64,
        key: StretchKey,
        buffer: Box<StretchBuffer>,
    },
    Cancelled {
        generation: u64,
        key: StretchKey,
    },
}

struct Queued {
    generation: u64,
    job: StretchJob,
}

/// Handle to the stretch thread.
pub struct StretchWorker {
    jobs: Option<Sender<Queued>>,
    results: Receiver<StretchOutcome>,
    generation: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl StretchWorker {
    /// Starts the worker thread.
    pub fn spawn() -> EngineResult<Self> {
        let (job_tx, job_rx) = unbounded::<Queued>();
        let (result_tx, result_rx) = unbounded::<StretchOutcome>();
        let generation = Arc::new(AtomicU64::new(0));
        let shared = Arc::clone(&generation);

        let handle = thread::Builder::new()
            .name("flurry-stretch".to_string())
            .spawn(move || {
                for Queued { generation, job } in job_rx.iter() {
                    let stale = || shared.load(Ordering::Acquire) != generation;
                    if stale() {
                        trace!(generation, "skipping stale stretch job");
                        if result_tx
                            .send(StretchOutcome::Cancelled {
                                generation,
                                key: job.key,
                            })
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                    let rendered = render_cancellable(
                        &job.source,
                        job.sample_rate,
                        &job.settings,
                        job.phase_seed,
                        stale,
                    );
                    let outcome = match rendered {
                        Some(buffer) => StretchOutcome::Ready {
                            generation,
                            key: job.key,
                            buffer: Box::new(buffer),
                        },
                        None => StretchOutcome::Cancelled {
                            generation,
                            key: job.key,
                        },
                    };
                    if result_tx.send(outcome).is_err() {
                        break;
                    }
                }
            })?;

        debug!("stretch worker started");
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            generation,
            handle: Some(handle),
        })
    }

    /// Queues a job, cancelling any job in flight. Returns its generation.
    pub fn submit(&self, job: StretchJob) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(jobs) = &self.jobs {
            if jobs.send(Queued { generation, job }).is_err() {
                debug!("stretch worker gone; job dropped");
            }
        }
        generation
    }

    /// Cancels whatever is in flight without queueing anything.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Generation of the most recent submission or cancel.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Returns a finished outcome if one is waiting.
    pub fn try_recv(&self) -> Option<StretchOutcome> {
        self.results.try_recv().ok()
    }

    /// Waits up to `timeout` for an outcome.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<StretchOutcome> {
        self.results.recv_timeout(timeout).ok()
    }

    /// Cancels outstanding work and joins the thread.
    pub fn shutdown(&mut self) {
        self.cancel();
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                debug!("stretch worker panicked during shutdown");
            }
        }
    }
}

impl Drop for StretchWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for StretchWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StretchWorker")
            .field("generation", &self.generation())
            .field("running", &self.handle.is_some())
            .finish()
    }
}
