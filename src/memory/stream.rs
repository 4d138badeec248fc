//! In-order device work queue.
//!
//! A [`Stream`] owns a dedicated worker thread fed through a crossbeam
//! channel. Work submitted with [`Stream::launch`] runs in submission order;
//! [`Stream::synchronize`] blocks until everything submitted before it has
//! completed and reports the first kernel failure since the last sync.
//!
//! Kernels must only capture [`DevicePtr`](super::device::DevicePtr)s and
//! plain data, never buffers or streams.

use super::device::Device;
use super::error::{MemResult, MemoryError};
use crossbeam_channel::{bounded, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{JoinHandle, ThreadId};

/// Maximum number of queued operations before `launch` blocks.
pub const STREAM_QUEUE_CAPACITY: usize = 1024;

/// Capability token handed to kernels; device memory is only reachable through it.
pub struct KernelScope {
    _private: (),
}

type Kernel = Box<dyn FnOnce(&KernelScope) -> MemResult<()> + Send + 'static>;

enum StreamOp {
    Launch { seq: u64, name: String, kernel: Kernel },
    Fence(Sender<()>),
    Shutdown,
}

#[derive(Default)]
struct StreamStats {
    launched: AtomicU64,
    completed: AtomicU64,
    skipped: AtomicU64,
    /// One past the sequence number of the latest failed or skipped kernel
    fault_mark: AtomicU64,
}

struct StreamInner {
    name: String,
    device: Device,
    op_tx: Sender<StreamOp>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    error: Arc<Mutex<Option<MemoryError>>>,
    stats: Arc<StreamStats>,
}

/// Handle to a device stream. Cloning shares the same queue.
#[derive(Clone)]
pub struct Stream {
    inner: Arc<StreamInner>,
}

impl Stream {
    /// Spawn a stream worker bound to `device`.
    pub fn new(device: Device, name: impl Into<String>) -> MemResult<Self> {
        let name = name.into();
        let (op_tx, op_rx) = bounded::<StreamOp>(STREAM_QUEUE_CAPACITY);
        let error: Arc<Mutex<Option<MemoryError>>> = Arc::new(Mutex::new(None));
        let stats = Arc::new(StreamStats::default());

        let worker_error = Arc::clone(&error);
        let worker_stats = Arc::clone(&stats);
        let worker_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("stream-{}", name))
            .spawn(move || {
                let scope = KernelScope { _private: () };
                tracing::debug!("Stream '{}' worker started", worker_name);
                while let Ok(op) = op_rx.recv() {
                    match op {
                        StreamOp::Launch { seq, name, kernel } => {
                            let mut sticky = worker_error.lock().unwrap_or_else(PoisonError::into_inner);
                            if sticky.is_some() {
                                // Work after a failure is dropped until the error is observed
                                worker_stats.skipped.fetch_add(1, Ordering::Relaxed);
                                worker_stats.fault_mark.fetch_max(seq + 1, Ordering::SeqCst);
                                continue;
                            }
                            drop(sticky);
                            let result = kernel(&scope);
                            worker_stats.completed.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = result {
                                tracing::warn!("Kernel '{}' failed: {}", name, e);
                                worker_stats.fault_mark.fetch_max(seq + 1, Ordering::SeqCst);
                                sticky = worker_error.lock().unwrap_or_else(PoisonError::into_inner);
                                *sticky = Some(MemoryError::KernelFailed {
                                    kernel: name,
                                    message: e.to_string(),
                                });
                            }
                        }
                        StreamOp::Fence(done) => {
                            let _ = done.send(());
                        }
                        StreamOp::Shutdown => break,
                    }
                }
                tracing::debug!("Stream '{}' worker exiting", worker_name);
            })
            .map_err(|e| MemoryError::StreamClosed(format!("{}: {}", name, e)))?;

        let worker_id = handle.thread().id();
        Ok(Self {
            inner: Arc::new(StreamInner {
                name,
                device,
                op_tx,
                worker: Mutex::new(Some(handle)),
                worker_id,
                error,
                stats,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Enqueue a kernel. Returns as soon as the work is queued.
    pub fn launch<F>(&self, name: impl Into<String>, kernel: F) -> MemResult<()>
    where
        F: FnOnce(&KernelScope) -> MemResult<()> + Send + 'static,
    {
        let name = name.into();
        tracing::trace!("Stream '{}' launch '{}'", self.inner.name, name);
        let seq = self.inner.stats.launched.fetch_add(1, Ordering::SeqCst);
        self.inner
            .op_tx
            .send(StreamOp::Launch {
                seq,
                name,
                kernel: Box::new(kernel),
            })
            .map_err(|_| MemoryError::StreamClosed(self.inner.name.clone()))?;
        Ok(())
    }

    /// Block until all previously launched work has completed.
    ///
    /// Returns the first kernel failure since the previous synchronization,
    /// clearing it so the stream can be reused.
    pub fn synchronize(&self) -> MemResult<()> {
        self.wait_idle()?;
        tracing::trace!("Stream '{}' synchronized", self.inner.name);

        let mut sticky = self.inner.error.lock().unwrap_or_else(PoisonError::into_inner);
        match sticky.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Block until all previously launched work has completed, leaving any
    /// pending kernel failure in place.
    pub fn wait_idle(&self) -> MemResult<()> {
        if std::thread::current().id() == self.inner.worker_id {
            return Err(MemoryError::StreamClosed(format!(
                "{} (synchronize called from its own worker)",
                self.inner.name
            )));
        }
        let (done_tx, done_rx) = bounded(1);
        self.inner
            .op_tx
            .send(StreamOp::Fence(done_tx))
            .map_err(|_| MemoryError::StreamClosed(self.inner.name.clone()))?;
        done_rx
            .recv()
            .map_err(|_| MemoryError::StreamClosed(self.inner.name.clone()))?;
        Ok(())
    }

    /// Whether any kernel launched at or after sequence number `seq` has
    /// failed or been skipped. Sequence numbers count launches from zero, so
    /// `launched_kernels()` is the number the next launch receives.
    ///
    /// Only kernels the worker already processed are taken into account.
    pub fn faulted_since(&self, seq: u64) -> bool {
        self.inner.stats.fault_mark.load(Ordering::SeqCst) > seq
    }

    /// Kernels submitted so far.
    pub fn launched_kernels(&self) -> u64 {
        self.inner.stats.launched.load(Ordering::SeqCst)
    }

    /// Kernels that have run to completion (successfully or not).
    pub fn completed_kernels(&self) -> u64 {
        self.inner.stats.completed.load(Ordering::Relaxed)
    }

    pub fn skipped_kernels(&self) -> u64 {
        self.inner.stats.skipped.load(Ordering::Relaxed)
    }

    pub fn same_stream(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("name", &self.inner.name)
            .field("launched", &self.launched_kernels())
            .finish()
    }
}

impl Drop for StreamInner {
    fn drop(&mut self) {
        let _ = self.op_tx.send(StreamOp::Shutdown);
        let handle = self
            .worker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if std::thread::current().id() != self.worker_id {
                let _ = handle.join();
            }
        }
    }
}
