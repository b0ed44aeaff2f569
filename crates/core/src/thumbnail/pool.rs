use std::sync::Arc;

use crate::error::Result;

/// Bounded pool that runs thumbnail jobs.
///
/// Cloning shares the same threads. When the last handle is dropped, jobs
/// already queued still run, then the threads exit.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<rayon::ThreadPool>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("photon-thumb-{i}"))
            .build()?;
        Ok(Self {
            inner: Arc::new(pool),
        })
    }

    /// One worker per available core.
    pub fn with_available_parallelism() -> Result<Self> {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(threads)
    }

    pub fn threads(&self) -> usize {
        self.inner.current_num_threads()
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.spawn(job);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads())
            .finish()
    }
}
