//! Worker pool for blocking capture and extraction work
//!
//! Blocking work never runs on the coordination path. In thread mode every
//! job is handed to Tokio's blocking pool, bounded by the pool's own slot
//! count. In process mode captures run in a child process instead, which
//! isolates the engine from a misbehaving native capture call.

use argos_core::{Error, ExecutorType, Packet, Result};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Child-process capture worker.
///
/// The worker is invoked as
/// `<program> <args…> --interface I --filter F --count N --timeout-ms T`
/// and must print a JSON array of packets on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessWorker {
    program: PathBuf,
    args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(transparent)]
struct WorkerOutput(Vec<Packet>);

impl ProcessWorker {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-invoke the running executable's `capture-worker` subcommand
    pub fn current_exe() -> Result<Self> {
        Ok(Self::new(
            std::env::current_exe()?,
            vec!["capture-worker".to_string()],
        ))
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Run one capture in a child process; the child is killed if this
    /// future is dropped
    pub async fn capture(
        &self,
        interface: &str,
        filter: &str,
        count: usize,
        timeout: Duration,
    ) -> Result<Vec<Packet>> {
        debug!(
            program = %self.program.display(),
            interface = %interface,
            "Spawning capture worker process"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg("--interface")
            .arg(interface)
            .arg("--filter")
            .arg(filter)
            .arg("--count")
            .arg(count.to_string())
            .arg("--timeout-ms")
            .arg(timeout.as_millis().to_string())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::capture(format!(
                    "Failed to start capture worker {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::capture(format!(
                "Capture worker exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let WorkerOutput(packets) = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::capture(format!("Malformed capture worker output: {}", e)))?;
        Ok(packets)
    }
}

/// Where blocking captures execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerMode {
    Thread,
    Process(ProcessWorker),
}

impl WorkerMode {
    /// Resolve the configured executor type
    pub fn from_executor(executor: ExecutorType, worker: Option<ProcessWorker>) -> Result<Self> {
        match executor {
            ExecutorType::Thread => Ok(WorkerMode::Thread),
            ExecutorType::Process => match worker {
                Some(worker) => Ok(WorkerMode::Process(worker)),
                None => Ok(WorkerMode::Process(ProcessWorker::current_exe()?)),
            },
        }
    }
}

struct PoolInner {
    mode: WorkerMode,
    slots: Arc<Semaphore>,
    size: usize,
    shut_down: AtomicBool,
}

/// Bounded pool shared by every capture session and extractor call
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    pub fn new(mode: WorkerMode, size: usize) -> Self {
        let size = size.max(1);
        Self {
            inner: Arc::new(PoolInner {
                mode,
                slots: Arc::new(Semaphore::new(size)),
                size,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn mode(&self) -> &WorkerMode {
        &self.inner.mode
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    async fn slot(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.inner.slots)
            .acquire_owned()
            .await
            .map_err(|_| Error::ExecutionFailed("Worker pool is shut down".to_string()))
    }

    /// Run a blocking job on a pool thread
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let slot = self.slot().await?;
        tokio::task::spawn_blocking(move || {
            let _slot = slot;
            job()
        })
        .await
        .map_err(|e| {
            if e.is_panic() {
                Error::ExecutionFailed("Worker job panicked".to_string())
            } else {
                Error::Interrupted(format!("Worker job cancelled: {}", e))
            }
        })?
    }

    /// Run an asynchronous job (e.g. a worker process) while holding a slot
    pub async fn run_async<Fut, T>(&self, job: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let _slot = self.slot().await?;
        job.await
    }

    /// Wait for in-flight jobs to drain and refuse new ones. Only the first
    /// call has any effect.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let size = u32::try_from(self.inner.size).unwrap_or(u32::MAX);
        if let Ok(drained) = self.inner.slots.acquire_many(size).await {
            drained.forget();
        }
        self.inner.slots.close();
        info!(workers = self.inner.size, "Worker pool shut down");
    }

    /// Refuse new jobs without waiting for in-flight ones
    pub fn close(&self) {
        self.inner.shut_down.store(true, Ordering::Release);
        self.inner.slots.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_run_returns_job_result() {
        let pool = WorkerPool::new(WorkerMode::Thread, 2);
        let value = pool.run(|| Ok(21 * 2)).await.unwrap();
        assert_eq!(value, 42);

        let err = pool
            .run::<_, ()>(|| Err(Error::capture("nope")))
            .await
            .unwrap_err();
        assert!(err.is_capture_error());
    }

    #[tokio::test]
    async fn test_panicking_job_is_an_error() {
        let pool = WorkerPool::new(WorkerMode::Thread, 1);
        let err = pool
            .run::<_, ()>(|| panic!("native call exploded"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExecutionFailed(_)));

        // The slot came back
        assert_eq!(pool.run(|| Ok(1)).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_parallel_jobs() {
        let pool = WorkerPool::new(WorkerMode::Thread, 2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut jobs = Vec::new();
        for _ in 0..6 {
            let pool = pool.clone();
            let active = active.clone();
            let peak = peak.clone();
            jobs.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            }));
        }
        for job in jobs {
            job.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let pool = WorkerPool::new(WorkerMode::Thread, 1);
        let done = Arc::new(AtomicBool::new(false));

        let p = pool.clone();
        let d = done.clone();
        let job = tokio::spawn(async move {
            p.run(move || {
                std::thread::sleep(Duration::from_millis(50));
                d.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        pool.shutdown().await;
        assert!(done.load(Ordering::SeqCst));
        assert!(pool.is_shut_down());
        assert!(pool.run(|| Ok(())).await.is_err());

        // Second shutdown is a no-op
        pool.shutdown().await;
        job.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_process_mode_from_executor() {
        let worker = ProcessWorker::new("/usr/bin/argos", vec!["capture-worker".to_string()]);
        let mode = WorkerMode::from_executor(ExecutorType::Process, Some(worker.clone())).unwrap();
        assert_eq!(mode, WorkerMode::Process(worker));
        assert_eq!(
            WorkerMode::from_executor(ExecutorType::Thread, None).unwrap(),
            WorkerMode::Thread
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_parses_stdout() {
        let script = r#"echo '[{"timestamp":{"secs_since_epoch":1,"nanos_since_epoch":0},"interface":"eth0","data":[1,2],"len":2}]'"#;
        let worker = ProcessWorker::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "worker".to_string()],
        );
        let packets = worker
            .capture("eth0", "arp", 5, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data, vec![1, 2]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_worker_failure() {
        let worker = ProcessWorker::new(
            "sh",
            vec!["-c".to_string(), "echo 'no such device' >&2; exit 2".to_string(), "worker".to_string()],
        );
        let err = worker
            .capture("eth0", "", 5, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_capture_error());
        assert!(err.to_string().contains("no such device"));
    }
}
