//! One bounded capture on one interface

use argos_capture::{Capturer, InterfaceProbe};
use argos_core::{Error, Packet, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::limiter::ConcurrencyLimiter;
use crate::request::CaptureRequest;
use crate::worker::{WorkerMode, WorkerPool};

/// Runs single-interface captures behind the concurrency limiter
#[derive(Clone)]
pub struct CaptureSession {
    limiter: ConcurrencyLimiter,
    probe: Arc<dyn InterfaceProbe>,
    capturer: Arc<dyn Capturer>,
    pool: WorkerPool,
}

impl CaptureSession {
    pub fn new(
        limiter: ConcurrencyLimiter,
        probe: Arc<dyn InterfaceProbe>,
        capturer: Arc<dyn Capturer>,
        pool: WorkerPool,
    ) -> Self {
        Self {
            limiter,
            probe,
            capturer,
            pool,
        }
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Capture on `interface`.
    ///
    /// Holds one limiter permit for the whole operation, including the
    /// existence check. The blocking capture runs on the worker pool and
    /// owns the permit until the native call returns, even if this future
    /// is dropped first.
    pub async fn run(&self, interface: &str, request: &CaptureRequest) -> Result<Vec<Packet>> {
        let permit = self.limiter.acquire().await?;
        debug!(
            interface = %interface,
            in_use = self.limiter.in_use(),
            "Capture permit acquired"
        );

        if !self.probe.exists(interface).await {
            return Err(Error::InterfaceNotFound(interface.to_string()));
        }

        info!(
            interface = %interface,
            filter = %request.filter,
            count = request.count,
            timeout_ms = u64::try_from(request.timeout.as_millis()).unwrap_or(u64::MAX),
            "Starting capture"
        );

        let packets = match self.pool.mode() {
            WorkerMode::Thread => {
                let capturer = Arc::clone(&self.capturer);
                let iface = interface.to_string();
                let request = request.clone();
                self.pool
                    .run(move || {
                        let _permit = permit;
                        capturer.capture(&iface, &request.filter, request.count, request.timeout)
                    })
                    .await
            }
            WorkerMode::Process(worker) => {
                // The child is killed if this future is dropped
                let _permit = permit;
                self.pool
                    .run_async(worker.capture(
                        interface,
                        &request.filter,
                        request.count,
                        request.timeout,
                    ))
                    .await
            }
        };

        match packets {
            Ok(packets) => {
                info!(interface = %interface, packets = packets.len(), "Captured packets");
                Ok(packets)
            }
            Err(e) => {
                warn!(interface = %interface, error = %e, "Capture failed");
                Err(Error::capture_failed(interface, e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeCapturer, FakeKernel};
    use std::time::Duration;

    fn session(kernel: &Arc<FakeKernel>, capturer: &Arc<FakeCapturer>, permits: usize) -> CaptureSession {
        CaptureSession::new(
            ConcurrencyLimiter::new(permits),
            kernel.clone(),
            capturer.clone(),
            WorkerPool::new(WorkerMode::Thread, 4),
        )
    }

    fn request() -> CaptureRequest {
        CaptureRequest::new("arp", 10, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_returns_collaborator_packets() {
        let kernel = FakeKernel::with_links(&["eth0"]);
        let capturer = FakeCapturer::new().with_packets("eth0", 3);
        let s = session(&kernel, &capturer, 2);

        let packets = s.run("eth0", &request()).await.unwrap();
        assert_eq!(packets.len(), 3);
        assert!(packets.iter().all(|p| p.interface == "eth0"));
        assert_eq!(s.limiter().in_use(), 0);
    }

    #[tokio::test]
    async fn test_missing_interface_never_reaches_capturer() {
        let kernel = FakeKernel::with_links(&["eth0"]);
        let capturer = FakeCapturer::new().with_packets("eth9", 3);
        let s = session(&kernel, &capturer, 1);

        let err = s.run("eth9", &request()).await.unwrap_err();
        assert!(matches!(err, Error::InterfaceNotFound(_)));
        assert_eq!(capturer.calls(), 0);
        assert_eq!(s.limiter().available(), 1);
    }

    #[tokio::test]
    async fn test_collaborator_error_is_wrapped() {
        let kernel = FakeKernel::with_links(&["eth0"]);
        let capturer = FakeCapturer::new().with_failure("eth0", "permission denied");
        let s = session(&kernel, &capturer, 1);

        let err = s.run("eth0", &request()).await.unwrap_err();
        match &err {
            Error::CaptureFailed { interface, .. } => assert_eq!(interface, "eth0"),
            other => panic!("Expected CaptureFailed, got {:?}", other),
        }
        assert!(err.to_string().contains("permission denied"));
        assert_eq!(s.limiter().available(), 1);
    }

    #[tokio::test]
    async fn test_request_is_forwarded() {
        let kernel = FakeKernel::with_links(&["eth0"]);
        let capturer = FakeCapturer::new().with_packets("eth0", 1);
        let s = session(&kernel, &capturer, 1);

        s.run("eth0", &CaptureRequest::new("icmp", 4, Duration::from_millis(5)))
            .await
            .unwrap();
        assert_eq!(
            capturer.last_request(),
            Some(("eth0".to_string(), "icmp".to_string(), 4, Duration::from_millis(5)))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_aborted_run_keeps_permit_until_capture_returns() {
        let kernel = FakeKernel::with_links(&["eth0", "eth1"]);
        let capturer = FakeCapturer::new()
            .with_delay(Duration::from_millis(300))
            .with_packets("eth0", 1)
            .with_packets("eth1", 1);
        let s = session(&kernel, &capturer, 1);

        let first = {
            let s = s.clone();
            tokio::spawn(async move { s.run("eth0", &request()).await })
        };
        while capturer.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        first.abort();
        let _ = first.await;

        // The native call is still running and still counts
        assert_eq!(s.limiter().in_use(), 1);

        let packets = s.run("eth1", &request()).await.unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(capturer.peak_concurrency(), 1);
        assert_eq!(s.limiter().in_use(), 0);
    }
}
