//! Continuous capture rounds
//!
//! [`ContinuousCaptureStream`] repeatedly runs a short, bounded
//! `capture_many` round, extracts records for every interface that saw
//! packets and hands them out one event at a time. Rounds are strictly
//! sequential: the next round starts only after the previous round's events
//! were consumed and the pacing interval elapsed.
//!
//! ```text
//!            round ok                 round error
//!   Running ─────────▶ Running   Running ─────────▶ ErrorBackoff
//!                                ErrorBackoff ── backoff elapsed ──▶ Running
//!   any state ── cancel ──▶ Cancelled (terminal)
//! ```

use argos_core::{Extractor, Result, StreamSettings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::dispatcher::CaptureDispatcher;
use crate::request::CaptureRequest;
use crate::worker::WorkerPool;

/// Records extracted from one interface in one round
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CaptureEvent<R> {
    pub interface: String,
    pub timestamp: DateTime<Utc>,
    pub records: Vec<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Running,
    ErrorBackoff,
    Cancelled,
}

/// Cancels a stream from outside the task consuming it
#[derive(Debug, Clone)]
pub struct StreamCanceller {
    tx: Arc<watch::Sender<bool>>,
}

impl StreamCanceller {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

async fn wait_cancelled(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Restartable, cancellable sequence of capture events
pub struct ContinuousCaptureStream<E: Extractor> {
    dispatcher: Arc<CaptureDispatcher>,
    extractor: Arc<E>,
    pool: WorkerPool,
    interfaces: Vec<String>,
    request: CaptureRequest,
    settings: StreamSettings,
    state: StreamState,
    pending: VecDeque<CaptureEvent<E::Record>>,
    canceller: StreamCanceller,
    cancel_rx: watch::Receiver<bool>,
    pace_next_round: bool,
    rounds_completed: u64,
    round_errors: u64,
}

impl<E: Extractor> ContinuousCaptureStream<E> {
    pub fn new(
        dispatcher: Arc<CaptureDispatcher>,
        extractor: Arc<E>,
        pool: WorkerPool,
        interfaces: Vec<String>,
        filter: String,
        settings: StreamSettings,
    ) -> Self {
        let (tx, cancel_rx) = watch::channel(false);
        let request = CaptureRequest::new(filter, settings.round_count, settings.round_timeout);
        Self {
            dispatcher,
            extractor,
            pool,
            interfaces,
            request,
            settings,
            state: StreamState::Running,
            pending: VecDeque::new(),
            canceller: StreamCanceller { tx: Arc::new(tx) },
            cancel_rx,
            pace_next_round: false,
            rounds_completed: 0,
            round_errors: 0,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn rounds_completed(&self) -> u64 {
        self.rounds_completed
    }

    pub fn round_errors(&self) -> u64 {
        self.round_errors
    }

    /// Handle that cancels this stream from another task
    pub fn canceller(&self) -> StreamCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&mut self) {
        self.canceller.cancel();
        self.enter_cancelled();
    }

    fn enter_cancelled(&mut self) {
        if self.state != StreamState::Cancelled {
            self.state = StreamState::Cancelled;
            self.pending.clear();
            info!(
                rounds = self.rounds_completed,
                errors = self.round_errors,
                "Continuous capture cancelled"
            );
        }
    }

    /// Sleep for `duration`; false if cancelled first
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel_rx.clone()) => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Next event, or `None` once the stream is cancelled.
    ///
    /// Round errors never surface here: they are logged and the stream
    /// backs off before trying again.
    pub async fn next(&mut self) -> Option<CaptureEvent<E::Record>> {
        loop {
            if self.canceller.is_cancelled() {
                self.enter_cancelled();
            }

            match self.state {
                StreamState::Cancelled => return None,
                StreamState::ErrorBackoff => {
                    if self.pause(self.settings.error_backoff).await {
                        debug!("Error backoff elapsed, resuming capture rounds");
                        self.state = StreamState::Running;
                    }
                }
                StreamState::Running => {
                    if let Some(event) = self.pending.pop_front() {
                        return Some(event);
                    }

                    if self.pace_next_round {
                        if !self.pause(self.settings.round_interval).await {
                            continue;
                        }
                        self.pace_next_round = false;
                    }

                    // Losing the race drops the round, which aborts its tasks
                    let outcome = tokio::select! {
                        biased;
                        _ = wait_cancelled(self.cancel_rx.clone()) => None,
                        round = self.round() => Some(round),
                    };

                    match outcome {
                        None => continue,
                        Some(Ok(events)) => {
                            self.rounds_completed += 1;
                            self.pace_next_round = true;
                            debug!(
                                round = self.rounds_completed,
                                events = events.len(),
                                "Capture round complete"
                            );
                            self.pending.extend(events);
                        }
                        Some(Err(e)) => {
                            self.round_errors += 1;
                            error!(
                                error = %e,
                                backoff_ms = u64::try_from(self.settings.error_backoff.as_millis())
                                    .unwrap_or(u64::MAX),
                                "Error in continuous capture"
                            );
                            self.state = StreamState::ErrorBackoff;
                        }
                    }
                }
            }
        }
    }

    async fn round(&self) -> Result<Vec<CaptureEvent<E::Record>>> {
        let result = self
            .dispatcher
            .capture_many(&self.interfaces, &self.request)
            .await?;

        let mut events = Vec::new();
        for (interface, packets) in result.into_packets() {
            if packets.is_empty() {
                continue;
            }
            let extractor = Arc::clone(&self.extractor);
            let records = self.pool.run(move || extractor.extract(&packets)).await?;
            events.push(CaptureEvent {
                interface,
                timestamp: Utc::now(),
                records,
            });
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limiter::ConcurrencyLimiter;
    use crate::session::CaptureSession;
    use crate::testing::{CountingExtractor, FakeCapturer, FakeKernel};
    use crate::worker::WorkerMode;
    use std::time::Instant;

    fn settings(backoff: Duration) -> StreamSettings {
        StreamSettings {
            round_count: 10,
            round_timeout: Duration::from_millis(50),
            round_interval: Duration::from_millis(5),
            error_backoff: backoff,
        }
    }

    fn stream(
        capturer: Arc<FakeCapturer>,
        extractor: CountingExtractor,
        backoff: Duration,
    ) -> (ContinuousCaptureStream<CountingExtractor>, Arc<CaptureDispatcher>) {
        let kernel = FakeKernel::with_links(&["eth0", "eth1"]);
        let pool = WorkerPool::new(WorkerMode::Thread, 4);
        let dispatcher = Arc::new(CaptureDispatcher::new(CaptureSession::new(
            ConcurrencyLimiter::new(4),
            kernel,
            capturer,
            pool.clone(),
        )));
        let s = ContinuousCaptureStream::new(
            dispatcher.clone(),
            Arc::new(extractor),
            pool,
            vec!["eth0".to_string(), "eth1".to_string()],
            "arp".to_string(),
            settings(backoff),
        );
        (s, dispatcher)
    }

    async fn next_within<E: Extractor>(
        s: &mut ContinuousCaptureStream<E>,
        limit: Duration,
    ) -> Option<CaptureEvent<E::Record>> {
        tokio::time::timeout(limit, s.next())
            .await
            .expect("stream stalled")
    }

    #[tokio::test]
    async fn test_emits_only_non_empty_interfaces() {
        let capturer = FakeCapturer::new()
            .with_packets("eth0", 3)
            .with_packets("eth1", 0);
        let (mut s, _) = stream(capturer, CountingExtractor::new(), Duration::from_secs(5));

        for round in 1..=3u64 {
            let event = next_within(&mut s, Duration::from_secs(2)).await.unwrap();
            assert_eq!(event.interface, "eth0");
            assert_eq!(event.records.len(), 3);
            assert!(event.records.iter().all(|r| r == "eth0#60"));
            assert_eq!(s.rounds_completed(), round);
        }
        assert_eq!(s.round_errors(), 0);
    }

    #[tokio::test]
    async fn test_round_request_is_short_and_bounded() {
        let capturer = FakeCapturer::new().with_packets("eth0", 1);
        let (mut s, _) = stream(capturer.clone(), CountingExtractor::new(), Duration::from_secs(5));

        next_within(&mut s, Duration::from_secs(2)).await.unwrap();
        let (_, filter, count, timeout) = capturer.last_request().unwrap();
        assert_eq!(filter, "arp");
        assert_eq!(count, 10);
        assert_eq!(timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_round_error_backs_off_then_resumes() {
        let capturer = FakeCapturer::new().with_packets("eth0", 2);
        let backoff = Duration::from_millis(50);
        let (mut s, _) = stream(capturer, CountingExtractor::failing_first(1), backoff);

        let started = Instant::now();
        let event = next_within(&mut s, Duration::from_secs(2)).await.unwrap();
        assert_eq!(event.interface, "eth0");
        assert!(started.elapsed() >= backoff);
        assert_eq!(s.round_errors(), 1);
        assert_eq!(s.rounds_completed(), 1);
        assert_eq!(s.state(), StreamState::Running);
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let capturer = FakeCapturer::new().with_packets("eth0", 2);
        let (mut s, dispatcher) = stream(
            capturer,
            CountingExtractor::failing_first(usize::MAX),
            Duration::from_secs(30),
        );

        let canceller = s.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        assert!(next_within(&mut s, Duration::from_secs(2)).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(s.state(), StreamState::Cancelled);
        assert!(s.round_errors() >= 1);
        assert_eq!(dispatcher.outstanding(), 0);

        // Terminal
        assert!(s.next().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_round_aborts_captures() {
        let capturer = FakeCapturer::new()
            .with_delay(Duration::from_millis(300))
            .with_packets("eth0", 1);
        let (mut s, dispatcher) = stream(capturer, CountingExtractor::new(), Duration::from_secs(5));

        let canceller = s.canceller();
        let d = dispatcher.clone();
        tokio::spawn(async move {
            while d.outstanding() == 0 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            canceller.cancel();
        });

        assert!(next_within(&mut s, Duration::from_secs(2)).await.is_none());
        assert_eq!(dispatcher.outstanding(), 0);
        assert!(dispatcher.stats().captures_cancelled >= 1);
    }

    #[tokio::test]
    async fn test_cancel_discards_pending_events() {
        let capturer = FakeCapturer::new()
            .with_packets("eth0", 1)
            .with_packets("eth1", 1);
        let (mut s, _) = stream(capturer, CountingExtractor::new(), Duration::from_secs(5));

        next_within(&mut s, Duration::from_secs(2)).await.unwrap();
        s.cancel();
        assert!(s.next().await.is_none());
    }
}
