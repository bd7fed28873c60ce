//! Capture engine facade
//!
//! [`CaptureEngine`] wires the configuration, the collaborators and the
//! orchestration components together for one protocol extractor. It is
//! opened with [`CaptureEngine::open`] and must be closed with
//! [`CaptureEngine::shutdown`]; dropping an engine that was not shut down
//! aborts its outstanding captures and closes the worker pool.

use argos_capture::{default_probe, CaptureConfig, Capturer, InterfaceProbe, PcapCapturer};
use argos_core::{ArgosConfig, CaptureDefaults, Error, Extractor, Packet, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeLifecycleManager, BridgeSession, BridgeSpec};
use crate::command::{CommandRunner, SystemCommandRunner};
use crate::dispatcher::{CaptureDispatcher, CaptureResult};
use crate::interface::InterfaceController;
use crate::limiter::ConcurrencyLimiter;
use crate::request::{CaptureOptions, CaptureRequest};
use crate::session::CaptureSession;
use crate::sink::ResultSink;
use crate::stats::DispatchStats;
use crate::stream::ContinuousCaptureStream;
use crate::worker::{ProcessWorker, WorkerMode, WorkerPool};

/// External systems the engine talks to
#[derive(Clone)]
pub struct EngineCollaborators {
    pub capturer: Arc<dyn Capturer>,
    pub probe: Arc<dyn InterfaceProbe>,
    pub runner: Arc<dyn CommandRunner>,
    /// Worker used in process mode; defaults to re-invoking this executable
    pub process_worker: Option<ProcessWorker>,
}

impl EngineCollaborators {
    /// libpcap capture, OS interface probe and real `ip` commands
    pub fn system(config: &ArgosConfig) -> Self {
        Self {
            capturer: Arc::new(PcapCapturer::with_config(CaptureConfig::from_argos(config))),
            probe: Arc::from(default_probe()),
            runner: Arc::new(SystemCommandRunner::new()),
            process_worker: None,
        }
    }
}

/// Orchestration engine for one protocol
pub struct CaptureEngine<E: Extractor> {
    config: ArgosConfig,
    defaults: CaptureDefaults,
    extractor: Arc<E>,
    controller: InterfaceController,
    bridges: Arc<BridgeLifecycleManager>,
    dispatcher: Arc<CaptureDispatcher>,
    pool: WorkerPool,
    sink: ResultSink,
    shut_down: AtomicBool,
}

impl<E: Extractor> CaptureEngine<E> {
    /// Validate the configuration and configured interfaces, create the
    /// output directory and start the worker pool
    pub async fn open(config: ArgosConfig, extractor: E, collaborators: EngineCollaborators) -> Result<Self> {
        config.validate()?;

        let EngineCollaborators {
            capturer,
            probe,
            runner,
            process_worker,
        } = collaborators;

        let controller = InterfaceController::new(runner, Arc::clone(&probe));
        controller.validate_all(&config.interfaces).await?;

        tokio::fs::create_dir_all(&config.output_directory)
            .await
            .map_err(|e| {
                Error::config(format!(
                    "Cannot create output directory {}: {}",
                    config.output_directory.display(),
                    e
                ))
            })?;

        let mode = WorkerMode::from_executor(config.executor_type, process_worker)?;
        let pool = WorkerPool::new(mode, config.worker_count());
        let limiter = ConcurrencyLimiter::new(config.max_concurrent_captures);
        let session = CaptureSession::new(limiter, probe, capturer, pool.clone());

        let mut defaults = config.capture_defaults();
        if defaults.filter.is_empty() {
            defaults.filter = extractor.default_filter();
        }

        info!(
            protocol = extractor.protocol(),
            interfaces = ?config.interfaces,
            max_concurrent = config.max_concurrent_captures,
            executor = ?config.executor_type,
            workers = pool.size(),
            "Capture engine opened"
        );

        Ok(Self {
            bridges: Arc::new(BridgeLifecycleManager::new(
                controller.clone(),
                config.promiscuous_mode,
            )),
            sink: ResultSink::from_config(&config),
            dispatcher: Arc::new(CaptureDispatcher::new(session)),
            extractor: Arc::new(extractor),
            config,
            defaults,
            controller,
            pool,
            shut_down: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ArgosConfig {
        &self.config
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    pub fn defaults(&self) -> &CaptureDefaults {
        &self.defaults
    }

    pub fn interfaces(&self) -> &InterfaceController {
        &self.controller
    }

    pub fn dispatcher(&self) -> &CaptureDispatcher {
        &self.dispatcher
    }

    pub async fn validate_interfaces<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        self.controller.validate_all(names).await
    }

    pub async fn bring_up(&self, name: &str) -> Result<()> {
        self.controller
            .bring_up(name, self.config.promiscuous_mode)
            .await
    }

    pub async fn bring_down(&self, name: &str) -> Result<()> {
        self.controller.bring_down(name).await
    }

    pub fn bridge_manager(&self) -> &Arc<BridgeLifecycleManager> {
        &self.bridges
    }

    /// Create the configured bridge for the lifetime of the returned session
    pub async fn bridge_session(&self) -> Result<BridgeSession> {
        let spec = BridgeSpec::from_config(&self.config)
            .ok_or_else(|| Error::bridge("No bridge name configured"))?;
        self.bridges.session(spec).await
    }

    pub fn resolve(&self, options: &CaptureOptions) -> CaptureRequest {
        options.resolve(&self.defaults)
    }

    /// Capture on one interface; errors propagate
    pub async fn capture_single(&self, interface: &str, options: CaptureOptions) -> Result<Vec<Packet>> {
        let request = self.resolve(&options);
        self.dispatcher.session().run(interface, &request).await
    }

    /// Capture on several interfaces (the configured ones when `None` or
    /// empty); per-interface failures yield empty entries
    pub async fn capture_many(
        &self,
        interfaces: Option<&[String]>,
        options: CaptureOptions,
    ) -> Result<CaptureResult> {
        let request = self.resolve(&options);
        let interfaces = match interfaces {
            Some(names) if !names.is_empty() => names,
            _ => self.config.interfaces.as_slice(),
        };
        self.dispatcher.capture_many(interfaces, &request).await
    }

    /// Open a continuous stream over `interfaces`, or the configured ones
    pub fn open_continuous_stream(&self, interfaces: Option<Vec<String>>) -> Result<ContinuousCaptureStream<E>> {
        let interfaces = match interfaces {
            Some(names) if !names.is_empty() => names,
            _ => self.config.interfaces.clone(),
        };
        if interfaces.is_empty() {
            return Err(Error::capture("No interfaces specified for capture"));
        }

        let settings = self.config.stream_settings();
        debug!(interfaces = ?interfaces, settings = ?settings, "Opening continuous capture stream");
        Ok(ContinuousCaptureStream::new(
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.extractor),
            self.pool.clone(),
            interfaces,
            self.defaults.filter.clone(),
            settings,
        ))
    }

    /// Run the extractor on the worker pool
    pub async fn extract(&self, packets: Vec<Packet>) -> Result<Vec<E::Record>> {
        let extractor = Arc::clone(&self.extractor);
        self.pool.run(move || extractor.extract(&packets)).await
    }

    /// Persist results through the configured sink
    pub async fn save_results<T: serde::Serialize + ?Sized>(
        &self,
        results: &T,
        filename: Option<&str>,
    ) -> Result<PathBuf> {
        self.sink.save(results, filename).await
    }

    pub async fn cancel_all(&self) -> usize {
        self.dispatcher.cancel_all().await
    }

    pub fn stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Cancel outstanding captures and drain the worker pool. Only the first
    /// call does anything.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Shutting down capture engine");
        self.dispatcher.cancel_all().await;
        self.pool.shutdown().await;

        let stats = self.dispatcher.stats();
        info!(
            started = stats.captures_started,
            failed = stats.captures_failed,
            cancelled = stats.captures_cancelled,
            packets = stats.packets_captured,
            "Capture engine shut down"
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl<E: Extractor> Drop for CaptureEngine<E> {
    fn drop(&mut self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let aborted = self.dispatcher.abort_all();
        self.pool.close();
        warn!(tasks = aborted, "Capture engine dropped without shutdown");
    }
}
