//! Capture orchestration for Argos
//!
//! This crate coordinates bounded, concurrent packet captures across
//! several interfaces. It includes:
//!
//! - `CaptureEngine`: facade owning configuration, collaborators and lifetime
//! - `CaptureDispatcher`: fans one request out over many interfaces with
//!   per-interface failure isolation and a cancellable task registry
//! - `CaptureSession` + `ConcurrencyLimiter`: one admitted capture per interface
//! - `ContinuousCaptureStream`: paced capture rounds with error backoff
//! - `BridgeLifecycleManager`: bridge creation with guaranteed teardown
//! - `ResultSink`: JSON / TOML result files
//!
//! # Example
//!
//! ```no_run
//! use argos_core::{ArgosConfig, Extractor, Packet, Result};
//! use argos_engine::{CaptureEngine, CaptureOptions, EngineCollaborators};
//!
//! struct Lengths;
//!
//! impl Extractor for Lengths {
//!     type Record = usize;
//!     fn protocol(&self) -> &'static str { "len" }
//!     fn default_filter(&self) -> String { String::new() }
//!     fn extract(&self, packets: &[Packet]) -> Result<Vec<usize>> {
//!         Ok(packets.iter().map(|p| p.len()).collect())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ArgosConfig {
//!         interfaces: vec!["eth0".to_string()],
//!         ..Default::default()
//!     };
//!     let collaborators = EngineCollaborators::system(&config);
//!     let engine = CaptureEngine::open(config, Lengths, collaborators).await?;
//!
//!     let result = engine.capture_many(None, CaptureOptions::new().count(10)).await?;
//!     engine.save_results(&result, None).await?;
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod command;
pub mod dispatcher;
pub mod engine;
pub mod interface;
pub mod limiter;
pub mod request;
pub mod session;
pub mod sink;
pub mod stats;
pub mod stream;
pub mod worker;

#[cfg(test)]
mod testing;

pub use bridge::{BridgeLifecycleManager, BridgeSession, BridgeSpec};
pub use command::{CommandRunner, SystemCommandRunner};
pub use dispatcher::{CaptureDispatcher, CaptureResult, CaptureTaskHandle};
pub use engine::{CaptureEngine, EngineCollaborators};
pub use interface::InterfaceController;
pub use limiter::{CapturePermit, ConcurrencyLimiter};
pub use request::{CaptureOptions, CaptureRequest};
pub use session::CaptureSession;
pub use sink::ResultSink;
pub use stats::{DispatchStats, StatsAccumulator};
pub use stream::{CaptureEvent, ContinuousCaptureStream, StreamCanceller, StreamState};
pub use worker::{ProcessWorker, WorkerMode, WorkerPool};
