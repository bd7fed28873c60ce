//! Subcommand handlers

use argos_capture::{default_probe, list_interfaces, CaptureConfig, Capturer, PcapCapturer};
use argos_core::{ArgosConfig, Error, ExecutorType, Result};
use argos_engine::{
    BridgeLifecycleManager, BridgeSpec, CaptureEngine, CaptureOptions, EngineCollaborators,
    InterfaceController, ProcessWorker, SystemCommandRunner,
};
use argos_protocols::{is_supported, ArpExtractor};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::args::{BridgeAction, Cli, Commands, ConfigAction, ConfigFormat};

/// Configuration from `path`, or from `ARGOS_*` variables
pub async fn load_config(path: Option<&Path>) -> Result<ArgosConfig> {
    match path {
        Some(path) => ArgosConfig::from_file(path).await,
        None => {
            let config = ArgosConfig::from_env()?;
            config.validate()?;
            Ok(config)
        }
    }
}

pub async fn run(cli: Cli, config: ArgosConfig) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Commands::Interfaces => interfaces(),
        Commands::Capture {
            interfaces,
            filter,
            count,
            timeout,
            save,
            output,
        } => {
            let options = CaptureOptions {
                filter,
                count,
                timeout: timeout.map(Duration::from_secs),
            };
            let engine = open_engine(config, config_path.as_deref(), interfaces).await?;
            capture(&engine, options, save, output).await
        }
        Commands::Watch {
            interfaces,
            duration,
            bridge,
        } => {
            let engine = open_engine(config, config_path.as_deref(), interfaces).await?;
            watch(&engine, duration.map(Duration::from_secs), bridge).await
        }
        Commands::Bridge { action } => bridge(config, action).await,
        Commands::Config { action } => config_command(config, action).await,
        Commands::CaptureWorker {
            interface,
            filter,
            count,
            timeout_ms,
        } => capture_worker(&config, interface, filter, count, Duration::from_millis(timeout_ms)).await,
    }
}

fn extractor(config: &ArgosConfig) -> Result<ArpExtractor> {
    if is_supported(&config.protocol) {
        Ok(ArpExtractor::new())
    } else {
        Err(Error::config(format!("Unsupported protocol: {}", config.protocol)))
    }
}

/// Worker re-invoking this executable with the same configuration file
fn process_worker(config_path: Option<&Path>) -> Result<ProcessWorker> {
    let mut args = Vec::new();
    if let Some(path) = config_path {
        args.push("--config".to_string());
        args.push(path.display().to_string());
    }
    args.push("capture-worker".to_string());
    Ok(ProcessWorker::new(std::env::current_exe()?, args))
}

async fn open_engine(
    mut config: ArgosConfig,
    config_path: Option<&Path>,
    interfaces: Vec<String>,
) -> Result<CaptureEngine<ArpExtractor>> {
    if !interfaces.is_empty() {
        config.interfaces = interfaces;
    }
    let extractor = extractor(&config)?;
    let mut collaborators = EngineCollaborators::system(&config);
    if config.executor_type == ExecutorType::Process {
        collaborators.process_worker = Some(process_worker(config_path)?);
    }
    CaptureEngine::open(config, extractor, collaborators).await
}

/// Run `body` against the engine, then shut the engine down whatever the outcome
async fn with_engine<'a, F, Fut>(engine: &'a CaptureEngine<ArpExtractor>, body: F) -> Result<()>
where
    F: FnOnce(&'a CaptureEngine<ArpExtractor>) -> Fut,
    Fut: Future<Output = Result<()>> + 'a,
{
    let outcome = body(engine).await;
    engine.shutdown().await;
    outcome
}

fn interfaces() -> Result<()> {
    println!(
        "{:<16} {:<18} {:<5} {:<8} ADDRESSES",
        "NAME", "MAC", "UP", "CAPTURE"
    );
    for iface in list_interfaces()? {
        let ips: Vec<String> = iface.ips.iter().map(|ip| ip.to_string()).collect();
        println!(
            "{:<16} {:<18} {:<5} {:<8} {}",
            iface.name,
            iface.mac.as_deref().unwrap_or("-"),
            if iface.is_up { "yes" } else { "no" },
            if iface.is_capture_capable() { "yes" } else { "no" },
            ips.join(", ")
        );
    }
    Ok(())
}

async fn capture(
    engine: &CaptureEngine<ArpExtractor>,
    options: CaptureOptions,
    save: bool,
    output: Option<String>,
) -> Result<()> {
    with_engine(engine, |engine| async move {
        let result = engine.capture_many(None, options).await?;

        for (interface, packets) in result.iter() {
            println!("{}: {} packets", interface, packets.len());
            if packets.is_empty() {
                continue;
            }
            for record in engine.extract(packets.to_vec()).await? {
                println!("  {}", serde_json::to_string(&record)?);
            }
        }
        for (interface, error) in result.failures() {
            eprintln!("{}: capture failed: {}", interface, error);
        }

        if save {
            let path = engine.save_results(&result, output.as_deref()).await?;
            println!("Results saved to {}", path.display());
        }
        Ok::<(), Error>(())
    })
    .await
}

async fn watch(
    engine: &CaptureEngine<ArpExtractor>,
    duration: Option<Duration>,
    bridge: bool,
) -> Result<()> {
    with_engine(engine, |engine| async move {
        let session = if bridge {
            Some(engine.bridge_session().await?)
        } else {
            None
        };

        let outcome: Result<()> = async {
            let mut stream = engine.open_continuous_stream(None)?;

            let on_interrupt = stream.canceller();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping capture");
                    on_interrupt.cancel();
                }
            });
            if let Some(limit) = duration {
                let on_deadline = stream.canceller();
                tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    on_deadline.cancel();
                });
            }

            while let Some(event) = stream.next().await {
                println!("{}", serde_json::to_string(&event)?);
            }
            info!(
                rounds = stream.rounds_completed(),
                errors = stream.round_errors(),
                "Watch finished"
            );
            Ok::<(), Error>(())
        }
        .await;

        if let Some(session) = session {
            session.close().await;
        }
        outcome
    })
    .await
}

fn bridge_manager(config: &ArgosConfig) -> Arc<BridgeLifecycleManager> {
    let controller = InterfaceController::new(
        Arc::new(SystemCommandRunner::new()),
        Arc::from(default_probe()),
    );
    Arc::new(BridgeLifecycleManager::new(controller, config.promiscuous_mode))
}

fn bridge_name(config: &ArgosConfig, name: Option<String>) -> Result<String> {
    name.or_else(|| config.bridge_name.clone())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| Error::bridge("No bridge name given or configured"))
}

async fn bridge(config: ArgosConfig, action: BridgeAction) -> Result<()> {
    let manager = bridge_manager(&config);
    match action {
        BridgeAction::Up { name, members } => {
            let members = if members.is_empty() {
                config.interfaces.clone()
            } else {
                members
            };
            let spec = BridgeSpec::new(bridge_name(&config, name)?, members);
            manager.create(&spec).await?;
            println!("Bridge {} is up ({})", spec.name, spec.members.join(", "));
        }
        BridgeAction::Down { name } => {
            let spec = BridgeSpec::new(bridge_name(&config, name)?, Vec::new());
            manager.destroy(&spec).await;
            println!("Bridge {} removed", spec.name);
        }
    }
    Ok(())
}

/// Render the configuration in the requested format
pub fn render_config(config: &ArgosConfig, format: ConfigFormat) -> Result<String> {
    match format {
        ConfigFormat::Json => Ok(serde_json::to_string_pretty(config)?),
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| Error::Serialization(format!("TOML: {}", e))),
    }
}

async fn config_command(config: ArgosConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { format } => println!("{}", render_config(&config, format)?),
        ConfigAction::Save { path } => {
            config.save_to_file(&path).await?;
            println!("Configuration saved to {}", path.display());
        }
    }
    Ok(())
}

async fn capture_worker(
    config: &ArgosConfig,
    interface: String,
    filter: String,
    count: usize,
    timeout: Duration,
) -> Result<()> {
    let capturer = PcapCapturer::with_config(CaptureConfig::from_argos(config));
    let packets = tokio::task::spawn_blocking(move || capturer.capture(&interface, &filter, count, timeout))
        .await
        .map_err(|e| {
            warn!(error = %e, "Capture worker thread failed");
            Error::ExecutionFailed(format!("Capture thread failed: {}", e))
        })??;

    println!("{}", serde_json::to_string(&packets)?);
    Ok(())
}
