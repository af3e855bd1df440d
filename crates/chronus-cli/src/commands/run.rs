//! `chronus run` - the headless engine with OSC control.
//!
//! Composition: env config (plus flag overrides) → supervisor + feed →
//! cpal output stream driving the feed → OSC server feeding the control
//! channel → control loop interleaving requests with monitor ticks until
//! ctrl-c.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chronus_engine::{CommitOutcome, EngineConfig, EngineError, MONITOR_PERIOD, Supervisor};
use chronus_io::{AudioBackend, BackendStreamConfig, CpalBackend};
use chronus_osc::{ControlRequest, OscServer};
use chronus_registry::ModuleRegistry;
use clap::Args;

#[derive(Args)]
pub struct RunArgs {
    /// Output device name filter (substring match)
    #[arg(long)]
    device: Option<String>,

    /// Output channel count (mono core duplicated per channel)
    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Override OSC_HOST
    #[arg(long)]
    host: Option<String>,

    /// Override OSC_PORT
    #[arg(long)]
    port: Option<u16>,
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_env().map_err(EngineError::Config)?;
    if let Some(host) = args.host {
        config.osc_host = host;
    }
    if let Some(port) = args.port {
        config.osc_port = port;
    }

    tracing::info!(
        block_size = config.block_size,
        sample_rate = config.sample_rate,
        num_buffers = config.num_buffers,
        "starting engine"
    );

    let (mut supervisor, mut feed) =
        Supervisor::new(config.clone(), ModuleRegistry::with_builtins())?;
    let status = supervisor.status_handle();
    let registry = Arc::clone(supervisor.registry());

    // Device stream: the callback body is entirely the feed.
    let backend = CpalBackend::new();
    let channels = usize::from(args.channels.max(1));
    let stream_config = BackendStreamConfig {
        sample_rate: config.sample_rate,
        buffer_size: config.block_size as u32,
        channels: args.channels.max(1),
        device_name: args.device,
    };
    let stream = backend
        .build_output_stream(
            &stream_config,
            Box::new(move |out| feed.fill(out, channels)),
            Box::new(|err| tracing::error!(error = err, "audio stream error")),
        )
        .map_err(|e| EngineError::Device(e.to_string()))?;

    // Control transport.
    let (request_tx, request_rx) = crossbeam_channel::unbounded();
    let osc = OscServer::spawn(
        &config.osc_host,
        config.osc_port,
        request_tx,
        registry,
        status,
    )
    .map_err(|e| EngineError::Device(e.to_string()))?;

    let running = Arc::new(AtomicBool::new(true));
    let ctrlc_flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        ctrlc_flag.store(false, Ordering::Release);
    })?;

    tracing::info!(
        host = %config.osc_host,
        port = config.osc_port,
        "engine running, ctrl-c to stop"
    );

    // Control loop: requests interleaved with monitor ticks.
    let ticker = crossbeam_channel::tick(MONITOR_PERIOD);
    while running.load(Ordering::Acquire) {
        crossbeam_channel::select! {
            recv(request_rx) -> request => match request {
                Ok(request) => handle_request(&mut supervisor, request),
                Err(_) => break,
            },
            recv(ticker) -> _ => supervisor.monitor()?,
        }
    }

    tracing::info!("shutting down");
    drop(stream);
    osc.shutdown();
    supervisor.shutdown();
    Ok(())
}

fn handle_request(supervisor: &mut Supervisor, request: ControlRequest) {
    match request {
        ControlRequest::Broadcast(record) => supervisor.broadcast(record),
        ControlRequest::Patch(op) => {
            if !supervisor.queue_patch(op) {
                tracing::warn!("patch edit dropped (standby queue unavailable)");
            }
        }
        ControlRequest::Commit => match supervisor.commit() {
            CommitOutcome::Ready => {}
            outcome => tracing::warn!(?outcome, "commit did not complete"),
        },
        ControlRequest::Abort => supervisor.abort(),
    }
}
