// Spur gateway for Linux: adaptor link, backend link, state store, engine dispatcher.

mod adaptor;
mod backend;
mod config;
mod dispatch;
mod store;

use std::path::PathBuf;

use spur_core::SpurCore;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;
use crate::dispatch::Dispatcher;
use crate::store::SnapshotStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Bound on each channel between the links and the dispatcher.
const CHANNEL_DEPTH: usize = 256;

fn main() -> anyhow::Result<()> {
    let mut explicit_config = None;
    for arg in std::env::args().skip(1) {
        if arg == "--version" || arg == "-V" {
            println!("spur-linux {}", VERSION);
            return Ok(());
        }
        explicit_config = Some(PathBuf::from(arg));
    }

    let (cfg, warnings) = config::load(explicit_config.as_deref());
    init_tracing(cfg.log_format);
    for w in warnings {
        warn!("{w}");
    }
    let engine = cfg.engine();
    info!(
        version = VERSION,
        gateway = %engine.address,
        adaptor_port = cfg.adaptor_port,
        backend_port = cfg.backend_port,
        state_path = %cfg.state_path.display(),
        "spur gateway starting"
    );

    let store = SnapshotStore::new(&cfg.state_path);
    let core = match store.load() {
        Ok(Some(snapshot)) => {
            info!(nodes = snapshot.nodes.len(), "loaded saved state");
            SpurCore::restore(engine, &snapshot)
        }
        Ok(None) => SpurCore::new(engine),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "problem loading saved state, starting empty");
            SpurCore::new(engine)
        }
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (radio_tx, radio_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (backend_tx, backend_rx) = mpsc::channel(CHANNEL_DEPTH);

        let adaptor_events = event_tx.clone();
        let adaptor_port = cfg.adaptor_port;
        tokio::spawn(async move {
            if let Err(e) = adaptor::run_adaptor(adaptor_port, adaptor_events, radio_rx).await {
                error!(error = %format!("{e:#}"), "adaptor link stopped");
            }
        });
        let backend_port = cfg.backend_port;
        tokio::spawn(async move {
            if let Err(e) = backend::run_backend(backend_port, event_tx, backend_rx).await {
                error!(error = %format!("{e:#}"), "backend link stopped");
            }
        });

        Dispatcher::new(core, store, radio_tx, backend_tx)
            .run(event_rx, cfg.check_interval(), shutdown_signal())
            .await;
    });
    info!("spur gateway stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("spur_linux=info,spur_core=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "cannot watch SIGTERM, Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("shutdown requested");
}
