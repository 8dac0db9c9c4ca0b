use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use argh::FromArgs;

mod classify;
mod compositor;
mod config;
mod container;
mod device;
mod error;
mod frame;
mod orchestrator;
mod sampler;
mod screen;
mod server;
#[cfg(test)]
mod testfx;
mod unlock;

use config::ConfigStore;
use server::Daemon;

/// Waydroid game readiness daemon
#[derive(FromArgs)]
struct Args {
    /// path to the ui config document
    #[argh(option)]
    config: Option<String>,

    /// unix socket path to serve on
    #[argh(option)]
    socket: Option<String>,
}

fn default_socket_path() -> PathBuf {
    let home = std::env::var("HOME").expect("HOME not set");
    PathBuf::from(format!("{home}/.local/state/waypilot.sock"))
}

fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").expect("HOME not set");
    PathBuf::from(format!("{home}/.config/waypilot/ui.json"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Args = argh::from_env();
    let socket_path = args.socket.map(PathBuf::from).unwrap_or_else(default_socket_path);
    let config_path = args.config.map(PathBuf::from).unwrap_or_else(default_config_path);

    let store = ConfigStore::load(Some(config_path))?;
    let state = Arc::new(Daemon::new(store));
    let app = server::router(state);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;

    runtime.block_on(async move {
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create socket dir {}", parent.display()))?;
        }
        // A stale socket file from a previous run blocks the bind.
        let _ = std::fs::remove_file(&socket_path);

        let listener = tokio::net::UnixListener::bind(&socket_path)
            .with_context(|| format!("bind unix socket {}", socket_path.display()))?;
        tracing::info!(socket = %socket_path.display(), "http api ready");
        axum::serve(listener, app).await.context("unix server failed")
    })
}
