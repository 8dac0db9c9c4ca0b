use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::UiConfig;
use crate::device::run_output;
use crate::error::StepError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// Container session supervisor: liveness oracle plus idempotent
/// start/stop. The session state string drives start polling and the
/// status endpoint.
pub trait Session: Sync {
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    fn state_label(&self) -> impl Future<Output = String> + Send;

    fn start(&self) -> impl Future<Output = Result<(), StepError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), StepError>> + Send;
}

pub struct WaydroidSession {
    start_script: PathBuf,
    start_timeout: Duration,
}

impl WaydroidSession {
    pub fn new(config: &UiConfig) -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/root".into());
        WaydroidSession {
            start_script: PathBuf::from(home).join(".local/bin/start-waydroid.sh"),
            start_timeout: Duration::from_secs(config.timeouts.session_start_secs),
        }
    }

    async fn has_process(&self) -> bool {
        let mut cmd = Command::new("pgrep");
        cmd.args(["-f", "waydroid"]);
        match run_output(cmd, "pgrep waydroid", PROBE_TIMEOUT).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn status_output(&self) -> Option<String> {
        let mut cmd = Command::new("waydroid");
        cmd.arg("status");
        let output = run_output(cmd, "waydroid status", PROBE_TIMEOUT).await.ok()?;
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Session for WaydroidSession {
    async fn is_alive(&self) -> bool {
        if !self.has_process().await {
            return false;
        }
        self.state_label().await == "RUNNING"
    }

    async fn state_label(&self) -> String {
        match self.status_output().await {
            Some(out) => parse_session_state(&out),
            None => "UNKNOWN".into(),
        }
    }

    async fn start(&self) -> Result<(), StepError> {
        if self.is_alive().await {
            return Ok(());
        }
        if !self.start_script.exists() {
            return Err(StepError::dependency(format!(
                "container start script not found: {}",
                self.start_script.display()
            )));
        }

        info!(script = %self.start_script.display(), "starting container session");
        Command::new(&self.start_script)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StepError::dependency(format!("container start failed: {e}")))?;

        let ticks = self.start_timeout.as_secs().max(1);
        for _ in 0..ticks {
            sleep(Duration::from_secs(1)).await;
            if self.is_alive().await {
                info!("container session is running");
                // Give the android side a moment to finish boot before the
                // first commands land.
                sleep(Duration::from_secs(5)).await;
                return Ok(());
            }
        }
        Err(StepError::dependency(format!(
            "container session not running after {}s",
            self.start_timeout.as_secs()
        )))
    }

    async fn stop(&self) -> Result<(), StepError> {
        if !self.is_alive().await {
            return Ok(());
        }
        info!("stopping container session");
        let mut cmd = Command::new("waydroid");
        cmd.args(["session", "stop"]);
        let _ = run_output(cmd, "waydroid session stop", STOP_TIMEOUT).await;

        for _ in 0..10 {
            sleep(Duration::from_secs(1)).await;
            if !self.is_alive().await {
                return Ok(());
            }
        }
        warn!("container did not stop gracefully, killing processes");
        let mut cmd = Command::new("pkill");
        cmd.args(["-f", "waydroid"]);
        let _ = run_output(cmd, "pkill waydroid", PROBE_TIMEOUT).await;
        sleep(Duration::from_secs(2)).await;
        if self.is_alive().await {
            return Err(StepError::action("container still running after kill"));
        }
        Ok(())
    }
}

/// Pull the session state out of `waydroid status` output.
fn parse_session_state(out: &str) -> String {
    out.lines()
        .find_map(|line| {
            line.split_once("Session:")
                .map(|(_, state)| state.trim().to_string())
        })
        .unwrap_or_else(|| "UNKNOWN".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_running_session() {
        let out = "Session:\tRUNNING\nContainer:\tRUNNING\nVendor type:\tMAINLINE\n";
        assert_eq!(parse_session_state(out), "RUNNING");
    }

    #[test]
    fn parses_stopped_session() {
        assert_eq!(parse_session_state("Session:\tSTOPPED\n"), "STOPPED");
    }

    #[test]
    fn missing_session_line_is_unknown() {
        assert_eq!(parse_session_state("WayDroid is not initialized\n"), "UNKNOWN");
    }
}
