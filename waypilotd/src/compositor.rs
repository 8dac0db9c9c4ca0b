use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::{Geometry, UiConfig};
use crate::device::run_output;
use crate::error::StepError;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Compositor supervisor: a liveness oracle plus idempotent start/stop, and
/// discovery of the actual window geometry the classifier anchors to.
pub trait Compositor: Sync {
    fn is_alive(&self) -> impl Future<Output = bool> + Send;

    fn window_geometry(&self) -> impl Future<Output = Option<Geometry>> + Send;

    fn start(&self) -> impl Future<Output = Result<(), StepError>> + Send;

    fn stop(&self) -> impl Future<Output = Result<(), StepError>> + Send;
}

pub struct WestonCompositor {
    display: String,
    home_position: (i32, i32),
}

impl WestonCompositor {
    pub fn new(config: &UiConfig) -> Self {
        let geom = config.window.default_geometry;
        WestonCompositor {
            display: config.display.clone(),
            home_position: (geom.x, geom.y),
        }
    }

    async fn window_tree(&self) -> Option<String> {
        let mut cmd = Command::new("xwininfo");
        cmd.args(["-root", "-tree"]).env("DISPLAY", &self.display);
        let output = run_output(cmd, "xwininfo", PROBE_TIMEOUT).await.ok()?;
        if !output.status.success() {
            return None;
        }
        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Move the freshly mapped window to its configured corner so configured
    /// anchors line up with the capture.
    async fn place_window(&self) {
        sleep(Duration::from_secs(1)).await;
        let Some(tree) = self.window_tree().await else {
            return;
        };
        let Some(window_id) = tree.lines().find_map(parse_window_id) else {
            warn!("compositor window not found, skipping placement");
            return;
        };
        let (x, y) = self.home_position;
        let (x_arg, y_arg) = (x.to_string(), y.to_string());
        let mut cmd = Command::new("xdotool");
        cmd.args(["windowmove", window_id.as_str(), x_arg.as_str(), y_arg.as_str()])
            .env("DISPLAY", &self.display);
        match run_output(cmd, "xdotool windowmove", PROBE_TIMEOUT).await {
            Ok(_) => info!(window_id = %window_id, x, y, "moved compositor window"),
            Err(e) => warn!(error = %e, "could not move compositor window"),
        }
    }
}

impl Compositor for WestonCompositor {
    async fn is_alive(&self) -> bool {
        let mut cmd = Command::new("pgrep");
        cmd.args(["-x", "weston"]);
        match run_output(cmd, "pgrep weston", PROBE_TIMEOUT).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn window_geometry(&self) -> Option<Geometry> {
        let tree = self.window_tree().await?;
        tree.lines().find_map(parse_window_geometry)
    }

    async fn start(&self) -> Result<(), StepError> {
        if self.is_alive().await {
            return Ok(());
        }
        info!("starting compositor");
        let mut cmd = Command::new("weston");
        cmd.arg("--backend=x11-backend.so")
            .env("DISPLAY", &self.display)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd.spawn()
            .map_err(|e| StepError::dependency(format!("weston spawn failed: {e}")))?;

        for _ in 0..20 {
            sleep(Duration::from_millis(500)).await;
            if self.is_alive().await {
                self.place_window().await;
                return Ok(());
            }
        }
        Err(StepError::dependency("weston did not start in time"))
    }

    async fn stop(&self) -> Result<(), StepError> {
        if !self.is_alive().await {
            return Ok(());
        }
        let mut cmd = Command::new("pkill");
        cmd.args(["-x", "weston"]);
        let _ = run_output(cmd, "pkill weston", PROBE_TIMEOUT).await;

        for _ in 0..20 {
            sleep(Duration::from_millis(500)).await;
            if !self.is_alive().await {
                return Ok(());
            }
        }
        warn!("compositor did not stop gracefully, forcing");
        let mut cmd = Command::new("pkill");
        cmd.args(["-9", "-x", "weston"]);
        let _ = run_output(cmd, "pkill -9 weston", PROBE_TIMEOUT).await;
        sleep(Duration::from_secs(1)).await;
        if self.is_alive().await {
            return Err(StepError::action("compositor still running after SIGKILL"));
        }
        Ok(())
    }
}

const WINDOW_MARKER: &str = "Weston Compositor";

/// Parse `0x3000005 "Weston Compositor - screen0" ...` into the window id.
fn parse_window_id(line: &str) -> Option<String> {
    if !line.contains(WINDOW_MARKER) {
        return None;
    }
    line.split_whitespace()
        .find(|token| token.starts_with("0x"))
        .map(str::to_string)
}

/// Parse the `WxH+X+Y` geometry token from an `xwininfo -tree` line.
fn parse_window_geometry(line: &str) -> Option<Geometry> {
    if !line.contains(WINDOW_MARKER) {
        return None;
    }
    line.split_whitespace().find_map(parse_geometry_token)
}

fn parse_geometry_token(token: &str) -> Option<Geometry> {
    let (size, rest) = token.split_once('+')?;
    let (w, h) = size.split_once('x')?;
    let (x, y) = rest.split_once('+')?;
    Some(Geometry {
        x: x.parse().ok()?,
        y: y.parse().ok()?,
        width: w.parse().ok()?,
        height: h.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_LINE: &str =
        r#"     0x3000005 "Weston Compositor - screen0": ("weston" "weston")  1024x600+5+29  +5+29"#;

    #[test]
    fn parses_window_id_from_tree_line() {
        assert_eq!(parse_window_id(TREE_LINE).as_deref(), Some("0x3000005"));
        assert_eq!(parse_window_id("0x1 \"xterm\""), None);
    }

    #[test]
    fn parses_geometry_from_tree_line() {
        let geom = parse_window_geometry(TREE_LINE).unwrap();
        assert_eq!(
            geom,
            Geometry {
                x: 5,
                y: 29,
                width: 1024,
                height: 600
            }
        );
    }

    #[test]
    fn ignores_non_geometry_tokens() {
        assert_eq!(parse_geometry_token("0x3000005"), None);
        assert_eq!(parse_geometry_token("(\"weston\""), None);
        assert_eq!(parse_geometry_token("+5+29"), None);
    }
}
