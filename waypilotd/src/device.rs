use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::UiConfig;
use crate::error::StepError;
use crate::frame::Frame;

pub const KEYCODE_HOME: i32 = 3;
pub const KEYCODE_BACK: i32 = 4;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Device-command transport: executes named input/shell actions against the
/// running container and hands back text or decoded frames. Failures are
/// transient step failures, never crashes.
pub trait Transport: Sync {
    /// X11-level click on the compositor window, bypassing the container.
    fn desktop_click(&self, x: i32, y: i32) -> impl Future<Output = Result<(), StepError>> + Send;

    /// Input tap inside the container, device coordinates.
    fn tap(&self, x: i32, y: i32) -> impl Future<Output = Result<(), StepError>> + Send;

    fn key(&self, keycode: i32) -> impl Future<Output = Result<(), StepError>> + Send;

    /// Capture the X11 root window that hosts the compositor.
    fn capture_desktop(&self) -> impl Future<Output = Result<Frame, StepError>> + Send;

    /// Capture the container's own framebuffer.
    fn capture_device(&self) -> impl Future<Output = Result<Frame, StepError>> + Send;

    fn foreground_window(&self)
    -> impl Future<Output = Result<Option<String>, StepError>> + Send;

    fn app_running(&self, package: &str) -> impl Future<Output = Result<bool, StepError>> + Send;

    fn launch_app(
        &self,
        package: &str,
        activity: &str,
    ) -> impl Future<Output = Result<(), StepError>> + Send;

    fn stop_app(&self, package: &str) -> impl Future<Output = Result<(), StepError>> + Send;
}

/// Transport backed by `adb` for the container side and `xdotool`/`import`
/// for the X11 side.
pub struct ShellTransport {
    serial: String,
    display: String,
}

impl ShellTransport {
    pub fn new(config: &UiConfig) -> Self {
        ShellTransport {
            serial: config.game.adb_serial.clone(),
            display: config.display.clone(),
        }
    }

    async fn adb_shell(&self, shell_command: &str) -> Result<String, StepError> {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", self.serial.as_str(), "shell", shell_command]);
        let output = run_output(cmd, "adb shell", SHELL_TIMEOUT).await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Transport for ShellTransport {
    async fn desktop_click(&self, x: i32, y: i32) -> Result<(), StepError> {
        let (x_arg, y_arg) = (x.to_string(), y.to_string());
        let mut cmd = Command::new("xdotool");
        cmd.args(["mousemove", x_arg.as_str(), y_arg.as_str(), "click", "1"])
            .env("DISPLAY", &self.display);
        let output = run_output(cmd, "xdotool click", COMMAND_TIMEOUT).await?;
        if !output.status.success() {
            return Err(StepError::action(format!(
                "xdotool click at ({x}, {y}) failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        debug!(x, y, "desktop click");
        Ok(())
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), StepError> {
        self.adb_shell(&format!("input tap {x} {y}")).await?;
        debug!(x, y, "device tap");
        Ok(())
    }

    async fn key(&self, keycode: i32) -> Result<(), StepError> {
        self.adb_shell(&format!("input keyevent {keycode}")).await?;
        debug!(keycode, "key event");
        Ok(())
    }

    async fn capture_desktop(&self) -> Result<Frame, StepError> {
        let mut cmd = Command::new("import");
        cmd.args(["-window", "root", "png:-"])
            .env("DISPLAY", &self.display);
        let output = run_output(cmd, "import screenshot", COMMAND_TIMEOUT).await?;
        if !output.status.success() {
            return Err(StepError::action("desktop screenshot capture failed"));
        }
        Frame::from_png(&output.stdout)
    }

    async fn capture_device(&self) -> Result<Frame, StepError> {
        let mut cmd = Command::new("adb");
        cmd.args(["-s", self.serial.as_str(), "exec-out", "screencap", "-p"]);
        let output = run_output(cmd, "screencap", COMMAND_TIMEOUT).await?;
        if !output.status.success() {
            return Err(StepError::action("device screenshot capture failed"));
        }
        Frame::from_png(&output.stdout)
    }

    async fn foreground_window(&self) -> Result<Option<String>, StepError> {
        let out = self
            .adb_shell("dumpsys window | grep mCurrentFocus")
            .await?;
        Ok(parse_focus(&out))
    }

    async fn app_running(&self, package: &str) -> Result<bool, StepError> {
        let out = self.adb_shell(&format!("pidof {package}")).await?;
        Ok(!out.trim().is_empty())
    }

    async fn launch_app(&self, package: &str, activity: &str) -> Result<(), StepError> {
        // monkey spins the process up in the background, am start brings the
        // main activity to the foreground.
        self.adb_shell(&format!(
            "monkey -p {package} -c android.intent.category.LAUNCHER 1"
        ))
        .await?;
        tokio::time::sleep(Duration::from_secs(2)).await;
        self.adb_shell(&format!(
            "am start -n {package}/{activity} -a android.intent.action.MAIN -c android.intent.category.LAUNCHER"
        ))
        .await?;
        Ok(())
    }

    async fn stop_app(&self, package: &str) -> Result<(), StepError> {
        self.adb_shell(&format!("am force-stop {package}")).await?;
        Ok(())
    }
}

pub async fn run_output(
    mut cmd: Command,
    label: &str,
    timeout: Duration,
) -> Result<std::process::Output, StepError> {
    cmd.stdin(Stdio::null());
    match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => Err(StepError::action(format!(
            "{label}: timed out after {}s",
            timeout.as_secs()
        ))),
        Ok(Err(e)) => Err(StepError::action(format!("{label}: {e}"))),
        Ok(Ok(output)) => Ok(output),
    }
}

/// Extract the focused window token from a `dumpsys window` focus line, e.g.
/// `mCurrentFocus=Window{abc u0 com.example/.MainActivity}`.
pub fn parse_focus(out: &str) -> Option<String> {
    let line = out.lines().find(|l| l.contains("Window{"))?;
    let token = line.split_whitespace().last()?;
    let focus = token.trim_end_matches('}');
    if focus.is_empty() {
        None
    } else {
        Some(focus.to_string())
    }
}
