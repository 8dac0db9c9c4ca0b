use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Spawn the daemon detached from this process. Prefers a `waypilotd`
/// binary sitting next to the CLI, falling back to PATH lookup.
pub fn start(socket_path: &Path) -> Result<()> {
    let program = sibling_daemon().unwrap_or_else(|| PathBuf::from("waypilotd"));

    // A stale socket from a dead daemon would block the new bind.
    let _ = std::fs::remove_file(socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create socket dir {}", parent.display()))?;
    }

    let mut cmd = Command::new(&program);
    cmd.arg("--socket")
        .arg(socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    cmd.spawn()
        .with_context(|| format!("spawn daemon {}", program.display()))?;

    eprintln!("debug: waypilotd started");
    Ok(())
}

fn sibling_daemon() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe.parent()?.join("waypilotd");
    candidate.exists().then_some(candidate)
}
