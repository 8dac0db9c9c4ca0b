use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use argh::FromArgs;

use crate::client::Client;

mod client;
mod runner;
mod types;

/// Waydroid game automation CLI
#[derive(FromArgs)]
struct Cli {
    /// daemon unix socket path
    #[argh(option)]
    socket: Option<String>,

    #[argh(subcommand)]
    command: Command,
}

fn default_socket_path() -> PathBuf {
    let home = std::env::var("HOME").expect("HOME not set");
    PathBuf::from(format!("{home}/.local/state/waypilot.sock"))
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Status(StatusCmd),
    Classify(ClassifyCmd),
    Ready(ReadyCmd),
    Unlock(UnlockCmd),
    Screenshot(ScreenshotCmd),
    Pixel(PixelCmd),
    Launch(LaunchCmd),
    Stop(StopCmd),
    Restart(RestartCmd),
    Reload(ReloadCmd),
    Compositor(CompositorCmd),
    Session(SessionCmd),
    Start(StartCmd),
    Version(VersionCmd),
}

/// show compositor, session and screen status
#[derive(FromArgs)]
#[argh(subcommand, name = "status")]
struct StatusCmd {}

/// classify the current screen once
#[derive(FromArgs)]
#[argh(subcommand, name = "classify")]
struct ClassifyCmd {}

/// drive the container and game to a confirmed ready state
#[derive(FromArgs)]
#[argh(subcommand, name = "ready")]
struct ReadyCmd {
    /// overall timeout budget in seconds
    #[argh(option)]
    timeout: Option<u64>,
}

/// run the desktop unlock sequence once
#[derive(FromArgs)]
#[argh(subcommand, name = "unlock")]
struct UnlockCmd {}

/// capture the desktop and save as jpeg
#[derive(FromArgs)]
#[argh(subcommand, name = "screenshot")]
struct ScreenshotCmd {
    #[argh(positional)]
    path: String,
}

/// read the device pixel color at coordinates
#[derive(FromArgs)]
#[argh(subcommand, name = "pixel")]
struct PixelCmd {
    #[argh(positional)]
    x: i32,
    #[argh(positional)]
    y: i32,
}

/// launch the game
#[derive(FromArgs)]
#[argh(subcommand, name = "launch")]
struct LaunchCmd {}

/// stop the game (HOME by default, --force for force-stop)
#[derive(FromArgs)]
#[argh(subcommand, name = "stop")]
struct StopCmd {
    /// force-stop the game process
    #[argh(switch)]
    force: bool,
}

/// force-stop and relaunch the game
#[derive(FromArgs)]
#[argh(subcommand, name = "restart")]
struct RestartCmd {}

/// reload the ui config document
#[derive(FromArgs)]
#[argh(subcommand, name = "reload")]
struct ReloadCmd {}

/// control the compositor
#[derive(FromArgs)]
#[argh(subcommand, name = "compositor")]
struct CompositorCmd {
    /// start or stop
    #[argh(positional)]
    action: String,
}

/// control the container session
#[derive(FromArgs)]
#[argh(subcommand, name = "session")]
struct SessionCmd {
    /// start or stop
    #[argh(positional)]
    action: String,
}

/// start the daemon
#[derive(FromArgs)]
#[argh(subcommand, name = "start")]
struct StartCmd {}

/// print version
#[derive(FromArgs)]
#[argh(subcommand, name = "version")]
struct VersionCmd {}

/// Check if the daemon is reachable; if not, auto-start it.
async fn ensure_server(socket: &Path) -> Result<Client> {
    if socket.exists() {
        let client = Client::new(socket.to_path_buf());
        if client.health().await.is_ok() {
            return Ok(client);
        }
        eprintln!("debug: socket exists but daemon is not responding, restarting...");
    } else {
        eprintln!("debug: socket not found, starting daemon...");
    }

    runner::start(socket)?;

    // Daemon was spawned detached; poll until it's ready.
    let client = Client::new(socket.to_path_buf());
    let mut delay_ms = 1u64;
    let mut total_ms = 0u64;
    loop {
        if client.health().await.is_ok() {
            eprintln!("debug: daemon ready after {total_ms}ms");
            return Ok(client);
        }
        if total_ms >= 30000 {
            bail!("daemon did not become ready after 30s");
        }
        delay_ms = (delay_ms * 2).min(1000);
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        total_ms += delay_ms;
    }
}

fn check_action(action: &str) -> Result<()> {
    if action != "start" && action != "stop" {
        bail!("action must be \"start\" or \"stop\", got \"{action}\"");
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    let socket = cli.socket.map(PathBuf::from).unwrap_or_else(default_socket_path);

    // Handle commands that don't need a running daemon
    if let Command::Start(_) = &cli.command {
        return runner::start(&socket);
    }
    if let Command::Version(_) = &cli.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let client = ensure_server(&socket).await?;

    match cli.command {
        Command::Status(_) => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Classify(_) => {
            let verdict = client.classify().await?;
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Command::Ready(cmd) => {
            let report = client.ready(cmd.timeout).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if matches!(report.readiness, types::Readiness::Failure(_)) {
                std::process::exit(1);
            }
        }
        Command::Unlock(_) => {
            let report = client.unlock().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Screenshot(cmd) => {
            let data = client.screenshot().await?;
            fs::write(&cmd.path, &data)?;
            eprintln!("saved screenshot to {}", cmd.path);
        }
        Command::Pixel(cmd) => {
            let pixel = client.pixel(cmd.x, cmd.y).await?;
            println!("{}", serde_json::to_string_pretty(&pixel)?);
        }
        Command::Launch(_) => {
            client.launch_app().await?;
            eprintln!("launch command sent");
        }
        Command::Stop(cmd) => {
            client.stop_app(cmd.force).await?;
        }
        Command::Restart(_) => {
            client.restart_app().await?;
            eprintln!("restart command sent");
        }
        Command::Reload(_) => {
            let reloaded = client.reload_config().await?;
            eprintln!("config reloaded (version {})", reloaded.version);
        }
        Command::Compositor(cmd) => {
            check_action(&cmd.action)?;
            client.compositor(&cmd.action).await?;
        }
        Command::Session(cmd) => {
            check_action(&cmd.action)?;
            client.session(&cmd.action).await?;
        }
        Command::Start(_) | Command::Version(_) => unreachable!(),
    }

    Ok(())
}
