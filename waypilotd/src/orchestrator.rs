use std::time::Duration;

use serde::Serialize;
use tokio::time::{Instant, sleep};
use tracing::{info, warn};

use crate::classify::ScreenState;
use crate::compositor::Compositor;
use crate::container::Session;
use crate::device::{KEYCODE_BACK, Transport};
use crate::error::StepError;
use crate::sampler::Point;
use crate::screen::{MainGate, Observer};
use crate::unlock::run_unlock;

const SESSION_RUNNING: &str = "RUNNING";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Readiness {
    Success,
    PartialSuccess(String),
    Failure(String),
}

#[derive(Debug, Serialize)]
pub struct ReadyReport {
    pub readiness: Readiness,
    pub last_state: ScreenState,
    pub elapsed_secs: f64,
    pub events: Vec<String>,
}

/// Watchdog budget for the interrupting notification overlay. Checks are
/// spaced at least `interval` apart and capped at `remaining`.
struct OverlayWatch {
    interval: Duration,
    remaining: u32,
    last_check: Option<Instant>,
}

/// Drives the container from any cold state to a confirmed in-game state.
///
/// One readiness run is a single logical flow of control: every wait is
/// deadline-bounded, and the deadline is re-checked at each poll tick so a
/// dropped future or an exhausted budget ends the run promptly. The overlay
/// watchdog is interleaved into the same flow, never a separate task, so a
/// dismissal cannot race a confirmation read.
pub struct Orchestrator<'a, T, C, S> {
    observer: Observer<'a, T, C, S>,
    started: Instant,
    deadline: Instant,
    budget: Duration,
    last_state: ScreenState,
    events: Vec<String>,
}

impl<'a, T: Transport, C: Compositor, S: Session> Orchestrator<'a, T, C, S> {
    pub fn new(
        transport: &'a T,
        compositor: &'a C,
        session: &'a S,
        config: &'a crate::config::UiConfig,
        budget: Duration,
    ) -> Self {
        let started = Instant::now();
        Orchestrator {
            observer: Observer::new(transport, compositor, session, config),
            started,
            deadline: started + budget,
            budget,
            last_state: ScreenState::Unknown,
            events: Vec::new(),
        }
    }

    pub async fn ensure_ready(mut self) -> ReadyReport {
        let readiness = match self.run().await {
            Ok(readiness) => readiness,
            Err(e) => {
                self.event(format!("aborted: {e}"));
                Readiness::Failure(e.to_string())
            }
        };
        info!(?readiness, last_state = %self.last_state, "readiness run finished");
        ReadyReport {
            readiness,
            last_state: self.last_state,
            elapsed_secs: self.started.elapsed().as_secs_f64(),
            events: self.events,
        }
    }

    async fn run(&mut self) -> Result<Readiness, StepError> {
        self.ensure_compositor().await?;
        self.ensure_session().await?;
        self.settle_screen().await?;
        self.launch_app().await?;
        let confirmed = self.bypass_startup().await?;

        let gate = if confirmed {
            MainGate::Confirmed
        } else {
            self.observer.confirm_main().await
        };
        Ok(match gate {
            MainGate::Confirmed => {
                self.event("main game confirmed");
                Readiness::Success
            }
            MainGate::MarkerMissing => {
                // Process is up and focused; only the pixel probe is missing.
                // The game is most likely fine, so report partial success
                // rather than failing the whole run.
                let reason = gate.failure_reason().unwrap_or_default();
                self.event(format!("finished without confirmation: {reason}"));
                Readiness::PartialSuccess(reason)
            }
            gate => {
                let reason = gate.failure_reason().unwrap_or_default();
                self.event(format!("failed final gate: {reason}"));
                Readiness::Failure(reason)
            }
        })
    }

    async fn ensure_compositor(&mut self) -> Result<(), StepError> {
        if !self.observer.compositor.is_alive().await {
            self.event("compositor not running, starting it");
            self.observer.compositor.start().await?;
        }
        let timeout = Duration::from_secs(self.observer.config.timeouts.compositor_start_secs);
        let wait_start = Instant::now();
        loop {
            if self.observer.compositor.window_geometry().await.is_some() {
                return Ok(());
            }
            if wait_start.elapsed() >= timeout {
                return Err(StepError::dependency("compositor window never appeared"));
            }
            self.check_deadline("compositor window")?;
            sleep(Duration::from_secs(1)).await;
        }
    }

    async fn ensure_session(&mut self) -> Result<(), StepError> {
        if self.observer.session.is_alive().await {
            return Ok(());
        }
        self.event("container session not running, starting it");
        self.observer.session.start().await?;

        let timeout = Duration::from_secs(self.observer.config.timeouts.session_start_secs);
        let wait_start = Instant::now();
        loop {
            if self.observer.session.state_label().await == SESSION_RUNNING {
                self.event("container session is running");
                return Ok(());
            }
            if wait_start.elapsed() >= timeout {
                return Err(StepError::dependency(format!(
                    "container session not {SESSION_RUNNING} after {}s",
                    timeout.as_secs()
                )));
            }
            self.check_deadline("container session")?;
            sleep(Duration::from_secs(1)).await;
        }
    }

    /// Bring the desktop to a usable state before touching the app: wake a
    /// black screen, unlock a locked one, wait out a loading splash. Never
    /// fatal; a stubborn screen is handled best-effort downstream.
    async fn settle_screen(&mut self) -> Result<(), StepError> {
        let config = self.observer.config;
        let mut state = self.observe().await;

        if state == ScreenState::Empty {
            self.event("screen empty, starting container session");
            self.observer.session.start().await?;
            sleep(Duration::from_secs(config.timeouts.session_grace_secs)).await;
            state = self.observe().await;
        }

        if state == ScreenState::Loading {
            let wait = Duration::from_secs(config.timeouts.loading_wait_secs);
            let wait_start = Instant::now();
            while state == ScreenState::Loading && wait_start.elapsed() < wait {
                self.check_deadline("desktop to finish loading")?;
                sleep(Duration::from_secs(1)).await;
                state = self.observe().await;
            }
            if state == ScreenState::Loading {
                self.event("desktop still loading, continuing anyway");
            }
        }

        if state == ScreenState::Black {
            let wake = config.elements.tap_to_start.tap_position;
            self.event("screen black, tapping to wake");
            self.tap_quiet(wake).await;
            sleep(Duration::from_secs(2)).await;
            state = self.observe().await;
        }

        if state == ScreenState::Locked {
            self.event("desktop locked, running unlock sequence");
            let report = run_unlock(&self.observer).await;
            self.last_state = report.final_state;
            if report.unlocked {
                self.event(format!("desktop unlocked after {} attempt(s)", report.attempts));
            } else {
                self.event("unlock failed, continuing anyway");
            }
        }

        Ok(())
    }

    async fn launch_app(&mut self) -> Result<(), StepError> {
        let config = self.observer.config;
        let package = config.game.package.as_str();

        let running = self
            .observer
            .transport
            .app_running(package)
            .await
            .unwrap_or(false);
        let focus = self
            .observer
            .transport
            .foreground_window()
            .await
            .unwrap_or(None);
        let focused = focus.as_deref().is_some_and(|f| f.contains(package));

        if running && focused {
            self.event("game already running and focused");
            return Ok(());
        }
        if running {
            self.event("game running but not focused, bringing to foreground");
        } else {
            self.event("launching game");
        }
        self.observer
            .transport
            .launch_app(package, &config.game.main_activity)
            .await?;

        let timeout = Duration::from_secs(config.timeouts.app_ready_secs);
        let wait_start = Instant::now();
        loop {
            if self
                .observer
                .transport
                .app_running(package)
                .await
                .unwrap_or(false)
            {
                let focus = self
                    .observer
                    .transport
                    .foreground_window()
                    .await
                    .unwrap_or(None);
                if focus.as_deref().is_some_and(|f| f.contains(package)) {
                    self.event("game is in the foreground");
                    return Ok(());
                }
            }
            if wait_start.elapsed() >= timeout {
                return Err(StepError::timeout(
                    "game to reach the foreground",
                    timeout.as_secs(),
                ));
            }
            self.check_deadline("game to reach the foreground")?;
            sleep(Duration::from_secs(1)).await;
        }
    }

    /// The extended startup tap sequence: an initial burst covering both the
    /// desktop unlock point and the game's own tap-to-start point, then taps
    /// at fixed elapsed-time checkpoints. Every second in between, the
    /// main-game gate is polled and the loop exits the instant it holds; the
    /// overlay watchdog runs interleaved on its own cadence.
    async fn bypass_startup(&mut self) -> Result<bool, StepError> {
        let config = self.observer.config;
        let taps = &config.startup_taps;
        let center = self.observer.window().await.center();
        let tap_point = config.elements.tap_to_start.tap_position;

        self.event("startup tap sequence: initial burst");
        for _ in 0..taps.burst_clicks {
            self.click_quiet(center).await;
            self.check_deadline("startup tap sequence")?;
            sleep(Duration::from_millis(taps.burst_click_gap_ms)).await;
        }
        sleep(Duration::from_secs(taps.settle_secs)).await;
        for _ in 0..taps.burst_taps {
            self.tap_quiet(tap_point).await;
            self.check_deadline("startup tap sequence")?;
            sleep(Duration::from_millis(taps.burst_tap_gap_ms)).await;
        }

        let sequence_start = Instant::now();
        let mut watchdog = OverlayWatch {
            interval: Duration::from_secs(config.overlay.check_interval_secs),
            remaining: config.overlay.max_checks,
            last_check: None,
        };

        for &checkpoint_secs in &taps.checkpoints_secs {
            let checkpoint = Duration::from_secs(checkpoint_secs);
            loop {
                if self.observer.in_main_game().await {
                    self.event(format!(
                        "main game reached {:.1}s into tap sequence",
                        sequence_start.elapsed().as_secs_f64()
                    ));
                    return Ok(true);
                }
                self.overlay_tick(&mut watchdog).await;
                if sequence_start.elapsed() >= checkpoint {
                    break;
                }
                self.check_deadline("startup tap sequence")?;
                sleep(Duration::from_secs(1)).await;
            }

            self.event(format!("tapping at {checkpoint_secs}s checkpoint"));
            self.click_quiet(center).await;
            sleep(Duration::from_millis(taps.click_tap_pause_ms)).await;
            for _ in 0..taps.taps_per_checkpoint {
                self.tap_quiet(tap_point).await;
                sleep(Duration::from_millis(taps.checkpoint_tap_gap_ms)).await;
            }
        }

        // Checkpoints exhausted; keep watching for the overlay while checks
        // remain, still exiting as soon as the gate holds.
        while watchdog.remaining > 0 {
            if self.observer.in_main_game().await {
                self.event("main game reached after tap sequence");
                return Ok(true);
            }
            self.check_deadline("overlay watch")?;
            sleep(watchdog.interval).await;
            self.overlay_tick(&mut watchdog).await;
        }

        Ok(self.observer.in_main_game().await)
    }

    async fn overlay_tick(&mut self, watch: &mut OverlayWatch) {
        if watch.remaining == 0 {
            return;
        }
        if watch
            .last_check
            .is_some_and(|last| last.elapsed() < watch.interval)
        {
            return;
        }
        watch.last_check = Some(Instant::now());
        watch.remaining -= 1;

        if !self.observer.overlay_focused().await {
            return;
        }
        self.event("system overlay focused, dismissing with BACK");
        for attempt in 1..=2 {
            if let Err(e) = self.observer.transport.key(KEYCODE_BACK).await {
                warn!(error = %e, "overlay dismiss key failed");
            }
            sleep(Duration::from_secs(1)).await;
            if !self.observer.overlay_focused().await {
                self.event("overlay dismissed");
                return;
            }
            if attempt == 1 {
                self.event("overlay still focused, pressing BACK again");
            }
        }
        self.event("overlay still focused after retries, continuing");
    }

    async fn observe(&mut self) -> ScreenState {
        let (state, detail) = self.observer.screen_state_detailed().await;
        if state != self.last_state {
            self.event(format!("screen state {state} ({detail})"));
            self.last_state = state;
        }
        state
    }

    async fn click_quiet(&self, point: Point) {
        if let Err(e) = self.observer.transport.desktop_click(point.x, point.y).await {
            warn!(error = %e, "desktop click failed");
        }
    }

    async fn tap_quiet(&self, point: Point) {
        if let Err(e) = self.observer.transport.tap(point.x, point.y).await {
            warn!(error = %e, "device tap failed");
        }
    }

    fn event(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.events
            .push(format!("[{:5.1}s] {message}", self.started.elapsed().as_secs_f64()));
    }

    fn check_deadline(&self, waiting_for: &str) -> Result<(), StepError> {
        if Instant::now() >= self.deadline {
            Err(StepError::timeout(waiting_for, self.budget.as_secs()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UiConfig;
    use crate::device::KEYCODE_BACK;
    use crate::testfx::{FakeWorld, GAME_FOCUS, frames};

    fn budget() -> Duration {
        Duration::from_secs(300)
    }

    async fn run(world: &FakeWorld, config: &UiConfig, budget: Duration) -> ReadyReport {
        Orchestrator::new(world, world, world, config, budget)
            .ensure_ready()
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn cold_container_start_reaches_game() {
        let config = UiConfig::default();
        let world = FakeWorld::new()
            .session(false, "STOPPED")
            .focus(None)
            .app_running(false)
            // Status flips to RUNNING right after the start command, the
            // container process shows up a few seconds later.
            .session_at(Duration::from_secs(1), false, "RUNNING")
            .session_at(Duration::from_secs(4), true, "RUNNING")
            .desktop_at(Duration::from_secs(4), frames::loaded())
            .app_running_at(Duration::from_secs(8), true)
            .focus_at(Duration::from_secs(8), Some(GAME_FOCUS))
            .device_at(Duration::from_secs(8), frames::device_main());

        let report = run(&world, &config, budget()).await;

        assert_eq!(report.readiness, Readiness::Success);
        assert_eq!(world.session_start_calls(), 2);
        assert_eq!(world.launches(), 1);
        assert!(report.events.iter().any(|e| e.contains("screen state empty")));
        assert!(!report.events.iter().any(|e| e.contains("unlock")));
    }

    #[tokio::test(start_paused = true)]
    async fn black_then_locked_screen_is_woken_and_unlocked() {
        let config = UiConfig::default();
        let world = FakeWorld::new()
            .desktop(frames::black())
            .app_running(true)
            .focus(Some(GAME_FOCUS))
            .desktop_at(Duration::from_millis(1500), frames::locked())
            .desktop_at(Duration::from_millis(4500), frames::loaded())
            .device_at(Duration::from_millis(4500), frames::device_main());

        let report = run(&world, &config, budget()).await;

        assert_eq!(report.readiness, Readiness::Success);
        // One wake tap at the configured point before the startup bursts.
        assert_eq!(world.taps().first(), Some(&(512, 284)));
        // At least the two unlock sequence clicks.
        assert!(world.desktop_clicks() >= 2);
        assert!(report.events.iter().any(|e| e.contains("screen state black")));
        assert!(report.events.iter().any(|e| e.contains("screen state lock")));
        assert!(report.events.iter().any(|e| e.contains("unlocked after 1 attempt")));
    }

    #[tokio::test(start_paused = true)]
    async fn overlay_is_dismissed_with_retry_and_run_confirms() {
        let config = UiConfig::default();
        let world = FakeWorld::new()
            .desktop(frames::loaded())
            .app_running(true)
            .focus(Some(GAME_FOCUS))
            .focus_at(
                Duration::from_secs(9),
                Some("com.android.systemui/NotificationShade"),
            )
            .focus_at(Duration::from_secs(14), Some(GAME_FOCUS))
            .device_at(Duration::from_secs(20), frames::device_main());

        let report = run(&world, &config, budget()).await;

        assert_eq!(report.readiness, Readiness::Success);
        // First BACK left the shade focused, the retry landed.
        assert_eq!(world.keys(), vec![KEYCODE_BACK, KEYCODE_BACK]);
        assert!(report.events.iter().any(|e| e.contains("overlay")));
        assert!(report.elapsed_secs < 30.0);
    }

    #[tokio::test(start_paused = true)]
    async fn tap_sequence_is_bounded_when_game_never_confirms() {
        let config = UiConfig::default();
        let world = FakeWorld::new()
            .desktop(frames::loaded())
            .app_running(true)
            .focus(Some(GAME_FOCUS));

        let report = run(&world, &config, budget()).await;

        // Process up and focused but the marker never showed: partial.
        assert!(matches!(report.readiness, Readiness::PartialSuccess(_)));
        assert!(report.elapsed_secs >= 80.0);
        assert!(report.elapsed_secs < 110.0);
    }

    #[tokio::test(start_paused = true)]
    async fn dead_compositor_is_fatal() {
        let config = UiConfig::default();
        let world = FakeWorld::new().compositor_dead().no_window();

        let report = run(&world, &config, budget()).await;

        match &report.readiness {
            Readiness::Failure(reason) => assert!(reason.contains("compositor")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(report.elapsed_secs < 15.0);
    }

    #[tokio::test(start_paused = true)]
    async fn session_that_never_runs_is_fatal() {
        let config = UiConfig::default();
        let world = FakeWorld::new()
            .session(false, "STOPPED")
            .focus(None)
            .app_running(false);

        let report = run(&world, &config, budget()).await;

        match &report.readiness {
            Readiness::Failure(reason) => assert!(reason.contains("session")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_aborts_with_timeout() {
        let config = UiConfig::default();
        // Game process never appears, so the launch wait would run 30s; a
        // 5s budget must cut it short.
        let world = FakeWorld::new()
            .desktop(frames::loaded())
            .app_running(false)
            .focus(None);

        let report = run(&world, &config, Duration::from_secs(5)).await;

        match &report.readiness {
            Readiness::Failure(reason) => assert!(reason.contains("timed out")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(report.elapsed_secs < 8.0);
    }
}
