//! Scripted fake of the controlled system for orchestrator and unlock
//! tests. The world's observable state is a timeline of phases; with the
//! tokio clock paused, lookups by elapsed time are fully deterministic.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::compositor::Compositor;
use crate::config::Geometry;
use crate::container::Session;
use crate::device::Transport;
use crate::error::StepError;
use crate::frame::Frame;

pub const GAME_FOCUS: &str = "com.lilithgames.rok.gpkr/com.harry.engine.MainActivity";

pub mod frames {
    use crate::frame::Frame;

    const WINDOW: (i32, i32, i32, i32) = (5, 29, 1024, 600);

    /// Uniform dark gray: not black, no unlock button, flat icon band.
    pub fn loading() -> Frame {
        Frame::solid(1100, 700, [50, 50, 50])
    }

    pub fn black() -> Frame {
        Frame::solid(1100, 700, [0, 0, 0])
    }

    pub fn locked() -> Frame {
        let mut frame = loading();
        frame.paint(128, 103, 3, 3, [135, 130, 130]);
        frame
    }

    pub fn loaded() -> Frame {
        let mut frame = loading();
        let (x, y, w, h) = WINDOW;
        frame.paint(x, y + (h as f32 * 0.7) as i32 - 25, w, 50, [210, 60, 40]);
        frame
    }

    /// Device-side frame without the menu marker.
    pub fn device_plain() -> Frame {
        Frame::solid(1024, 568, [80, 80, 80])
    }

    /// Device-side frame with the blue menu button rendered.
    pub fn device_main() -> Frame {
        let mut frame = device_plain();
        frame.paint(986, 526, 9, 9, [20, 100, 140]);
        frame
    }
}

#[derive(Clone)]
struct Phase {
    at: Duration,
    desktop: Frame,
    device: Frame,
    focus: Option<String>,
    app_running: bool,
    session_alive: bool,
    session_state: String,
}

pub struct FakeWorld {
    start: Instant,
    phases: Vec<Phase>,
    compositor_alive: Mutex<bool>,
    window: Option<Geometry>,
    desktop_clicks: Mutex<u32>,
    taps: Mutex<Vec<(i32, i32)>>,
    keys: Mutex<Vec<i32>>,
    launches: Mutex<u32>,
    session_start_calls: Mutex<u32>,
}

impl FakeWorld {
    pub fn new() -> Self {
        FakeWorld {
            start: Instant::now(),
            phases: vec![Phase {
                at: Duration::ZERO,
                desktop: frames::loading(),
                device: frames::device_plain(),
                focus: None,
                app_running: false,
                session_alive: true,
                session_state: "RUNNING".into(),
            }],
            compositor_alive: Mutex::new(true),
            window: Some(Geometry {
                x: 5,
                y: 29,
                width: 1024,
                height: 600,
            }),
            desktop_clicks: Mutex::new(0),
            taps: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            launches: Mutex::new(0),
            session_start_calls: Mutex::new(0),
        }
    }

    fn first(mut self, edit: impl FnOnce(&mut Phase)) -> Self {
        edit(&mut self.phases[0]);
        self
    }

    fn push_at(mut self, at: Duration, edit: impl FnOnce(&mut Phase)) -> Self {
        let mut phase = self.phases.last().expect("base phase").clone();
        phase.at = at;
        edit(&mut phase);
        self.phases.push(phase);
        self
    }

    pub fn desktop(self, frame: Frame) -> Self {
        self.first(|p| p.desktop = frame)
    }

    pub fn focus(self, focus: Option<&str>) -> Self {
        let focus = focus.map(str::to_string);
        self.first(|p| p.focus = focus)
    }

    pub fn app_running(self, running: bool) -> Self {
        self.first(|p| p.app_running = running)
    }

    pub fn session(self, alive: bool, state: &str) -> Self {
        let state = state.to_string();
        self.first(|p| {
            p.session_alive = alive;
            p.session_state = state;
        })
    }

    pub fn desktop_at(self, at: Duration, frame: Frame) -> Self {
        self.push_at(at, |p| p.desktop = frame)
    }

    pub fn device_at(self, at: Duration, frame: Frame) -> Self {
        self.push_at(at, |p| p.device = frame)
    }

    pub fn focus_at(self, at: Duration, focus: Option<&str>) -> Self {
        let focus = focus.map(str::to_string);
        self.push_at(at, |p| p.focus = focus)
    }

    pub fn app_running_at(self, at: Duration, running: bool) -> Self {
        self.push_at(at, |p| p.app_running = running)
    }

    pub fn session_at(self, at: Duration, alive: bool, state: &str) -> Self {
        let state = state.to_string();
        self.push_at(at, |p| {
            p.session_alive = alive;
            p.session_state = state;
        })
    }

    pub fn compositor_dead(self) -> Self {
        *self.compositor_alive.lock().unwrap() = false;
        self
    }

    pub fn no_window(mut self) -> Self {
        self.window = None;
        self
    }

    fn current(&self) -> &Phase {
        let elapsed = self.start.elapsed();
        self.phases
            .iter()
            .rev()
            .find(|p| p.at <= elapsed)
            .unwrap_or(&self.phases[0])
    }

    pub fn desktop_clicks(&self) -> u32 {
        *self.desktop_clicks.lock().unwrap()
    }

    pub fn taps(&self) -> Vec<(i32, i32)> {
        self.taps.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<i32> {
        self.keys.lock().unwrap().clone()
    }

    pub fn launches(&self) -> u32 {
        *self.launches.lock().unwrap()
    }

    pub fn session_start_calls(&self) -> u32 {
        *self.session_start_calls.lock().unwrap()
    }
}

impl Transport for FakeWorld {
    async fn desktop_click(&self, _x: i32, _y: i32) -> Result<(), StepError> {
        *self.desktop_clicks.lock().unwrap() += 1;
        Ok(())
    }

    async fn tap(&self, x: i32, y: i32) -> Result<(), StepError> {
        self.taps.lock().unwrap().push((x, y));
        Ok(())
    }

    async fn key(&self, keycode: i32) -> Result<(), StepError> {
        self.keys.lock().unwrap().push(keycode);
        Ok(())
    }

    async fn capture_desktop(&self) -> Result<Frame, StepError> {
        Ok(self.current().desktop.clone())
    }

    async fn capture_device(&self) -> Result<Frame, StepError> {
        Ok(self.current().device.clone())
    }

    async fn foreground_window(&self) -> Result<Option<String>, StepError> {
        Ok(self.current().focus.clone())
    }

    async fn app_running(&self, _package: &str) -> Result<bool, StepError> {
        Ok(self.current().app_running)
    }

    async fn launch_app(&self, _package: &str, _activity: &str) -> Result<(), StepError> {
        *self.launches.lock().unwrap() += 1;
        Ok(())
    }

    async fn stop_app(&self, _package: &str) -> Result<(), StepError> {
        Ok(())
    }
}

impl Compositor for FakeWorld {
    async fn is_alive(&self) -> bool {
        *self.compositor_alive.lock().unwrap()
    }

    async fn window_geometry(&self) -> Option<Geometry> {
        if *self.compositor_alive.lock().unwrap() {
            self.window
        } else {
            None
        }
    }

    async fn start(&self) -> Result<(), StepError> {
        *self.compositor_alive.lock().unwrap() = true;
        Ok(())
    }

    async fn stop(&self) -> Result<(), StepError> {
        *self.compositor_alive.lock().unwrap() = false;
        Ok(())
    }
}

impl Session for FakeWorld {
    async fn is_alive(&self) -> bool {
        self.current().session_alive
    }

    async fn state_label(&self) -> String {
        self.current().session_state.clone()
    }

    async fn start(&self) -> Result<(), StepError> {
        *self.session_start_calls.lock().unwrap() += 1;
        Ok(())
    }

    async fn stop(&self) -> Result<(), StepError> {
        Ok(())
    }
}
