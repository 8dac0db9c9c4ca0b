use tracing::debug;

use crate::classify::{ScreenState, classify_with_detail, menu_marker_visible};
use crate::compositor::Compositor;
use crate::config::{Geometry, UiConfig};
use crate::container::Session;
use crate::device::Transport;

/// Read-only glue between the pure classifier and the live system: captures
/// a fresh frame, resolves the actual window geometry, and absorbs capture
/// failures into `Unknown`.
pub struct Observer<'a, T, C, S> {
    pub transport: &'a T,
    pub compositor: &'a C,
    pub session: &'a S,
    pub config: &'a UiConfig,
}

/// Outcome of the three-gate main-game check, most fundamental gate first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainGate {
    Confirmed,
    ProcessDown,
    NotFocused { focus: Option<String> },
    MarkerMissing,
}

impl MainGate {
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            MainGate::Confirmed => None,
            MainGate::ProcessDown => Some("game process not running".into()),
            MainGate::NotFocused { focus } => Some(format!(
                "game not focused (current focus: {})",
                focus.as_deref().unwrap_or("none")
            )),
            MainGate::MarkerMissing => Some("menu marker not detected".into()),
        }
    }
}

impl<'a, T: Transport, C: Compositor, S: Session> Observer<'a, T, C, S> {
    pub fn new(transport: &'a T, compositor: &'a C, session: &'a S, config: &'a UiConfig) -> Self {
        Observer {
            transport,
            compositor,
            session,
            config,
        }
    }

    /// Actual compositor window geometry, or the configured default when the
    /// window cannot be discovered.
    pub async fn window(&self) -> Geometry {
        match self.compositor.window_geometry().await {
            Some(geom) => geom,
            None => self.config.window.default_geometry,
        }
    }

    pub async fn screen_state(&self) -> ScreenState {
        self.screen_state_detailed().await.0
    }

    pub async fn screen_state_detailed(&self) -> (ScreenState, String) {
        if !self.compositor.is_alive().await {
            return (ScreenState::Unknown, "compositor not running".into());
        }
        if !self.session.is_alive().await {
            return (ScreenState::Empty, "container session not running".into());
        }
        let window = self.window().await;
        match self.transport.capture_desktop().await {
            Ok(frame) => {
                let (state, detail) = classify_with_detail(&frame, window, self.config, true);
                debug!(state = %state, detail = %detail, "classified screen");
                (state, detail)
            }
            Err(e) => (ScreenState::Unknown, format!("capture failed: {e}")),
        }
    }

    /// The three-gate confirmation that the game reached its main screen:
    /// process alive, foreground focus on the game, menu marker visible.
    pub async fn confirm_main(&self) -> MainGate {
        let package = &self.config.game.package;
        match self.transport.app_running(package).await {
            Ok(true) => {}
            _ => return MainGate::ProcessDown,
        }
        let focus = match self.transport.foreground_window().await {
            Ok(focus) => focus,
            Err(_) => None,
        };
        match &focus {
            Some(f) if f.contains(package.as_str()) => {}
            _ => return MainGate::NotFocused { focus },
        }
        match self.transport.capture_device().await {
            Ok(frame) if menu_marker_visible(&frame, self.config) => MainGate::Confirmed,
            _ => MainGate::MarkerMissing,
        }
    }

    pub async fn in_main_game(&self) -> bool {
        self.confirm_main().await == MainGate::Confirmed
    }

    /// Whether an interrupting system overlay owns the foreground focus.
    pub async fn overlay_focused(&self) -> bool {
        let Ok(Some(focus)) = self.transport.foreground_window().await else {
            return false;
        };
        let focus = focus.to_lowercase();
        self.config
            .overlay
            .focus_fragments
            .iter()
            .any(|fragment| focus.contains(fragment.as_str()))
    }
}
