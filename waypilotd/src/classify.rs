use std::fmt;

use serde::Serialize;

use crate::config::{Geometry, LoadingBand, UiConfig};
use crate::frame::Frame;
use crate::sampler::RuleOutcome;

/// What the compositor desktop currently shows. Derived, never stored:
/// recomputed from a fresh frame on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenState {
    Empty,
    Loading,
    Loaded,
    #[serde(rename = "lock")]
    Locked,
    Black,
    Unknown,
}

impl ScreenState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenState::Empty => "empty",
            ScreenState::Loading => "loading",
            ScreenState::Loaded => "loaded",
            ScreenState::Locked => "lock",
            ScreenState::Black => "black",
            ScreenState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ScreenState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a captured frame. Pure function of (frame, window, config,
/// session liveness): same inputs always produce the same state.
pub fn classify(
    frame: &Frame,
    window: Geometry,
    config: &UiConfig,
    session_running: bool,
) -> ScreenState {
    classify_with_detail(frame, window, config, session_running).0
}

/// Classification plus a human-readable account of the deciding rule.
/// Cheaper and more certain signals are checked first; the ambiguous
/// loading-vs-loaded heuristic decides last.
pub fn classify_with_detail(
    frame: &Frame,
    window: Geometry,
    config: &UiConfig,
    session_running: bool,
) -> (ScreenState, String) {
    if !session_running {
        return (ScreenState::Empty, "container session not running".into());
    }

    let black = &config.elements.black_screen.detection;
    let black_outcome = black.evaluate(frame, window.center());
    if black.passes(black_outcome) {
        return (
            ScreenState::Black,
            format!(
                "black screen: {}/{} samples around window center",
                black_outcome.matched, black_outcome.total
            ),
        );
    }

    let unlock = &config.elements.button_unlock;
    let unlock_outcome = unlock.detection.evaluate(frame, unlock.position);
    if unlock.detection.passes(unlock_outcome) {
        return (
            ScreenState::Locked,
            format!(
                "unlock button: {}/{} samples at ({}, {})",
                unlock_outcome.matched, unlock_outcome.total, unlock.position.x, unlock.position.y
            ),
        );
    }

    let band = loading_band_outcome(frame, window, &config.loading);
    let detail = format!(
        "icon band: {}/{} colorful samples (ratio {:.2})",
        band.matched,
        band.total,
        band.ratio()
    );
    if band.total > 0 && band.ratio() > config.loading.colorful_ratio {
        (ScreenState::Loaded, detail)
    } else {
        (ScreenState::Loading, detail)
    }
}

/// Count colorful samples across the app-icon band of the desktop. A sample
/// is colorful when its brightest channel clears the brightness floor and
/// the channel spread clears the margin.
fn loading_band_outcome(frame: &Frame, window: Geometry, band: &LoadingBand) -> RuleOutcome {
    let y_anchor = window.y + (window.height as f32 * band.band_y) as i32;
    let x_start = window.x + (window.width as f32 * band.band_x_start) as i32;
    let x_end = window.x + (window.width as f32 * band.band_x_end) as i32;

    let mut outcome = RuleOutcome::default();
    let mut x = x_start;
    while x < x_end {
        let mut dy = -band.y_spread;
        while dy <= band.y_spread {
            if let Some([r, g, b]) = frame.pixel(x, y_anchor + dy) {
                outcome.total += 1;
                let max = r.max(g).max(b);
                let min = r.min(g).min(b);
                if max > band.brightness_floor && max - min > band.spread_margin {
                    outcome.matched += 1;
                }
            }
            dy += band.y_step.max(1);
        }
        x += band.x_step.max(1);
    }
    outcome
}

/// Menu-marker probe against a device-side frame; the final gate of
/// main-game confirmation.
pub fn menu_marker_visible(frame: &Frame, config: &UiConfig) -> bool {
    let menu = &config.elements.menu_main;
    let outcome = menu.detection.evaluate(frame, menu.position);
    menu.detection.passes(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UiConfig;

    fn window() -> Geometry {
        Geometry {
            x: 5,
            y: 29,
            width: 1024,
            height: 600,
        }
    }

    // Uniform gray: not black, no unlock button, icon band dark and flat.
    fn loading_frame() -> Frame {
        Frame::solid(1100, 700, [50, 50, 50])
    }

    fn loaded_frame() -> Frame {
        let mut frame = loading_frame();
        // Colorful icon row across the whole sampled band.
        let w = window();
        let y = w.y + (w.height as f32 * 0.7) as i32;
        frame.paint(w.x, y - 25, w.width, 50, [210, 60, 40]);
        frame
    }

    fn locked_frame() -> Frame {
        let mut frame = loading_frame();
        frame.paint(128, 103, 3, 3, [135, 130, 130]);
        frame
    }

    #[test]
    fn session_down_is_empty_regardless_of_pixels() {
        let config = UiConfig::default();
        let frame = loaded_frame();
        assert_eq!(
            classify(&frame, window(), &config, false),
            ScreenState::Empty
        );
    }

    #[test]
    fn black_frame_classifies_black() {
        let config = UiConfig::default();
        let frame = Frame::solid(1100, 700, [0, 0, 0]);
        assert_eq!(classify(&frame, window(), &config, true), ScreenState::Black);
    }

    #[test]
    fn black_rule_requires_strict_ratio() {
        let mut config = UiConfig::default();
        // 25 grid samples, all matching; ratio 1.0 passes only if > threshold.
        config.elements.black_screen.detection.threshold =
            crate::sampler::MatchThreshold::Ratio { ratio: 1.0 };
        let frame = Frame::solid(1100, 700, [0, 0, 0]);
        assert_ne!(classify(&frame, window(), &config, true), ScreenState::Black);
    }

    #[test]
    fn unlock_button_pixels_classify_locked() {
        let config = UiConfig::default();
        let frame = locked_frame();
        assert_eq!(
            classify(&frame, window(), &config, true),
            ScreenState::Locked
        );
    }

    #[test]
    fn black_wins_over_lock() {
        let config = UiConfig::default();
        let mut frame = Frame::solid(1100, 700, [0, 0, 0]);
        frame.paint(128, 103, 3, 3, [135, 130, 130]);
        assert_eq!(classify(&frame, window(), &config, true), ScreenState::Black);
    }

    #[test]
    fn colorful_band_classifies_loaded() {
        let config = UiConfig::default();
        assert_eq!(
            classify(&loaded_frame(), window(), &config, true),
            ScreenState::Loaded
        );
    }

    #[test]
    fn flat_band_classifies_loading() {
        let config = UiConfig::default();
        assert_eq!(
            classify(&loading_frame(), window(), &config, true),
            ScreenState::Loading
        );
    }

    #[test]
    fn bright_but_flat_band_is_not_colorful() {
        let config = UiConfig::default();
        let mut frame = loading_frame();
        let w = window();
        let y = w.y + (w.height as f32 * 0.7) as i32;
        // Bright gray: clears the brightness floor, fails the spread margin.
        frame.paint(w.x, y - 25, w.width, 50, [200, 200, 200]);
        assert_eq!(classify(&frame, w, &config, true), ScreenState::Loading);
    }

    #[test]
    fn classification_is_deterministic() {
        let config = UiConfig::default();
        let frame = loaded_frame();
        let first = classify(&frame, window(), &config, true);
        let second = classify(&frame, window(), &config, true);
        assert_eq!(first, second);
    }

    #[test]
    fn menu_marker_requires_configured_color() {
        let config = UiConfig::default();
        let mut device = Frame::solid(1024, 568, [80, 80, 80]);
        assert!(!menu_marker_visible(&device, &config));
        device.paint(988, 528, 5, 5, [20, 100, 140]);
        assert!(menu_marker_visible(&device, &config));
    }
}
