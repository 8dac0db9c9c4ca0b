use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::sampler::{AxisRange, Channel, ColorRange, DetectionRule, MatchThreshold, Point, Region};

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Geometry {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2,
            y: self.y + self.height / 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub default_geometry: Geometry,
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            default_geometry: Geometry {
                x: 5,
                y: 29,
                width: 1024,
                height: 600,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenRule {
    pub detection: DetectionRule,
}

impl Default for ScreenRule {
    fn default() -> Self {
        // Square neighborhood around the window center, all channels near zero.
        ScreenRule {
            detection: DetectionRule {
                sample_area: Region::Grid {
                    x_range: AxisRange {
                        min: -10,
                        max: 11,
                        step: 5,
                    },
                    y_range: AxisRange {
                        min: -10,
                        max: 11,
                        step: 5,
                    },
                },
                color_range: ColorRange {
                    r: Channel { min: 0, max: 10 },
                    g: Channel { min: 0, max: 10 },
                    b: Channel { min: 0, max: 10 },
                },
                threshold: MatchThreshold::Ratio { ratio: 0.8 },
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnchoredRule {
    pub position: Point,
    pub detection: DetectionRule,
}

fn default_unlock_rule() -> AnchoredRule {
    // Pale green ring of the desktop unlock circle.
    AnchoredRule {
        position: Point { x: 129, y: 104 },
        detection: DetectionRule {
            sample_area: Region::Box {
                width: 3,
                height: 3,
            },
            color_range: ColorRange {
                r: Channel { min: 130, max: 145 },
                g: Channel { min: 125, max: 140 },
                b: Channel { min: 125, max: 135 },
            },
            threshold: MatchThreshold::MinPixels { min_pixels: 1 },
        },
    }
}

fn default_menu_rule() -> AnchoredRule {
    // Blue menu button in the game's bottom-right corner, device coordinates.
    AnchoredRule {
        position: Point { x: 990, y: 530 },
        detection: DetectionRule {
            sample_area: Region::Cross {
                offsets: vec![-2, 0, 2],
            },
            color_range: ColorRange {
                r: Channel { min: 0, max: 50 },
                g: Channel { min: 60, max: 140 },
                b: Channel { min: 110, max: 170 },
            },
            threshold: MatchThreshold::MinPixels { min_pixels: 1 },
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TapPoint {
    pub tap_position: Point,
}

impl Default for TapPoint {
    fn default() -> Self {
        TapPoint {
            tap_position: Point { x: 512, y: 284 },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Elements {
    pub black_screen: ScreenRule,
    #[serde(default = "default_unlock_rule")]
    pub button_unlock: AnchoredRule,
    #[serde(default = "default_menu_rule")]
    pub menu_main: AnchoredRule,
    pub tap_to_start: TapPoint,
}

impl Default for Elements {
    fn default() -> Self {
        Elements {
            black_screen: ScreenRule::default(),
            button_unlock: default_unlock_rule(),
            menu_main: default_menu_rule(),
            tap_to_start: TapPoint::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickTarget {
    Center,
    ButtonUnlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnlockStep {
    pub target: ClickTarget,
    #[serde(default)]
    pub wait_after_secs: f32,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub verify_after_each: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 2,
            verify_after_each: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnlockSequence {
    pub steps: Vec<UnlockStep>,
    pub retry: RetryPolicy,
}

impl Default for UnlockSequence {
    fn default() -> Self {
        UnlockSequence {
            steps: vec![
                UnlockStep {
                    target: ClickTarget::Center,
                    wait_after_secs: 1.0,
                },
                UnlockStep {
                    target: ClickTarget::ButtonUnlock,
                    wait_after_secs: 2.0,
                },
            ],
            retry: RetryPolicy::default(),
        }
    }
}

/// Loading-vs-loaded heuristic over a horizontal band in the lower-middle
/// portion of the window. A sample is "colorful" when its channel spread
/// and brightness both clear their floors; enough colorful samples means
/// the app icons have rendered. Empirically tuned, deliberately all
/// configurable.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LoadingBand {
    pub band_x_start: f32,
    pub band_x_end: f32,
    pub band_y: f32,
    pub x_step: i32,
    pub y_spread: i32,
    pub y_step: i32,
    pub brightness_floor: u8,
    pub spread_margin: u8,
    pub colorful_ratio: f32,
}

impl Default for LoadingBand {
    fn default() -> Self {
        LoadingBand {
            band_x_start: 0.3,
            band_x_end: 0.7,
            band_y: 0.7,
            x_step: 20,
            y_spread: 20,
            y_step: 10,
            brightness_floor: 100,
            spread_margin: 30,
            colorful_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Lowercased fragments matched against the foreground window report.
    pub focus_fragments: Vec<String>,
    pub check_interval_secs: u64,
    pub max_checks: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        OverlayConfig {
            focus_fragments: vec![
                "statusbar".into(),
                "notificationshade".into(),
                "systemui".into(),
                "panelview".into(),
            ],
            check_interval_secs: 5,
            max_checks: 18,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub package: String,
    pub main_activity: String,
    pub adb_serial: String,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            package: "com.lilithgames.rok.gpkr".into(),
            main_activity: "com.harry.engine.MainActivity".into(),
            adb_serial: "192.168.240.112:5555".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StartupTaps {
    pub burst_clicks: u32,
    pub burst_click_gap_ms: u64,
    pub settle_secs: u64,
    pub burst_taps: u32,
    pub burst_tap_gap_ms: u64,
    pub checkpoints_secs: Vec<u64>,
    pub taps_per_checkpoint: u32,
    pub checkpoint_tap_gap_ms: u64,
    pub click_tap_pause_ms: u64,
}

impl Default for StartupTaps {
    fn default() -> Self {
        StartupTaps {
            burst_clicks: 5,
            burst_click_gap_ms: 500,
            settle_secs: 2,
            burst_taps: 3,
            burst_tap_gap_ms: 1000,
            checkpoints_secs: vec![20, 30, 40, 50, 60, 70, 80],
            taps_per_checkpoint: 3,
            checkpoint_tap_gap_ms: 500,
            click_tap_pause_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub compositor_start_secs: u64,
    pub session_start_secs: u64,
    pub session_grace_secs: u64,
    pub loading_wait_secs: u64,
    pub app_ready_secs: u64,
    pub ready_budget_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            compositor_start_secs: 10,
            session_start_secs: 60,
            session_grace_secs: 5,
            loading_wait_secs: 60,
            app_ready_secs: 30,
            ready_budget_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub version: u32,
    pub display: String,
    pub window: WindowConfig,
    pub elements: Elements,
    pub unlock_sequence: UnlockSequence,
    pub loading: LoadingBand,
    pub overlay: OverlayConfig,
    pub game: GameConfig,
    pub startup_taps: StartupTaps,
    pub timeouts: Timeouts,
}

impl Default for UiConfig {
    fn default() -> Self {
        UiConfig {
            version: CONFIG_VERSION,
            display: ":10.0".into(),
            window: WindowConfig::default(),
            elements: Elements::default(),
            unlock_sequence: UnlockSequence::default(),
            loading: LoadingBand::default(),
            overlay: OverlayConfig::default(),
            game: GameConfig::default(),
            startup_taps: StartupTaps::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl UiConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} (expected {})",
                self.version,
                CONFIG_VERSION
            );
        }
        let geom = self.window.default_geometry;
        if geom.width <= 0 || geom.height <= 0 {
            bail!("window geometry must have positive dimensions");
        }
        if self.unlock_sequence.retry.max_attempts == 0 {
            bail!("unlock retry max_attempts must be at least 1");
        }
        if self.loading.x_step <= 0 || self.loading.y_step <= 0 {
            bail!("loading band steps must be positive");
        }
        if self.overlay.check_interval_secs == 0 {
            bail!("overlay check interval must be positive");
        }
        Ok(())
    }
}

/// Owner of the current configuration snapshot. `snapshot` hands out a
/// reference-counted copy; `reload` parses the document and swaps the whole
/// value at once, so in-flight operations keep the snapshot they started
/// with.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<UiConfig>>,
}

impl ConfigStore {
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config = match &path {
            Some(p) if p.exists() => read_config(p)?,
            Some(p) => {
                tracing::warn!(path = %p.display(), "config document not found, using defaults");
                UiConfig::default()
            }
            None => UiConfig::default(),
        };
        Ok(ConfigStore {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn snapshot(&self) -> Arc<UiConfig> {
        self.current.read().expect("config lock poisoned").clone()
    }

    pub fn reload(&self) -> Result<Arc<UiConfig>> {
        let Some(path) = &self.path else {
            bail!("no config document configured");
        };
        let config = Arc::new(read_config(path)?);
        *self.current.write().expect("config lock poisoned") = config.clone();
        tracing::info!(path = %path.display(), "reloaded ui config");
        Ok(config)
    }
}

fn read_config(path: &Path) -> Result<UiConfig> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("read config {}", path.display()))?;
    let config: UiConfig = serde_json::from_str(&text)
        .with_context(|| format!("parse config {}", path.display()))?;
    config.validate()?;
    Ok(config)
}
