use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
pub struct HealthResponse {
    #[allow(dead_code)]
    pub status: String,
}

#[derive(Deserialize, Serialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Deserialize, Serialize)]
pub struct CompositorStatus {
    pub running: bool,
    pub window: Option<Geometry>,
}

#[derive(Deserialize, Serialize)]
pub struct SessionStatus {
    pub running: bool,
    pub state: String,
    pub overlay_focused: bool,
}

#[derive(Deserialize, Serialize)]
pub struct StatusResponse {
    pub compositor: CompositorStatus,
    pub session: SessionStatus,
    pub screen_state: String,
    pub screen_detail: String,
}

#[derive(Deserialize, Serialize)]
pub struct ClassifyResponse {
    pub state: String,
    pub detail: String,
}

#[derive(Deserialize, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Readiness {
    Success,
    PartialSuccess(String),
    Failure(String),
}

#[derive(Deserialize, Serialize)]
pub struct ReadyReport {
    pub readiness: Readiness,
    pub last_state: String,
    pub elapsed_secs: f64,
    pub events: Vec<String>,
}

#[derive(Deserialize, Serialize)]
pub struct UnlockReport {
    pub unlocked: bool,
    pub attempts: u32,
    pub steps_dispatched: u32,
    pub final_state: String,
}

#[derive(Deserialize, Serialize)]
pub struct PixelResponse {
    pub x: i32,
    pub y: i32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub hex: String,
}

#[derive(Deserialize, Serialize)]
pub struct ReloadResponse {
    pub status: String,
    pub version: u32,
}

#[derive(Deserialize, Serialize)]
pub struct OkResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyRequest {
    pub timeout_secs: Option<u64>,
}

#[derive(Serialize)]
pub struct StopAppRequest {
    pub force: bool,
}
