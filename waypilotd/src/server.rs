use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::classify::ScreenState;
use crate::compositor::{Compositor, WestonCompositor};
use crate::config::{ConfigStore, Geometry, UiConfig};
use crate::container::{Session, WaydroidSession};
use crate::device::{KEYCODE_HOME, ShellTransport, Transport};
use crate::error::StepError;
use crate::orchestrator::{Orchestrator, ReadyReport};
use crate::screen::Observer;
use crate::unlock::{UnlockReport, run_unlock};

pub struct Daemon {
    pub config: ConfigStore,
    run_lock: tokio::sync::Mutex<()>,
}

impl Daemon {
    pub fn new(config: ConfigStore) -> Self {
        Daemon {
            config,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }
}

pub type AppState = Arc<Daemon>;

#[derive(Debug)]
struct AppError {
    message: String,
    status: StatusCode,
}

impl AppError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::CONFLICT,
        }
    }
}

impl From<StepError> for AppError {
    fn from(e: StepError) -> Self {
        let status = match &e {
            StepError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            message: e.to_string(),
            status,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

/// Per-request controller set, built from one config snapshot so a reload
/// mid-flight never mixes old and new anchors.
struct Controllers {
    config: Arc<UiConfig>,
    transport: ShellTransport,
    compositor: WestonCompositor,
    session: WaydroidSession,
}

impl Controllers {
    fn new(state: &AppState) -> Self {
        let config = state.config.snapshot();
        Controllers {
            transport: ShellTransport::new(&config),
            compositor: WestonCompositor::new(&config),
            session: WaydroidSession::new(&config),
            config,
        }
    }

    fn observer(&self) -> Observer<'_, ShellTransport, WestonCompositor, WaydroidSession> {
        Observer::new(&self.transport, &self.compositor, &self.session, &self.config)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    compositor: CompositorStatus,
    session: SessionStatus,
    screen_state: ScreenState,
    screen_detail: String,
}

#[derive(Serialize)]
struct CompositorStatus {
    running: bool,
    window: Option<Geometry>,
}

#[derive(Serialize)]
struct SessionStatus {
    running: bool,
    state: String,
    overlay_focused: bool,
}

#[derive(Serialize)]
struct ClassifyResponse {
    state: ScreenState,
    detail: String,
}

#[derive(Deserialize, Default)]
struct ReadyRequest {
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct StopAppRequest {
    #[serde(default)]
    force: bool,
}

#[derive(Serialize)]
struct OkResponse {
    status: &'static str,
}

const OK: OkResponse = OkResponse { status: "ok" };

#[derive(Deserialize)]
struct PixelQuery {
    x: i32,
    y: i32,
}

#[derive(Serialize)]
struct PixelResponse {
    x: i32,
    y: i32,
    r: u8,
    g: u8,
    b: u8,
    hex: String,
}

#[derive(Serialize)]
struct ReloadResponse {
    status: &'static str,
    version: u32,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, AppError> {
    let ctl = Controllers::new(&state);
    let compositor_running = ctl.compositor.is_alive().await;
    let window = ctl.compositor.window_geometry().await;
    let session_running = ctl.session.is_alive().await;
    let session_state = ctl.session.state_label().await;
    let observer = ctl.observer();
    let (screen_state, screen_detail) = observer.screen_state_detailed().await;
    let overlay_focused = if session_running {
        observer.overlay_focused().await
    } else {
        false
    };
    Ok(Json(StatusResponse {
        compositor: CompositorStatus {
            running: compositor_running,
            window,
        },
        session: SessionStatus {
            running: session_running,
            state: session_state,
            overlay_focused,
        },
        screen_state,
        screen_detail,
    }))
}

async fn classify_once(State(state): State<AppState>) -> Result<Json<ClassifyResponse>, AppError> {
    let ctl = Controllers::new(&state);
    let (screen_state, detail) = ctl.observer().screen_state_detailed().await;
    Ok(Json(ClassifyResponse {
        state: screen_state,
        detail,
    }))
}

async fn ensure_ready(
    State(state): State<AppState>,
    Json(req): Json<ReadyRequest>,
) -> Result<Json<ReadyReport>, AppError> {
    let _guard = state
        .run_lock
        .try_lock()
        .map_err(|_| AppError::conflict("a readiness run is already in progress"))?;
    let ctl = Controllers::new(&state);
    let budget = Duration::from_secs(
        req.timeout_secs
            .unwrap_or(ctl.config.timeouts.ready_budget_secs),
    );
    let report = Orchestrator::new(
        &ctl.transport,
        &ctl.compositor,
        &ctl.session,
        &ctl.config,
        budget,
    )
    .ensure_ready()
    .await;
    Ok(Json(report))
}

async fn unlock_once(State(state): State<AppState>) -> Result<Json<UnlockReport>, AppError> {
    let ctl = Controllers::new(&state);
    let report = run_unlock(&ctl.observer()).await;
    Ok(Json(report))
}

async fn screenshot(State(state): State<AppState>) -> Result<Response, AppError> {
    let ctl = Controllers::new(&state);
    let frame = ctl.transport.capture_desktop().await?;
    tracing::debug!(width = frame.width(), height = frame.height(), "captured desktop frame");
    let jpeg = frame.to_jpeg(85)?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response())
}

async fn pixel_color(
    State(state): State<AppState>,
    Query(query): Query<PixelQuery>,
) -> Result<Json<PixelResponse>, AppError> {
    let ctl = Controllers::new(&state);
    let frame = ctl.transport.capture_device().await?;
    let [r, g, b] = frame
        .pixel(query.x, query.y)
        .ok_or_else(|| StepError::Inconclusive(format!("({}, {}) outside frame", query.x, query.y)))?;
    Ok(Json(PixelResponse {
        x: query.x,
        y: query.y,
        r,
        g,
        b,
        hex: format!("#{r:02x}{g:02x}{b:02x}"),
    }))
}

async fn reload_config(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let config = state
        .config
        .reload()
        .map_err(|e| AppError::new(format!("config reload failed: {e:#}")))?;
    Ok(Json(ReloadResponse {
        status: "ok",
        version: config.version,
    }))
}

async fn launch_app(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    let ctl = Controllers::new(&state);
    ctl.transport
        .launch_app(&ctl.config.game.package, &ctl.config.game.main_activity)
        .await?;
    Ok(Json(OK))
}

async fn stop_app(
    State(state): State<AppState>,
    Json(req): Json<StopAppRequest>,
) -> Result<Json<OkResponse>, AppError> {
    let ctl = Controllers::new(&state);
    if req.force {
        ctl.transport.stop_app(&ctl.config.game.package).await?;
    } else {
        // Graceful exit: send the game to the background.
        ctl.transport.key(KEYCODE_HOME).await?;
    }
    Ok(Json(OK))
}

async fn restart_app(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    let ctl = Controllers::new(&state);
    ctl.transport.stop_app(&ctl.config.game.package).await?;
    tokio::time::sleep(Duration::from_secs(3)).await;
    ctl.transport
        .launch_app(&ctl.config.game.package, &ctl.config.game.main_activity)
        .await?;
    Ok(Json(OK))
}

async fn compositor_start(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    Controllers::new(&state).compositor.start().await?;
    Ok(Json(OK))
}

async fn compositor_stop(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    Controllers::new(&state).compositor.stop().await?;
    Ok(Json(OK))
}

async fn session_start(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    Controllers::new(&state).session.start().await?;
    Ok(Json(OK))
}

async fn session_stop(State(state): State<AppState>) -> Result<Json<OkResponse>, AppError> {
    Controllers::new(&state).session.stop().await?;
    Ok(Json(OK))
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/classify", get(classify_once))
        .route("/ready", post(ensure_ready))
        .route("/unlock", post(unlock_once))
        .route("/screenshot", get(screenshot))
        .route("/pixel", get(pixel_color))
        .route("/config/reload", post(reload_config))
        .route("/app/launch", post(launch_app))
        .route("/app/stop", post(stop_app))
        .route("/app/restart", post(restart_app))
        .route("/compositor/start", post(compositor_start))
        .route("/compositor/stop", post(compositor_stop))
        .route("/session/start", post(session_start))
        .route("/session/stop", post(session_stop))
        .layer(
            tower_http::compression::CompressionLayer::new()
                .zstd(true)
                .no_br()
                .no_gzip()
                .no_deflate(),
        )
        .with_state(state)
}
