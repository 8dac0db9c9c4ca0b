use std::path::PathBuf;

use anyhow::{Result, bail};
use bytes::Bytes;
use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;

use crate::types::*;

pub struct Client {
    http: ReqwestClient,
}

impl Client {
    pub fn new(socket_path: PathBuf) -> Self {
        let http = ReqwestClient::builder()
            .unix_socket(socket_path)
            .build()
            .expect("build reqwest client");
        Self { http }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(format!("http://localhost{path}"))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{path}: {status} {text}");
        }
        Ok(serde_json::from_slice(&resp.bytes().await?)?)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        json: &impl serde::Serialize,
    ) -> Result<T> {
        let resp = self
            .http
            .post(format!("http://localhost{path}"))
            .json(json)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("{path}: {status} {text}");
        }
        Ok(serde_json::from_slice(&resp.bytes().await?)?)
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        self.get("/health").await
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.get("/status").await
    }

    pub async fn classify(&self) -> Result<ClassifyResponse> {
        self.get("/classify").await
    }

    pub async fn ready(&self, timeout_secs: Option<u64>) -> Result<ReadyReport> {
        self.post("/ready", &ReadyRequest { timeout_secs }).await
    }

    pub async fn unlock(&self) -> Result<UnlockReport> {
        self.post("/unlock", &serde_json::json!({})).await
    }

    pub async fn screenshot(&self) -> Result<Bytes> {
        let resp = self
            .http
            .get("http://localhost/screenshot")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("/screenshot: {status} {text}");
        }
        Ok(resp.bytes().await?)
    }

    pub async fn pixel(&self, x: i32, y: i32) -> Result<PixelResponse> {
        self.get(&format!("/pixel?x={x}&y={y}")).await
    }

    pub async fn reload_config(&self) -> Result<ReloadResponse> {
        self.post("/config/reload", &serde_json::json!({})).await
    }

    pub async fn launch_app(&self) -> Result<OkResponse> {
        self.post("/app/launch", &serde_json::json!({})).await
    }

    pub async fn stop_app(&self, force: bool) -> Result<OkResponse> {
        self.post("/app/stop", &StopAppRequest { force }).await
    }

    pub async fn restart_app(&self) -> Result<OkResponse> {
        self.post("/app/restart", &serde_json::json!({})).await
    }

    pub async fn compositor(&self, action: &str) -> Result<OkResponse> {
        self.post(&format!("/compositor/{action}"), &serde_json::json!({}))
            .await
    }

    pub async fn session(&self, action: &str) -> Result<OkResponse> {
        self.post(&format!("/session/{action}"), &serde_json::json!({}))
            .await
    }
}
