//! Mopidy JSON-RPC playback backend
//!
//! Talks to Mopidy's HTTP JSON-RPC 2.0 endpoint (`/mopidy/rpc`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tapdeck_common::ExecutionError;
use tracing::{debug, instrument};

use super::playback::{LibraryRef, Playback, PlaybackState};

/// Default Mopidy RPC endpoint
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:6680/mopidy/rpc";

/// Playback capability backed by a Mopidy server
#[derive(Clone)]
pub struct MopidyPlayback {
    http_client: Client,
    rpc_url: String,
    next_id: std::sync::Arc<AtomicU64>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl MopidyPlayback {
    /// Create a client for the given RPC endpoint
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, ExecutionError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExecutionError::Backend {
                method: "connect".to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            next_id: std::sync::Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Issue one JSON-RPC call and return its raw result
    #[instrument(skip(self, params), fields(url = %self.rpc_url))]
    async fn call(&self, method: &str, params: Value) -> Result<Value, ExecutionError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let backend_error = |reason: String| ExecutionError::Backend {
            method: method.to_string(),
            reason,
        };

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| backend_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(backend_error(format!("HTTP {status}")));
        }

        let response: RpcResponse = response.json().await.map_err(|e| {
            ExecutionError::UnexpectedResponse {
                method: method.to_string(),
                reason: e.to_string(),
            }
        })?;

        if let Some(error) = response.error {
            let detail = error
                .data
                .as_ref()
                .and_then(|d| d.get("message"))
                .and_then(Value::as_str)
                .map(|m| format!(" ({m})"))
                .unwrap_or_default();
            return Err(backend_error(format!(
                "JSON-RPC error {}: {}{}",
                error.code, error.message, detail
            )));
        }

        debug!(method, "Mopidy call succeeded");
        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ExecutionError> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| ExecutionError::UnexpectedResponse {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Playback for MopidyPlayback {
    async fn clear_tracklist(&self) -> Result<(), ExecutionError> {
        self.call("core.tracklist.clear", json!({})).await.map(drop)
    }

    async fn add_tracks(&self, uris: Vec<String>) -> Result<(), ExecutionError> {
        self.call("core.tracklist.add", json!({ "uris": uris }))
            .await
            .map(drop)
    }

    async fn play(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.play", json!({})).await.map(drop)
    }

    async fn pause(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.pause", json!({})).await.map(drop)
    }

    async fn resume(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.resume", json!({})).await.map(drop)
    }

    async fn stop(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.stop", json!({})).await.map(drop)
    }

    async fn previous(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.previous", json!({})).await.map(drop)
    }

    async fn next(&self) -> Result<(), ExecutionError> {
        self.call("core.playback.next", json!({})).await.map(drop)
    }

    async fn state(&self) -> Result<PlaybackState, ExecutionError> {
        self.call_as("core.playback.get_state", json!({})).await
    }

    async fn set_volume(&self, percent: u8) -> Result<(), ExecutionError> {
        self.call("core.mixer.set_volume", json!({ "volume": percent }))
            .await
            .map(drop)
    }

    async fn shuffle(&self) -> Result<bool, ExecutionError> {
        let value: Option<bool> = self.call_as("core.tracklist.get_random", json!({})).await?;
        Ok(value.unwrap_or(false))
    }

    async fn set_shuffle(&self, enabled: bool) -> Result<(), ExecutionError> {
        self.call("core.tracklist.set_random", json!({ "value": enabled }))
            .await
            .map(drop)
    }

    async fn browse(&self, uri: String) -> Result<Vec<LibraryRef>, ExecutionError> {
        let refs: Option<Vec<LibraryRef>> = self
            .call_as("core.library.browse", json!({ "uri": uri }))
            .await?;
        Ok(refs.unwrap_or_default())
    }

    async fn playlists(&self) -> Result<Vec<String>, ExecutionError> {
        let refs: Vec<LibraryRef> = self.call_as("core.playlists.as_list", json!({})).await?;
        Ok(refs.into_iter().map(|r| r.uri).collect())
    }

    async fn playlist_tracks(&self, uri: String) -> Result<Vec<String>, ExecutionError> {
        let refs: Option<Vec<LibraryRef>> = self
            .call_as("core.playlists.get_items", json!({ "uri": uri }))
            .await?;
        Ok(refs.unwrap_or_default().into_iter().map(|r| r.uri).collect())
    }
}
