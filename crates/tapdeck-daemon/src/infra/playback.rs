//! Playback capability
//!
//! The media backend as seen by actions: a small command interface over the
//! tracklist, transport, mixer and library.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tapdeck_common::ExecutionError;

/// Transport state reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Playing,
    Paused,
    Stopped,
}

/// Kind of a library entry returned by browsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Directory,
    Artist,
    Album,
    Playlist,
    Track,
}

impl RefKind {
    /// Whether the entry can be browsed further
    pub fn is_container(self) -> bool {
        !matches!(self, RefKind::Track)
    }
}

/// Library entry: a track or a browsable container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryRef {
    #[serde(rename = "type")]
    pub kind: RefKind,
    pub uri: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryRef {
    pub fn track(uri: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Track,
            uri: uri.into(),
            name: None,
        }
    }

    pub fn directory(uri: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Directory,
            uri: uri.into(),
            name: None,
        }
    }
}

/// Commands the media backend must support
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Playback: Send + Sync {
    /// Remove every track from the tracklist
    async fn clear_tracklist(&self) -> Result<(), ExecutionError>;

    /// Append tracks to the tracklist, in order
    async fn add_tracks(&self, uris: Vec<String>) -> Result<(), ExecutionError>;

    async fn play(&self) -> Result<(), ExecutionError>;

    async fn pause(&self) -> Result<(), ExecutionError>;

    async fn resume(&self) -> Result<(), ExecutionError>;

    async fn stop(&self) -> Result<(), ExecutionError>;

    async fn previous(&self) -> Result<(), ExecutionError>;

    async fn next(&self) -> Result<(), ExecutionError>;

    async fn state(&self) -> Result<PlaybackState, ExecutionError>;

    /// Set mixer volume, 0..=100
    async fn set_volume(&self, percent: u8) -> Result<(), ExecutionError>;

    async fn shuffle(&self) -> Result<bool, ExecutionError>;

    async fn set_shuffle(&self, enabled: bool) -> Result<(), ExecutionError>;

    /// Direct children of a library container
    async fn browse(&self, uri: String) -> Result<Vec<LibraryRef>, ExecutionError>;

    /// URIs of all stored playlists
    async fn playlists(&self) -> Result<Vec<String>, ExecutionError>;

    /// Track URIs of a playlist, in stored order
    async fn playlist_tracks(&self, uri: String) -> Result<Vec<String>, ExecutionError>;
}
