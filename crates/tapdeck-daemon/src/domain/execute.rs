//! Action execution
//!
//! Runs a validated [`Action`] against the playback backend and the host.

use std::collections::HashSet;
use std::sync::Arc;

use tapdeck_common::{Action, ExecutionError};
use tracing::{debug, info, instrument, warn};

use crate::infra::feedback::SystemControl;
use crate::infra::playback::{Playback, PlaybackState};

/// Nesting limit when expanding library containers
pub const MAX_BROWSE_DEPTH: usize = 16;

/// Capabilities an action executes against
#[derive(Clone)]
pub struct ActionContext {
    pub playback: Arc<dyn Playback>,
    pub system: Arc<dyn SystemControl>,
}

impl ActionContext {
    pub fn new(playback: Arc<dyn Playback>, system: Arc<dyn SystemControl>) -> Self {
        Self { playback, system }
    }
}

/// Execute an action
#[instrument(skip(ctx), fields(action = %action))]
pub async fn execute(action: &Action, ctx: &ActionContext) -> Result<(), ExecutionError> {
    let playback = ctx.playback.as_ref();

    match action {
        Action::ReplaceTracklist { uri } => {
            info!(uri = %uri, "Replacing tracklist");
            let uris = resolve_tracks(playback, uri).await?;
            playback.clear_tracklist().await?;
            playback.add_tracks(uris).await?;
            playback.play().await
        }
        Action::SetVolume { percent } => {
            info!(percent, "Setting volume");
            playback.set_volume(*percent).await
        }
        Action::PlayPause => {
            if playback.state().await? == PlaybackState::Playing {
                info!("Pausing the playback");
                playback.pause().await
            } else {
                info!("Resuming the playback");
                playback.resume().await
            }
        }
        Action::Stop => {
            info!("Stopping playback");
            playback.stop().await
        }
        Action::PreviousTrack => {
            info!("Changing to previous track");
            playback.previous().await
        }
        Action::NextTrack => {
            info!("Changing to next track");
            playback.next().await
        }
        Action::ToggleShuffle => {
            let shuffle = !playback.shuffle().await?;
            info!(shuffle, "Toggling shuffle mode");
            playback.set_shuffle(shuffle).await
        }
        Action::Shutdown => ctx.system.power_off().await,
    }
}

/// Expand a tracklist URI into track URIs
///
/// Known playlists expand to their items in stored order. Otherwise the URI
/// is browsed and every contained track collected depth-first. When neither
/// yields anything the URI itself is played as a single track.
pub async fn resolve_tracks(
    playback: &dyn Playback,
    uri: &str,
) -> Result<Vec<String>, ExecutionError> {
    let playlists = playback.playlists().await?;
    let mut uris = if playlists.iter().any(|p| p == uri) {
        debug!(uri, "Expanding playlist");
        playback.playlist_tracks(uri.to_string()).await?
    } else {
        let mut collected = Vec::new();
        let mut visited = HashSet::new();
        collect_tracks(playback, uri, &mut visited, &mut collected).await;
        collected
    };

    if uris.is_empty() {
        uris.push(uri.to_string());
    }
    Ok(uris)
}

/// Pending work in the depth-first library walk
enum Walk {
    Container { uri: String, depth: usize },
    Track(String),
}

/// Depth-first walk of a library container. Browse failures end that branch.
async fn collect_tracks(
    playback: &dyn Playback,
    uri: &str,
    visited: &mut HashSet<String>,
    out: &mut Vec<String>,
) {
    let mut stack = vec![Walk::Container {
        uri: uri.to_string(),
        depth: 0,
    }];

    while let Some(entry) = stack.pop() {
        let (container, depth) = match entry {
            Walk::Track(track) => {
                out.push(track);
                continue;
            }
            Walk::Container { uri, depth } => (uri, depth),
        };
        if depth >= MAX_BROWSE_DEPTH || !visited.insert(container.clone()) {
            continue;
        }

        let refs = match playback.browse(container.clone()).await {
            Ok(refs) => refs,
            Err(e) => {
                warn!(uri = %container, error = %e, "Could not browse container");
                continue;
            }
        };

        // Reversed so the stack pops children in listed order
        for item in refs.into_iter().rev() {
            if item.kind.is_container() {
                stack.push(Walk::Container {
                    uri: item.uri,
                    depth: depth + 1,
                });
            } else {
                stack.push(Walk::Track(item.uri));
            }
        }
    }
}
