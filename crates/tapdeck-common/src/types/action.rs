//! Action kinds and validated actions
//!
//! [`ActionKind`] is the closed set of commands a tag or button can trigger.
//! Validating a raw parameter against a kind yields an [`Action`], which
//! carries the parsed payload (a URI, a volume percentage) so execution never
//! has to re-check it.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// The closed set of executable media and system commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum ActionKind {
    /// Replace the tracklist with a track, playlist or library container
    ReplaceTracklist,
    /// Set the mixer volume to a percentage
    SetVolume,
    /// Pause when playing, resume otherwise
    PlayPause,
    Stop,
    PreviousTrack,
    NextTrack,
    /// Flip the tracklist's random mode
    ToggleShuffle,
    /// Power off the host
    Shutdown,
}

/// Name lookup table, including the names older snapshots used
const KIND_NAMES: &[(&str, ActionKind)] = &[
    ("ReplaceTracklist", ActionKind::ReplaceTracklist),
    ("SetVolume", ActionKind::SetVolume),
    ("PlayPause", ActionKind::PlayPause),
    ("Stop", ActionKind::Stop),
    ("PreviousTrack", ActionKind::PreviousTrack),
    ("NextTrack", ActionKind::NextTrack),
    ("ToggleShuffle", ActionKind::ToggleShuffle),
    ("Shutdown", ActionKind::Shutdown),
    ("Tracklist", ActionKind::ReplaceTracklist),
    ("Volume", ActionKind::SetVolume),
    // Tag-era snapshots store lowercased type names
    ("tracklist", ActionKind::ReplaceTracklist),
    ("volume", ActionKind::SetVolume),
    ("playpause", ActionKind::PlayPause),
    ("stop", ActionKind::Stop),
    ("shutdown", ActionKind::Shutdown),
];

impl ActionKind {
    /// Every kind, in presentation order
    pub const ALL: [ActionKind; 8] = [
        ActionKind::ReplaceTracklist,
        ActionKind::SetVolume,
        ActionKind::PlayPause,
        ActionKind::Stop,
        ActionKind::PreviousTrack,
        ActionKind::NextTrack,
        ActionKind::ToggleShuffle,
        ActionKind::Shutdown,
    ];

    /// Canonical name, as written to snapshots and accepted by the API
    pub fn name(self) -> &'static str {
        match self {
            ActionKind::ReplaceTracklist => "ReplaceTracklist",
            ActionKind::SetVolume => "SetVolume",
            ActionKind::PlayPause => "PlayPause",
            ActionKind::Stop => "Stop",
            ActionKind::PreviousTrack => "PreviousTrack",
            ActionKind::NextTrack => "NextTrack",
            ActionKind::ToggleShuffle => "ToggleShuffle",
            ActionKind::Shutdown => "Shutdown",
        }
    }

    /// Look up a kind by canonical or legacy name
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        KIND_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| ValidationError::UnknownActionKind(name.to_string()))
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            ActionKind::ReplaceTracklist => {
                "Replace the tracklist with the URI of the tag's parameter."
            }
            ActionKind::SetVolume => {
                "Set the volume to the percentage value from the tag's parameter."
            }
            ActionKind::PlayPause => "Pause or resume the playback.",
            ActionKind::Stop => "Stop the playback.",
            ActionKind::PreviousTrack => "Change to the previous track.",
            ActionKind::NextTrack => "Change to the next track.",
            ActionKind::ToggleShuffle => "Toggle random mode.",
            ActionKind::Shutdown => "Shut down the system.",
        }
    }

    /// Whether this kind takes a parameter. Kinds that take one require it.
    pub fn accepts_parameter(self) -> bool {
        matches!(self, ActionKind::ReplaceTracklist | ActionKind::SetVolume)
    }

    /// Check `parameter` against this kind's contract and build the action
    ///
    /// Blank parameters count as absent.
    pub fn validate(self, parameter: Option<&str>) -> Result<Action, ValidationError> {
        let parameter = parameter.map(str::trim).filter(|p| !p.is_empty());

        match (self.accepts_parameter(), parameter) {
            (true, None) => return Err(ValidationError::MissingParameter { kind: self.name() }),
            (false, Some(_)) => {
                return Err(ValidationError::UnexpectedParameter { kind: self.name() })
            }
            _ => {}
        }

        let action = match self {
            ActionKind::ReplaceTracklist => Action::ReplaceTracklist {
                uri: parameter.unwrap_or_default().to_string(),
            },
            ActionKind::SetVolume => Action::SetVolume {
                percent: parse_percent(parameter.unwrap_or_default())?,
            },
            ActionKind::PlayPause => Action::PlayPause,
            ActionKind::Stop => Action::Stop,
            ActionKind::PreviousTrack => Action::PreviousTrack,
            ActionKind::NextTrack => Action::NextTrack,
            ActionKind::ToggleShuffle => Action::ToggleShuffle,
            ActionKind::Shutdown => Action::Shutdown,
        };
        Ok(action)
    }
}

fn parse_percent(raw: &str) -> Result<u8, ValidationError> {
    let invalid = || ValidationError::InvalidParameter {
        kind: ActionKind::SetVolume.name(),
        reason: format!("volume has to be a number between 0 and 100, got \"{raw}\""),
    };
    let value: i64 = raw.parse().map_err(|_| invalid())?;
    u8::try_from(value)
        .ok()
        .filter(|percent| *percent <= 100)
        .ok_or_else(invalid)
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ActionKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl TryFrom<String> for ActionKind {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_name(&value)
    }
}

impl From<ActionKind> for &'static str {
    fn from(kind: ActionKind) -> Self {
        kind.name()
    }
}

/// A validated action with its parsed parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "ActionRecord")]
pub enum Action {
    ReplaceTracklist { uri: String },
    SetVolume { percent: u8 },
    PlayPause,
    Stop,
    PreviousTrack,
    NextTrack,
    ToggleShuffle,
    Shutdown,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ReplaceTracklist { .. } => ActionKind::ReplaceTracklist,
            Action::SetVolume { .. } => ActionKind::SetVolume,
            Action::PlayPause => ActionKind::PlayPause,
            Action::Stop => ActionKind::Stop,
            Action::PreviousTrack => ActionKind::PreviousTrack,
            Action::NextTrack => ActionKind::NextTrack,
            Action::ToggleShuffle => ActionKind::ToggleShuffle,
            Action::Shutdown => ActionKind::Shutdown,
        }
    }

    /// The parameter in its textual, persisted form
    pub fn parameter(&self) -> Option<String> {
        match self {
            Action::ReplaceTracklist { uri } => Some(uri.clone()),
            Action::SetVolume { percent } => Some(percent.to_string()),
            _ => None,
        }
    }

    /// Parse from a kind name and raw parameter
    pub fn from_parts(kind: &str, parameter: Option<&str>) -> Result<Self, ValidationError> {
        ActionKind::from_name(kind)?.validate(parameter)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.parameter() {
            Some(parameter) => write!(f, "{} [{}]", self.kind(), parameter),
            None => write!(f, "{}", self.kind()),
        }
    }
}

/// Flat `{action_kind, parameter}` form of an [`Action`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action_kind: ActionKind,
    pub parameter: Option<String>,
}

impl From<Action> for ActionRecord {
    fn from(action: Action) -> Self {
        Self {
            action_kind: action.kind(),
            parameter: action.parameter(),
        }
    }
}
