//! Record-mode policy

use std::fmt;

use serde::{Deserialize, Serialize};

/// Policy governing when live traffic is allowed and when new interactions
/// may be persisted.
///
/// The mode is fixed for the lifetime of one load/use/save cycle. Exactly
/// two decision points consult it: `can_play_response_for` (via
/// [`RecordMode::allows_playback`]) and `write_protected` (via
/// [`RecordMode::allows_recording`]).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordMode {
    /// Replay matches; record only when the file did not exist before this
    /// session. After the first successful record pass the file is
    /// append-proof forever.
    #[default]
    Once,
    /// Replay matches and record unmatched requests without disturbing
    /// existing interactions
    NewEpisodes,
    /// Never serve from the cassette; record everything
    All,
    /// Replay only; recording is always forbidden
    None,
}

impl RecordMode {
    /// Whether this mode permits replaying existing matches.
    ///
    /// Every mode except `All` does; `All` forces live traffic even when a
    /// match exists.
    #[must_use]
    pub fn allows_playback(self) -> bool {
        !matches!(self, Self::All)
    }

    /// Whether this mode permits adding a new interaction, given whether
    /// the cassette file existed before this session
    #[must_use]
    pub fn allows_recording(self, cassette_existed: bool) -> bool {
        match self {
            Self::Once => !cassette_existed,
            Self::NewEpisodes | Self::All => true,
            Self::None => false,
        }
    }

    /// Stable lowercase name, as used in configuration files
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::NewEpisodes => "new_episodes",
            Self::All => "all",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RecordMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
