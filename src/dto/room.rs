//! Request and response payloads of the tournament API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        format_offset_time,
        validation::{validate_player_name, validate_room_code, validate_room_name},
    },
    state::{leaderboard::Standing, room::Room, state_machine::RoomStatus},
};

/// Request addressing a room by code in the body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TournamentRequest {
    /// Four-character room code.
    #[schema(example = "AB12")]
    pub code: String,
    #[serde(flatten)]
    pub action: TournamentAction,
}

/// Action to perform on a room, selected by the `action` field.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TournamentAction {
    /// Create a new room hosted by `host`.
    Create {
        host: String,
        #[serde(default)]
        name: Option<String>,
    },
    /// Join a waiting room.
    Join {
        #[serde(rename = "playerName")]
        player_name: String,
    },
    /// Start the room; only the host may do this.
    Start {
        #[serde(rename = "playerName", alias = "host")]
        player_name: String,
    },
    /// Submit a score for a started room.
    SubmitScore {
        #[serde(rename = "playerName")]
        player_name: String,
        score: f64,
    },
    /// Read the room without changing it.
    GetState,
}

impl TournamentAction {
    /// Whether the response should carry the leaderboard.
    pub fn includes_leaderboard(&self) -> bool {
        matches!(
            self,
            TournamentAction::SubmitScore { .. } | TournamentAction::GetState
        )
    }
}

impl Validate for TournamentAction {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match self {
            TournamentAction::Create { host, name } => {
                if let Err(e) = validate_player_name(host) {
                    errors.add("host", e);
                }
                if let Some(Err(e)) = name.as_deref().map(validate_room_name) {
                    errors.add("name", e);
                }
            }
            TournamentAction::Join { player_name }
            | TournamentAction::Start { player_name }
            | TournamentAction::SubmitScore { player_name, .. } => {
                if let Err(e) = validate_player_name(player_name) {
                    errors.add("playerName", e);
                }
            }
            TournamentAction::GetState => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl Validate for TournamentRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.action.validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };
        if let Err(e) = validate_room_code(&self.code) {
            errors.add("code", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Public projection of a room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub code: String,
    pub name: String,
    pub host: String,
    pub status: RoomStatus,
    /// Players in join order.
    pub players: Vec<String>,
    /// RFC 3339 timestamp of the start, once started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// RFC 3339 timestamp of the last submission, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
}

impl From<&Room> for RoomView {
    fn from(room: &Room) -> Self {
        Self {
            code: room.code().to_string(),
            name: room.name().to_owned(),
            host: room.host().to_owned(),
            status: room.status(),
            players: room.players().to_vec(),
            started_at: room.started_at().map(format_offset_time),
            finished_at: room.finished_at().map(format_offset_time),
        }
    }
}

/// One leaderboard row.
#[derive(Debug, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position; ties still get distinct ranks.
    pub rank: usize,
    pub name: String,
    pub score: f64,
}

impl From<Standing> for LeaderboardEntry {
    fn from(standing: Standing) -> Self {
        Self {
            rank: standing.rank,
            name: standing.name,
            score: standing.score,
        }
    }
}

/// Response returned by every tournament action.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomResponse {
    pub room: RoomView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
}

impl RoomResponse {
    /// Project `room`, computing the leaderboard when asked to.
    pub fn new(room: &Room, with_leaderboard: bool) -> Self {
        Self {
            room: RoomView::from(room),
            leaderboard: with_leaderboard.then(|| {
                room.leaderboard()
                    .into_iter()
                    .map(LeaderboardEntry::from)
                    .collect()
            }),
        }
    }
}
