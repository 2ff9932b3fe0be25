use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::state::{
    room::{Room, RoomError, RoomParts},
    state_machine::RoomStatus,
};

/// Persisted room record, one per room code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoomEntity {
    /// Room code, also the storage key.
    pub code: String,
    /// Player who created the room.
    pub host: String,
    /// Display label.
    pub name: String,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Players in join order.
    pub players: Vec<String>,
    /// Recorded score per player, in join order.
    pub scores: IndexMap<String, f64>,
    /// Whether each player has submitted a score.
    pub played: IndexMap<String, bool>,
    /// Set when the host starts the room.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub started_at: Option<OffsetDateTime>,
    /// Set when the last player submits.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub finished_at: Option<OffsetDateTime>,
}

impl From<Room> for RoomEntity {
    fn from(room: Room) -> Self {
        let parts = room.into_parts();
        Self {
            code: parts.code,
            host: parts.host,
            name: parts.name,
            status: parts.status,
            players: parts.players,
            scores: parts.scores,
            played: parts.played,
            started_at: parts.started_at,
            finished_at: parts.finished_at,
        }
    }
}

impl TryFrom<RoomEntity> for Room {
    type Error = RoomError;

    fn try_from(entity: RoomEntity) -> Result<Self, Self::Error> {
        Room::restore(RoomParts {
            code: entity.code,
            host: entity.host,
            name: entity.name,
            status: entity.status,
            players: entity.players,
            scores: entity.scores,
            played: entity.played,
            started_at: entity.started_at,
            finished_at: entity.finished_at,
        })
    }
}
