use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle status of a tournament room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Room accepts joins and waits for the host to start it.
    Waiting,
    /// Play is underway; players submit their scores.
    Started,
    /// Every player has submitted; the room is read-only.
    Finished,
}

/// Events that move a room forward through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomEvent {
    /// Host triggers the start of play.
    Start,
    /// The last outstanding player submitted a score.
    AllPlayed,
}

/// Error returned when an event cannot be applied from the current status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from}")]
pub struct InvalidTransition {
    /// Status the room was in when the event was received.
    pub from: RoomStatus,
    /// The rejected event.
    pub event: RoomEvent,
}

impl RoomStatus {
    /// Whether players may still join.
    pub fn is_joinable(self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Whether score submissions are accepted.
    pub fn accepts_scores(self) -> bool {
        matches!(self, Self::Started)
    }

    /// Compute the status reached by applying `event`, if the transition is legal.
    ///
    /// Status only ever moves forward and `finished` is reachable solely through
    /// [`RoomEvent::AllPlayed`].
    pub fn transition(self, event: RoomEvent) -> Result<RoomStatus, InvalidTransition> {
        match (self, event) {
            (Self::Waiting, RoomEvent::Start) => Ok(Self::Started),
            (Self::Started, RoomEvent::AllPlayed) => Ok(Self::Finished),
            (from, event) => Err(InvalidTransition { from, event }),
        }
    }
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
        }
    }
}
