//! Tournament room aggregate and the rules guarding every mutation.

use std::{collections::HashSet, fmt, str::FromStr};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::state::state_machine::{InvalidTransition, RoomEvent, RoomStatus};

/// Number of characters in a room code.
pub const ROOM_CODE_LENGTH: usize = 4;
/// Upper bound for player names, in characters.
pub const MAX_PLAYER_NAME_CHARS: usize = 32;
/// Upper bound for room display names, in characters.
pub const MAX_ROOM_NAME_CHARS: usize = 64;

/// Short room identifier, also used as the storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    /// Validate `value` as a room code without normalizing it.
    pub fn parse(value: &str) -> Result<Self, RoomError> {
        if is_valid_room_code(value) {
            Ok(Self(value.to_owned()))
        } else {
            Err(RoomError::InvalidCode(value.to_owned()))
        }
    }

    /// Borrow the raw code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Exactly [`ROOM_CODE_LENGTH`] uppercase ASCII letters or digits.
pub fn is_valid_room_code(value: &str) -> bool {
    value.len() == ROOM_CODE_LENGTH
        && value
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

/// Check that a player name is non-blank and short enough.
pub fn check_player_name(name: &str) -> Result<(), RoomError> {
    check_display_string(name, MAX_PLAYER_NAME_CHARS)
        .map_err(|reason| RoomError::InvalidName { name: name.to_owned(), reason })
}

/// Check that a room display name is non-blank and short enough.
pub fn check_room_name(name: &str) -> Result<(), RoomError> {
    check_display_string(name, MAX_ROOM_NAME_CHARS)
        .map_err(|reason| RoomError::InvalidName { name: name.to_owned(), reason })
}

fn check_display_string(value: &str, max_chars: usize) -> Result<(), &'static str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("must not be blank");
    }
    if trimmed.chars().count() > max_chars {
        return Err("is too long");
    }
    Ok(())
}

/// How repeated score submissions by the same player are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
    /// Each player submits exactly once; a second submission is rejected.
    #[default]
    SingleAttempt,
    /// Players may resubmit while the room is started; the best score is kept.
    BestOfMany,
}

/// Room rules that do not belong to any single room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomRules {
    /// Minimum number of players required before the host may start.
    pub min_players: usize,
    /// Policy applied to repeated score submissions.
    pub score_policy: ScorePolicy,
}

impl Default for RoomRules {
    fn default() -> Self {
        Self {
            min_players: 2,
            score_policy: ScorePolicy::SingleAttempt,
        }
    }
}

/// Rule violations raised while validating or mutating a room.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoomError {
    /// Room code does not have the expected shape.
    #[error("invalid room code `{0}`: expected {ROOM_CODE_LENGTH} uppercase letters or digits")]
    InvalidCode(String),
    /// Display name is blank or too long.
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: &'static str },
    /// Operation is not allowed in the current status.
    #[error("cannot {operation} while room is {status}")]
    InvalidState {
        operation: &'static str,
        status: RoomStatus,
    },
    /// Another player already uses this name (ignoring case).
    #[error("player name `{name}` is already taken by `{existing}`")]
    DuplicateName { name: String, existing: String },
    /// Only the host may start the room.
    #[error("`{requester}` is not the host of this room")]
    Forbidden { requester: String },
    /// Not enough players to start.
    #[error("at least {required} players are required to start (got {actual})")]
    InsufficientPlayers { required: usize, actual: usize },
    /// Submitting player has not joined the room.
    #[error("`{name}` is not a player in this room")]
    NotAPlayer { name: String },
    /// Player already submitted their score.
    #[error("`{name}` has already submitted a score")]
    AlreadyPlayed { name: String },
    /// Score is negative, NaN or infinite.
    #[error("invalid score {score}: expected a finite non-negative number")]
    InvalidScore { score: f64 },
    /// A persisted record breaks the room invariants.
    #[error("room `{code}` is corrupted: {reason}")]
    CorruptedRecord { code: String, reason: String },
}

impl RoomError {
    fn from_transition(operation: &'static str, err: InvalidTransition) -> Self {
        RoomError::InvalidState {
            operation,
            status: err.from,
        }
    }
}

/// Outcome of a mutating operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// The room changed and must be persisted.
    Changed,
    /// The request was absorbed without changing the room.
    Unchanged,
}

/// Persistent state of a single tournament room.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    code: RoomCode,
    host: String,
    name: String,
    status: RoomStatus,
    players: Vec<String>,
    scores: IndexMap<String, f64>,
    played: IndexMap<String, bool>,
    started_at: Option<OffsetDateTime>,
    finished_at: Option<OffsetDateTime>,
}

/// Raw room fields, used to rebuild a [`Room`] from storage.
#[derive(Debug, Clone)]
pub struct RoomParts {
    /// Room code, unvalidated.
    pub code: String,
    /// Creator of the room; must also appear in `players`.
    pub host: String,
    /// Display name.
    pub name: String,
    /// Lifecycle phase.
    pub status: RoomStatus,
    /// Players in join order.
    pub players: Vec<String>,
    /// Score per player, same keys as `players`.
    pub scores: IndexMap<String, f64>,
    /// Whether each player has submitted, same keys as `players`.
    pub played: IndexMap<String, bool>,
    /// Set when the host started play.
    pub started_at: Option<OffsetDateTime>,
    /// Set when the last score came in.
    pub finished_at: Option<OffsetDateTime>,
}

impl Room {
    /// Build a brand-new room with the host as its only player.
    pub fn create(code: RoomCode, host: &str, name: &str) -> Result<Self, RoomError> {
        check_player_name(host)?;
        check_room_name(name)?;

        let host = host.to_owned();
        Ok(Self {
            code,
            name: name.to_owned(),
            status: RoomStatus::Waiting,
            players: vec![host.clone()],
            scores: IndexMap::from([(host.clone(), 0.0)]),
            played: IndexMap::from([(host.clone(), false)]),
            host,
            started_at: None,
            finished_at: None,
        })
    }

    /// Rebuild a room from stored fields, rejecting records that break the invariants.
    pub fn restore(parts: RoomParts) -> Result<Self, RoomError> {
        let code = RoomCode::parse(&parts.code).map_err(|_| RoomError::CorruptedRecord {
            code: parts.code.clone(),
            reason: "malformed room code".into(),
        })?;
        let room = Self {
            code,
            host: parts.host,
            name: parts.name,
            status: parts.status,
            players: parts.players,
            scores: parts.scores,
            played: parts.played,
            started_at: parts.started_at,
            finished_at: parts.finished_at,
        };
        room.check_consistency()?;
        Ok(room)
    }

    /// Decompose the room into its raw fields.
    pub fn into_parts(self) -> RoomParts {
        RoomParts {
            code: self.code.0,
            host: self.host,
            name: self.name,
            status: self.status,
            players: self.players,
            scores: self.scores,
            played: self.played,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }

    /// Code the room is stored under.
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Player who created the room; the only one allowed to start it.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Display name of the room.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle phase.
    pub fn status(&self) -> RoomStatus {
        self.status
    }

    /// Players in join order.
    pub fn players(&self) -> &[String] {
        &self.players
    }

    /// Recorded scores in join order.
    pub fn scores(&self) -> &IndexMap<String, f64> {
        &self.scores
    }

    /// Whether `name` has submitted a score. Unknown names have not.
    pub fn has_played(&self, name: &str) -> bool {
        self.played.get(name).copied().unwrap_or(false)
    }

    /// When the host started play, if it has.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        self.started_at
    }

    /// When the last score was recorded, if the room is finished.
    pub fn finished_at(&self) -> Option<OffsetDateTime> {
        self.finished_at
    }

    /// Add a player while the room is waiting.
    ///
    /// Joining again under the exact same name is a no-op so clients can retry.
    pub fn join(&mut self, player: &str) -> Result<Mutation, RoomError> {
        check_player_name(player)?;

        if !self.status.is_joinable() {
            return Err(RoomError::InvalidState {
                operation: "join",
                status: self.status,
            });
        }

        if self.players.iter().any(|existing| existing == player) {
            return Ok(Mutation::Unchanged);
        }

        if let Some(existing) = self
            .players
            .iter()
            .find(|existing| existing.eq_ignore_ascii_case(player))
        {
            return Err(RoomError::DuplicateName {
                name: player.to_owned(),
                existing: existing.clone(),
            });
        }

        self.players.push(player.to_owned());
        self.scores.insert(player.to_owned(), 0.0);
        self.played.insert(player.to_owned(), false);
        Ok(Mutation::Changed)
    }

    /// Start play on behalf of `requester`, freezing the player list.
    pub fn start(
        &mut self,
        requester: &str,
        rules: &RoomRules,
        now: OffsetDateTime,
    ) -> Result<Mutation, RoomError> {
        if requester != self.host {
            return Err(RoomError::Forbidden {
                requester: requester.to_owned(),
            });
        }

        let next = self
            .status
            .transition(RoomEvent::Start)
            .map_err(|err| RoomError::from_transition("start", err))?;

        if self.players.len() < rules.min_players {
            return Err(RoomError::InsufficientPlayers {
                required: rules.min_players,
                actual: self.players.len(),
            });
        }

        self.status = next;
        self.started_at = Some(now);
        Ok(Mutation::Changed)
    }

    /// Record a score for `player` and finish the room once everyone has played.
    pub fn submit_score(
        &mut self,
        player: &str,
        score: f64,
        rules: &RoomRules,
        now: OffsetDateTime,
    ) -> Result<Mutation, RoomError> {
        if !score.is_finite() || score < 0.0 {
            return Err(RoomError::InvalidScore { score });
        }

        if !self.status.accepts_scores() {
            return Err(RoomError::InvalidState {
                operation: "submit a score",
                status: self.status,
            });
        }

        let Some(current) = self.scores.get(player).copied() else {
            return Err(RoomError::NotAPlayer {
                name: player.to_owned(),
            });
        };

        if self.has_played(player) {
            return match rules.score_policy {
                ScorePolicy::SingleAttempt => Err(RoomError::AlreadyPlayed {
                    name: player.to_owned(),
                }),
                ScorePolicy::BestOfMany if score > current => {
                    self.scores.insert(player.to_owned(), score);
                    Ok(Mutation::Changed)
                }
                ScorePolicy::BestOfMany => Ok(Mutation::Unchanged),
            };
        }

        self.scores.insert(player.to_owned(), score);
        self.played.insert(player.to_owned(), true);

        if self.players.iter().all(|name| self.has_played(name)) {
            self.status = self
                .status
                .transition(RoomEvent::AllPlayed)
                .map_err(|err| RoomError::from_transition("finish", err))?;
            self.finished_at = Some(now);
        }

        Ok(Mutation::Changed)
    }

    /// Verify that players, scores and played describe the same set of names.
    pub fn check_consistency(&self) -> Result<(), RoomError> {
        let corrupted = |reason: String| RoomError::CorruptedRecord {
            code: self.code.to_string(),
            reason,
        };

        let mut seen = HashSet::with_capacity(self.players.len());
        for player in &self.players {
            if !seen.insert(player.as_str()) {
                return Err(corrupted(format!("duplicate player `{player}`")));
            }
        }

        if !seen.contains(self.host.as_str()) {
            return Err(corrupted(format!("host `{}` is not a player", self.host)));
        }

        let scored = self.scores.keys().map(String::as_str).collect::<HashSet<_>>();
        if scored != seen {
            return Err(corrupted("scores do not match players".into()));
        }

        let flagged = self.played.keys().map(String::as_str).collect::<HashSet<_>>();
        if flagged != seen {
            return Err(corrupted("played flags do not match players".into()));
        }

        match self.status {
            RoomStatus::Waiting if self.played.values().any(|played| *played) => {
                Err(corrupted("scores submitted before start".into()))
            }
            RoomStatus::Finished if self.played.values().any(|played| !played) => {
                Err(corrupted("finished with players still to play".into()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(value: &str) -> RoomCode {
        RoomCode::parse(value).unwrap()
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH
    }

    fn started_room(players: &[&str]) -> Room {
        let mut room = Room::create(code("ABCD"), players[0], "Cat Battle").unwrap();
        for player in &players[1..] {
            room.join(player).unwrap();
        }
        room.start(players[0], &RoomRules::default(), now()).unwrap();
        room
    }

    fn assert_key_sets_match(room: &Room) {
        room.check_consistency().unwrap();
        assert_eq!(room.players.len(), room.scores.len());
        assert_eq!(room.players.len(), room.played.len());
    }

    #[test]
    fn room_codes_are_validated_not_normalized() {
        assert!(RoomCode::parse("AB12").is_ok());
        assert!(RoomCode::parse("ab12").is_err());
        assert!(RoomCode::parse("AB1").is_err());
        assert!(RoomCode::parse("AB123").is_err());
        assert!(RoomCode::parse(" AB1").is_err());
        assert!(RoomCode::parse("ÄB12").is_err());
    }

    #[test]
    fn create_seeds_host() {
        let room = Room::create(code("CATS"), "alice", "Alice's Cat Battle").unwrap();
        assert_eq!(room.status(), RoomStatus::Waiting);
        assert_eq!(room.players(), ["alice"]);
        assert_eq!(room.scores().get("alice"), Some(&0.0));
        assert!(!room.has_played("alice"));
        assert!(room.started_at().is_none());
        assert_key_sets_match(&room);
    }

    #[test]
    fn create_rejects_blank_host() {
        let err = Room::create(code("CATS"), "  ", "Battle").unwrap_err();
        assert!(matches!(err, RoomError::InvalidName { .. }));
    }

    #[test]
    fn join_appends_and_is_idempotent() {
        let mut room = Room::create(code("CATS"), "alice", "Battle").unwrap();
        assert_eq!(room.join("bob").unwrap(), Mutation::Changed);
        assert_eq!(room.join("bob").unwrap(), Mutation::Unchanged);
        assert_eq!(room.players(), ["alice", "bob"]);
        assert_key_sets_match(&room);
    }

    #[test]
    fn join_rejects_case_insensitive_collision() {
        let mut room = Room::create(code("CATS"), "alice", "Battle").unwrap();
        let err = room.join("Alice").unwrap_err();
        assert_eq!(
            err,
            RoomError::DuplicateName {
                name: "Alice".into(),
                existing: "alice".into()
            }
        );
    }

    #[test]
    fn join_after_start_fails_even_for_members() {
        let mut room = started_room(&["alice", "bob"]);
        for name in ["carol", "bob"] {
            let err = room.join(name).unwrap_err();
            assert!(matches!(
                err,
                RoomError::InvalidState {
                    status: RoomStatus::Started,
                    ..
                }
            ));
        }
    }

    #[test]
    fn start_requires_host() {
        let mut room = Room::create(code("CATS"), "alice", "Battle").unwrap();
        room.join("bob").unwrap();
        let err = room.start("bob", &RoomRules::default(), now()).unwrap_err();
        assert_eq!(
            err,
            RoomError::Forbidden {
                requester: "bob".into()
            }
        );
        assert_eq!(room.status(), RoomStatus::Waiting);
    }

    #[test]
    fn start_requires_minimum_players() {
        let mut room = Room::create(code("CATS"), "alice", "Battle").unwrap();
        let err = room
            .start("alice", &RoomRules::default(), now())
            .unwrap_err();
        assert_eq!(
            err,
            RoomError::InsufficientPlayers {
                required: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn start_twice_is_invalid_state() {
        let mut room = started_room(&["alice", "bob"]);
        let err = room
            .start("alice", &RoomRules::default(), now())
            .unwrap_err();
        assert!(matches!(err, RoomError::InvalidState { operation: "start", .. }));
        assert_eq!(room.started_at(), Some(now()));
    }

    #[test]
    fn last_submission_finishes_room() {
        let mut room = started_room(&["A", "B"]);
        let rules = RoomRules::default();

        room.submit_score("A", 50.0, &rules, now()).unwrap();
        assert_eq!(room.status(), RoomStatus::Started);
        assert!(room.finished_at().is_none());

        room.submit_score("B", 80.0, &rules, now()).unwrap();
        assert_eq!(room.status(), RoomStatus::Finished);
        assert_eq!(room.finished_at(), Some(now()));
        assert_key_sets_match(&room);
    }

    #[test]
    fn second_submission_is_rejected_and_changes_nothing() {
        let mut room = started_room(&["A", "B", "C"]);
        let rules = RoomRules::default();
        room.submit_score("A", 50.0, &rules, now()).unwrap();
        let before = room.clone();

        let err = room.submit_score("A", 90.0, &rules, now()).unwrap_err();
        assert_eq!(err, RoomError::AlreadyPlayed { name: "A".into() });
        assert_eq!(room, before);
    }

    #[test]
    fn best_of_many_keeps_maximum() {
        let mut room = started_room(&["A", "B", "C"]);
        let rules = RoomRules {
            score_policy: ScorePolicy::BestOfMany,
            ..RoomRules::default()
        };
        room.submit_score("A", 50.0, &rules, now()).unwrap();
        assert_eq!(
            room.submit_score("A", 20.0, &rules, now()).unwrap(),
            Mutation::Unchanged
        );
        assert_eq!(
            room.submit_score("A", 70.0, &rules, now()).unwrap(),
            Mutation::Changed
        );
        assert_eq!(room.scores().get("A"), Some(&70.0));
        assert_eq!(room.status(), RoomStatus::Started);
    }

    #[test]
    fn submission_checks_score_then_state_then_membership() {
        let rules = RoomRules::default();
        let mut waiting = Room::create(code("CATS"), "alice", "Battle").unwrap();
        assert!(matches!(
            waiting.submit_score("alice", -1.0, &rules, now()),
            Err(RoomError::InvalidScore { .. })
        ));
        assert!(matches!(
            waiting.submit_score("alice", f64::NAN, &rules, now()),
            Err(RoomError::InvalidScore { .. })
        ));
        assert!(matches!(
            waiting.submit_score("nobody", 1.0, &rules, now()),
            Err(RoomError::InvalidState { .. })
        ));

        let mut started = started_room(&["alice", "bob"]);
        assert_eq!(
            started.submit_score("nobody", 1.0, &rules, now()),
            Err(RoomError::NotAPlayer {
                name: "nobody".into()
            })
        );
    }

    #[test]
    fn finished_room_rejects_scores() {
        let mut room = started_room(&["A", "B"]);
        let rules = RoomRules::default();
        room.submit_score("A", 1.0, &rules, now()).unwrap();
        room.submit_score("B", 2.0, &rules, now()).unwrap();
        assert!(matches!(
            room.submit_score("A", 3.0, &rules, now()),
            Err(RoomError::InvalidState {
                status: RoomStatus::Finished,
                ..
            })
        ));
    }

    #[test]
    fn restore_rejects_inconsistent_records() {
        let mut parts = started_room(&["A", "B"]).into_parts();
        parts.played.shift_remove("B");
        let err = Room::restore(parts).unwrap_err();
        assert!(matches!(err, RoomError::CorruptedRecord { .. }));

        let mut parts = started_room(&["A", "B"]).into_parts();
        parts.players.push("A".into());
        assert!(Room::restore(parts).is_err());

        let mut parts = started_room(&["A", "B"]).into_parts();
        parts.host = "Z".into();
        assert!(Room::restore(parts).is_err());
    }

    #[test]
    fn restore_round_trips_valid_room() {
        let room = started_room(&["A", "B"]);
        let restored = Room::restore(room.clone().into_parts()).unwrap();
        assert_eq!(restored, room);
    }
}
