//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::state::room::{
    ROOM_CODE_LENGTH, RoomError, check_player_name, check_room_name, is_valid_room_code,
};

/// Validates that a room code is exactly four uppercase letters or digits.
///
/// Lowercase input is rejected rather than normalized.
///
/// ```ignore
/// validate_room_code("AB12") // Ok
/// validate_room_code("ab12") // Err - lowercase
/// validate_room_code("AB1")  // Err - too short
/// ```
pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if is_valid_room_code(code) {
        return Ok(());
    }
    let mut err = ValidationError::new("room_code_format");
    err.message = Some(
        format!("Room code must be exactly {ROOM_CODE_LENGTH} uppercase letters or digits").into(),
    );
    Err(err)
}

/// Validates a player name: non-blank and at most 32 characters.
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    check_player_name(name).map_err(|err| name_error("player_name", err))
}

/// Validates a room display name: non-blank and at most 64 characters.
pub fn validate_room_name(name: &str) -> Result<(), ValidationError> {
    check_room_name(name).map_err(|err| name_error("room_name", err))
}

fn name_error(code: &'static str, err: RoomError) -> ValidationError {
    let mut validation = ValidationError::new(code);
    if let RoomError::InvalidName { reason, .. } = err {
        validation.message = Some(format!("Name {reason}").into());
    }
    validation
}
