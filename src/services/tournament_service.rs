use crate::{
    dto::room::{RoomResponse, TournamentAction},
    error::ServiceError,
    services::room_service,
    state::SharedState,
};

/// Dispatch one tournament action to the room service and project the result.
pub async fn perform(
    state: &SharedState,
    code: &str,
    action: TournamentAction,
) -> Result<RoomResponse, ServiceError> {
    let with_leaderboard = action.includes_leaderboard();
    let room = match action {
        TournamentAction::Create { host, name } => {
            room_service::create_room(state, code, &host, name.as_deref()).await?
        }
        TournamentAction::Join { player_name } => {
            room_service::join_room(state, code, &player_name).await?
        }
        TournamentAction::Start { player_name } => {
            room_service::start_room(state, code, &player_name).await?
        }
        TournamentAction::SubmitScore { player_name, score } => {
            room_service::submit_score(state, code, &player_name, score).await?
        }
        TournamentAction::GetState => room_service::get_room(state, code).await?,
    };

    Ok(RoomResponse::new(&room, with_leaderboard))
}
