use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    routing::post,
};
use validator::Validate;

use crate::{
    dto::room::{RoomResponse, TournamentAction, TournamentRequest},
    error::{AppError, ErrorBody},
    services::tournament_service,
    state::SharedState,
};

/// Tournament room endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/tournament", post(tournament))
        .route(
            "/api/tournament/{code}",
            post(tournament_by_code).get(room_state),
        )
}

/// Perform an action on the room named in the body.
#[utoipa::path(
    post,
    path = "/api/tournament",
    tag = "tournament",
    request_body = TournamentRequest,
    responses(
        (status = 200, description = "Updated room", body = RoomResponse),
        (status = 400, description = "Malformed request or invalid score", body = ErrorBody),
        (status = 403, description = "Caller may not perform this action", body = ErrorBody),
        (status = 404, description = "Room not found", body = ErrorBody),
        (status = 409, description = "Action conflicts with the room state", body = ErrorBody),
        (status = 503, description = "Room store unavailable", body = ErrorBody)
    )
)]
pub async fn tournament(
    State(state): State<SharedState>,
    payload: Result<Json<TournamentRequest>, JsonRejection>,
) -> Result<Json<RoomResponse>, AppError> {
    let Json(request) = payload?;
    request.validate()?;
    let response = tournament_service::perform(&state, &request.code, request.action).await?;
    Ok(Json(response))
}

/// Perform an action on the room named in the path.
#[utoipa::path(
    post,
    path = "/api/tournament/{code}",
    tag = "tournament",
    params(("code" = String, Path, description = "Four-character room code")),
    request_body = TournamentAction,
    responses(
        (status = 200, description = "Updated room", body = RoomResponse),
        (status = 400, description = "Malformed request or invalid score", body = ErrorBody),
        (status = 403, description = "Caller may not perform this action", body = ErrorBody),
        (status = 404, description = "Room not found", body = ErrorBody),
        (status = 409, description = "Action conflicts with the room state", body = ErrorBody),
        (status = 503, description = "Room store unavailable", body = ErrorBody)
    )
)]
pub async fn tournament_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    payload: Result<Json<TournamentAction>, JsonRejection>,
) -> Result<Json<RoomResponse>, AppError> {
    let Json(action) = payload?;
    let request = TournamentRequest { code, action };
    request.validate()?;
    let response = tournament_service::perform(&state, &request.code, request.action).await?;
    Ok(Json(response))
}

/// Current room state with its leaderboard.
#[utoipa::path(
    get,
    path = "/api/tournament/{code}",
    tag = "tournament",
    params(("code" = String, Path, description = "Four-character room code")),
    responses(
        (status = 200, description = "Room state", body = RoomResponse),
        (status = 400, description = "Malformed room code", body = ErrorBody),
        (status = 404, description = "Room not found", body = ErrorBody),
        (status = 503, description = "Room store unavailable", body = ErrorBody)
    )
)]
pub async fn room_state(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<RoomResponse>, AppError> {
    let response = tournament_service::perform(&state, &code, TournamentAction::GetState).await?;
    Ok(Json(response))
}
