use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Cat Battle Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::tournament::tournament,
        crate::routes::tournament::tournament_by_code,
        crate::routes::tournament::room_state,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::room::TournamentRequest,
            crate::dto::room::TournamentAction,
            crate::dto::room::RoomResponse,
            crate::dto::room::RoomView,
            crate::dto::room::LeaderboardEntry,
            crate::state::state_machine::RoomStatus,
            crate::error::ErrorBody,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "tournament", description = "Tournament room lifecycle"),
    )
)]
pub struct ApiDoc;
