/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Optimistic load/validate/write cycle for room operations.
pub mod room_service;
/// Background connection and health supervision of the room store.
pub mod storage_supervisor;
/// Mapping of tournament actions onto room operations.
pub mod tournament_service;
