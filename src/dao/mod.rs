/// Persisted room record definitions.
pub mod models;
/// Room storage backends.
pub mod room_store;
/// Storage abstraction layer for database operations.
pub mod storage;
