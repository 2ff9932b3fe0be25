use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures of the MongoDB room backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("invalid MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB did not answer after {attempts} ping(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB health ping failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    /// A find or replace on the `rooms` collection failed.
    #[error("failed to {operation} room `{code}`")]
    RoomQuery {
        operation: &'static str,
        code: String,
        #[source]
        source: MongoError,
    },
    /// The stored document exists but does not decode as a room.
    #[error("room `{code}` is stored in an unreadable shape: {reason}")]
    CorruptedDocument { code: String, reason: String },
    /// The filtered write matched nothing, or the insert hit an existing `_id`.
    #[error("room `{code}` changed since it was read")]
    RevisionConflict { code: String },
}
