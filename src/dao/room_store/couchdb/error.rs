use reqwest::StatusCode;
use thiserror::Error;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures talking to CouchDB. `target` is the database or document URL path involved.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build CouchDB HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB request to `{target}` failed")]
    Transport {
        target: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} for `{target}`")]
    UnexpectedStatus { target: String, status: StatusCode },
    /// 409 on a PUT: the `_rev` sent is stale, or the document already exists.
    #[error("CouchDB revision conflict on `{doc_id}`")]
    RevisionConflict { doc_id: String },
    /// A stored room document exists but does not decode as a room.
    #[error("CouchDB document `{doc_id}` is not a valid room")]
    CorruptedDocument {
        doc_id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not decode CouchDB response from `{target}`")]
    Decode {
        target: String,
        #[source]
        source: reqwest::Error,
    },
}

impl CouchDaoError {
    pub(super) fn transport(target: &str) -> impl FnOnce(reqwest::Error) -> Self + '_ {
        move |source| CouchDaoError::Transport {
            target: target.to_owned(),
            source,
        }
    }

    pub(super) fn decode(target: &str) -> impl FnOnce(reqwest::Error) -> Self + '_ {
        move |source| CouchDaoError::Decode {
            target: target.to_owned(),
            source,
        }
    }
}
