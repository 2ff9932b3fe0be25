use serde::{Deserialize, Serialize};

use crate::dao::{
    models::RoomEntity,
    room_store::{Revision, WriteCondition},
};

pub const ROOM_PREFIX: &str = "room::";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl From<(RoomEntity, Option<String>)> for CouchRoomDocument {
    fn from((room, rev): (RoomEntity, Option<String>)) -> Self {
        Self {
            id: room_doc_id(&room.code),
            rev,
            room,
        }
    }
}

/// Body returned by CouchDB after a successful document write.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

pub fn room_doc_id(code: &str) -> String {
    format!("{}{}", ROOM_PREFIX, code)
}

/// Room code a document id was derived from.
pub fn room_code(doc_id: &str) -> &str {
    doc_id.strip_prefix(ROOM_PREFIX).unwrap_or(doc_id)
}

/// `_rev` to send with a PUT.
///
/// Without a `_rev` CouchDB refuses to replace an existing document, so an
/// unconditional write is treated like a create and never blindly overwrites.
pub fn put_revision(condition: WriteCondition) -> Option<String> {
    match condition {
        WriteCondition::Revision(Revision(rev)) => Some(rev),
        WriteCondition::Absent | WriteCondition::Unconditional => None,
    }
}
