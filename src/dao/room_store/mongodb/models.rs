use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::RoomEntity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    /// Random token replaced on every write; compared on conditional replaces.
    pub revision: String,
    #[serde(flatten)]
    pub room: RoomEntity,
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(room: RoomEntity) -> Self {
        Self {
            id: room.code.clone(),
            revision: Uuid::new_v4().to_string(),
            room,
        }
    }
}

pub fn by_code(code: &str) -> Document {
    doc! {"_id": code}
}

pub fn by_code_and_revision(code: &str, revision: &str) -> Document {
    doc! {"_id": code, "revision": revision}
}
