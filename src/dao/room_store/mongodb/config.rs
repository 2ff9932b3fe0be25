use std::env;

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const URI_ENV: &str = "MONGO_URI";
const DATABASE_ENV: &str = "MONGO_DB";
const DEFAULT_DATABASE: &str = "cat_battle";

/// Parsed client options plus the database holding the `rooms` collection.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// `MONGO_URI` is required; `MONGO_DB` defaults to `cat_battle`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = env::var(URI_ENV)
            .ok()
            .filter(|uri| !uri.trim().is_empty())
            .ok_or(MongoDaoError::MissingEnvVar { var: URI_ENV })?;
        let database_name = env::var(DATABASE_ENV)
            .ok()
            .filter(|db| !db.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());

        let parsed = ClientOptions::parse(&uri).await;
        let options = parsed.map_err(|source| MongoDaoError::InvalidUri { uri, source })?;

        Ok(Self {
            options,
            database_name,
        })
    }
}
