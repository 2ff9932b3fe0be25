use std::env;

use super::error::{CouchDaoError, CouchResult};

const BASE_URL_ENV: &str = "COUCH_BASE_URL";
const DATABASE_ENV: &str = "COUCH_DB";
const USERNAME_ENV: &str = "COUCH_USERNAME";
const PASSWORD_ENV: &str = "COUCH_PASSWORD";
const DEFAULT_DATABASE: &str = "cat_battle";

/// Basic-auth pair sent with every request.
#[derive(Debug, Clone)]
pub struct CouchCredentials {
    pub username: String,
    pub password: String,
}

/// Where the room database lives.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    pub base_url: String,
    pub database: String,
    pub credentials: Option<CouchCredentials>,
}

impl CouchConfig {
    /// `COUCH_BASE_URL` is required; `COUCH_DB` defaults to `cat_battle`.
    /// Credentials are only used when both `COUCH_USERNAME` and `COUCH_PASSWORD` are set.
    pub fn from_env() -> CouchResult<Self> {
        let base_url = non_empty_var(BASE_URL_ENV)
            .ok_or(CouchDaoError::MissingEnvVar { var: BASE_URL_ENV })?;
        let database =
            non_empty_var(DATABASE_ENV).unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        let credentials = non_empty_var(USERNAME_ENV)
            .zip(non_empty_var(PASSWORD_ENV))
            .map(|(username, password)| CouchCredentials { username, password });

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            database,
            credentials,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
