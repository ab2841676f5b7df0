//! # SQLite database methods
//!
//! Low-level SQLite interactions for the checkout repository.
//!
//! These are plain functions that accept a `&mut SqliteConnection`. Callers can pass a pooled connection, or
//! `&mut tx` to run several of them inside one atomic transaction.
use std::env;

use log::info;
use sqlx::{sqlite::SqlitePoolOptions, Error as SqlxError, SqlitePool};

use crate::traits::RepositoryError;

pub mod orders;
pub mod payments;

const SQLITE_DB_URL: &str = "sqlite://data/checkout_store.db";

pub fn db_url() -> String {
    let result = env::var("CHECKOUT_DATABASE_URL").unwrap_or_else(|_| {
        info!("🗃️ CHECKOUT_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("🗃️ Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect(url).await?;
    Ok(pool)
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(column: &str, json: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(json).map_err(|e| RepositoryError::CodecError(format!("Column {column}: {e}")))
}

pub(crate) fn parse<T>(column: &str, value: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse::<T>().map_err(|e| RepositoryError::CodecError(format!("Column {column}: {e}")))
}
