//! Persistence errors

use scylla::transport::errors::{NewSessionError, QueryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Schema error: {0}")]
    SchemaError(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<NewSessionError> for PersistenceError {
    fn from(err: NewSessionError) -> Self {
        PersistenceError::Connection(err.to_string())
    }
}

impl From<QueryError> for PersistenceError {
    fn from(err: QueryError) -> Self {
        PersistenceError::Query(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::InvalidData(err.to_string())
    }
}
