//  Copyright 2017 Palantir Technologies, Inc.
//
//  Licensed under the Apache License, Version 2.0 (the "License");
//  you may not use this file except in compliance with the License.
//  You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.

//! The error type shared by every span store backend.
use thiserror::Error;

/// An error returned from a [`crate::SpanStore`] operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The request was malformed: a negative limit, a missing required service name, and the
    /// like.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The backend is transiently unavailable (connection refused, pool timeout). Callers may
    /// retry.
    #[error("storage unavailable")]
    StorageUnavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
    /// The backend returned data that does not match the expected schema or state.
    #[error("storage corrupt: {0}")]
    StorageCorrupt(String),
    /// The caller's context was cancelled before the operation completed.
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(feature = "sql")]
impl From<sqlx::Error> for StorageError {
    /// Classifies a driver error as transient (`StorageUnavailable`) or a schema/state mismatch
    /// (`StorageCorrupt`).
    fn from(err: sqlx::Error) -> StorageError {
        match err {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StorageError::StorageUnavailable(Box::new(err))
            }
            sqlx::Error::Database(ref db_err) if db_err.code().is_none() => {
                StorageError::StorageUnavailable(Box::new(err))
            }
            sqlx::Error::RowNotFound => StorageError::StorageCorrupt("row not found".to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::TypeNotFound { .. } => {
                StorageError::StorageCorrupt(err.to_string())
            }
            other => StorageError::StorageUnavailable(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_carries_message() {
        let err = StorageError::BadRequest("limit must be at least 1".to_string());
        assert_eq!(err.to_string(), "bad request: limit must be at least 1");
    }
}
