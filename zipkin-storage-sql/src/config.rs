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

//! Connection pool configuration.
use std::time::Duration;

/// Configuration for [`crate::SqlStorage`]'s connection pool.
///
/// This is a plain, explicitly-constructed value rather than anything read from the environment
/// inside this crate; reading configuration from environment or file is a concern of the
/// (out-of-scope) CLI/config surface that embeds this store.
#[derive(Debug, Clone)]
pub struct SqlStorageConfig {
    /// The PostgreSQL connection string.
    pub dsn: String,
    /// The maximum number of pooled connections.
    pub max_connections: u32,
    /// How long to wait for a connection to become available before failing with
    /// [`zipkin_storage::StorageError::StorageUnavailable`].
    pub acquire_timeout: Duration,
}

impl SqlStorageConfig {
    /// Creates a configuration with a conservative default pool size and acquire timeout.
    pub fn new(dsn: impl Into<String>) -> SqlStorageConfig {
        SqlStorageConfig {
            dsn: dsn.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the maximum number of pooled connections.
    pub fn max_connections(mut self, max_connections: u32) -> SqlStorageConfig {
        self.max_connections = max_connections;
        self
    }

    /// Sets how long to wait for a connection to become available.
    pub fn acquire_timeout(mut self, acquire_timeout: Duration) -> SqlStorageConfig {
        self.acquire_timeout = acquire_timeout;
        self
    }
}
