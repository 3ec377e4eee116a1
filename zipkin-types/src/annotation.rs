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

//! Annotations.
use crate::Endpoint;

/// The client sent a request to a server.
pub const CLIENT_SEND: &str = "cs";
/// The client received a response from a server.
pub const CLIENT_RECV: &str = "cr";
/// The server received a request from a client.
pub const SERVER_RECV: &str = "sr";
/// The server sent a response to a client.
pub const SERVER_SEND: &str = "ss";
/// The value used by instrumentation and dependency aggregation to flag a failed span.
pub const ERROR: &str = "error";

/// Associates an event that explains latency with a timestamp.
///
/// Unlike log statements, annotations are short codes, e.g. `"cs"` for "client send". The four
/// core RPC annotations (`cs`/`cr`/`sr`/`ss`) drive timestamp/duration inference and clock skew
/// correction; any other value is opaque to the store and only matched literally by
/// [`crate::QueryRequest`] annotation criteria.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct Annotation {
    timestamp: i64,
    value: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    endpoint: Option<Endpoint>,
}

impl Annotation {
    /// Creates a new `Annotation` at the given microsecond timestamp.
    pub fn new(timestamp: i64, value: &str, endpoint: Option<Endpoint>) -> Annotation {
        Annotation {
            timestamp,
            value: value.to_string(),
            endpoint,
        }
    }

    /// Returns the microsecond timestamp at which the annotated event occurred.
    #[inline]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Returns the value of the annotation.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the endpoint that recorded this annotation, if any.
    #[inline]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fields() {
        let ep = Endpoint::builder().service_name("web").build().unwrap();
        let a = Annotation::new(1_000, SERVER_RECV, Some(ep.clone()));
        assert_eq!(a.timestamp(), 1_000);
        assert_eq!(a.value(), "sr");
        assert_eq!(a.endpoint(), Some(&ep));
    }
}
