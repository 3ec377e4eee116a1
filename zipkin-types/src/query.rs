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

//! Trace search criteria.
use crate::BuildError;
use std::collections::{BTreeMap, BTreeSet};

/// The criteria used to search for traces by a combination of service, timing, and tag
/// constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    service_name: String,
    span_name: Option<String>,
    annotations: BTreeSet<String>,
    binary_annotations: BTreeMap<String, String>,
    min_duration: Option<i64>,
    max_duration: Option<i64>,
    end_ts: i64,
    lookback: i64,
    limit: u32,
}

impl QueryRequest {
    /// Returns a builder used to construct a `QueryRequest`.
    pub fn builder() -> Builder {
        Builder {
            service_name: None,
            span_name: None,
            annotations: BTreeSet::new(),
            binary_annotations: BTreeMap::new(),
            min_duration: None,
            max_duration: None,
            end_ts: None,
            lookback: None,
            limit: 10,
        }
    }

    /// The lowercase service name every matching trace must mention.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// The lowercase span name a matching trace must contain, if set.
    pub fn span_name(&self) -> Option<&str> {
        self.span_name.as_deref()
    }

    /// Annotation values every matching trace must contain (as some span's annotation value).
    pub fn annotations(&self) -> &BTreeSet<String> {
        &self.annotations
    }

    /// String binary annotation key/value pairs every matching trace must contain.
    pub fn binary_annotations(&self) -> &BTreeMap<String, String> {
        &self.binary_annotations
    }

    /// The inclusive lower bound on span duration, in microseconds.
    pub fn min_duration(&self) -> Option<i64> {
        self.min_duration
    }

    /// The inclusive upper bound on span duration, in microseconds.
    pub fn max_duration(&self) -> Option<i64> {
        self.max_duration
    }

    /// The end of the millisecond lookback window (inclusive).
    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    /// The width of the lookback window, in milliseconds.
    pub fn lookback(&self) -> i64 {
        self.lookback
    }

    /// The maximum number of traces to return.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Returns the `[start, end]` microsecond window a root span's timestamp must fall within:
    /// `[(endTs - lookback) * 1000, endTs * 1000]`.
    pub fn micros_window(&self) -> (i64, i64) {
        let end = self.end_ts.saturating_mul(1_000);
        let start = self
            .end_ts
            .saturating_sub(self.lookback)
            .saturating_mul(1_000);
        (start, end)
    }
}

/// A builder for `QueryRequest`s.
pub struct Builder {
    service_name: Option<String>,
    span_name: Option<String>,
    annotations: BTreeSet<String>,
    binary_annotations: BTreeMap<String, String>,
    min_duration: Option<i64>,
    max_duration: Option<i64>,
    end_ts: Option<i64>,
    lookback: Option<i64>,
    limit: u32,
}

impl Builder {
    /// Sets the required service name, lowercasing it.
    pub fn service_name(&mut self, service_name: &str) -> &mut Builder {
        self.service_name = Some(service_name.to_ascii_lowercase());
        self
    }

    /// Sets the optional span name, lowercasing it.
    pub fn span_name(&mut self, span_name: &str) -> &mut Builder {
        self.span_name = Some(span_name.to_ascii_lowercase());
        self
    }

    /// Adds a required annotation value.
    pub fn annotation(&mut self, value: &str) -> &mut Builder {
        self.annotations.insert(value.to_string());
        self
    }

    /// Adds a required string binary annotation key/value pair.
    pub fn binary_annotation(&mut self, key: &str, value: &str) -> &mut Builder {
        self.binary_annotations
            .insert(key.to_string(), value.to_string());
        self
    }

    /// Sets the inclusive minimum span duration, in microseconds.
    pub fn min_duration(&mut self, min_duration: i64) -> &mut Builder {
        self.min_duration = Some(min_duration);
        self
    }

    /// Sets the inclusive maximum span duration, in microseconds.
    pub fn max_duration(&mut self, max_duration: i64) -> &mut Builder {
        self.max_duration = Some(max_duration);
        self
    }

    /// Sets the end of the lookback window, in milliseconds since the epoch.
    pub fn end_ts(&mut self, end_ts: i64) -> &mut Builder {
        self.end_ts = Some(end_ts);
        self
    }

    /// Sets the width of the lookback window, in milliseconds.
    pub fn lookback(&mut self, lookback: i64) -> &mut Builder {
        self.lookback = Some(lookback);
        self
    }

    /// Sets the maximum number of traces to return.
    ///
    /// Defaults to `10`.
    pub fn limit(&mut self, limit: u32) -> &mut Builder {
        self.limit = limit;
        self
    }

    /// Constructs the `QueryRequest`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] if no service name was set, or if `limit` is zero (a negative limit
    /// is the usual rejection reason; a `u32` cannot go negative, so zero is the analogous one
    /// here).
    pub fn build(&self) -> Result<QueryRequest, BuildError> {
        if self.limit == 0 {
            return Err(BuildError("limit must be at least 1"));
        }
        Ok(QueryRequest {
            service_name: self
                .service_name
                .clone()
                .ok_or(BuildError("service name not set"))?,
            span_name: self.span_name.clone(),
            annotations: self.annotations.clone(),
            binary_annotations: self.binary_annotations.clone(),
            min_duration: self.min_duration,
            max_duration: self.max_duration,
            end_ts: self.end_ts.ok_or(BuildError("end_ts not set"))?,
            lookback: self.lookback.unwrap_or(0),
            limit: self.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_service_name_and_positive_limit() {
        assert!(QueryRequest::builder().end_ts(1).build().is_err());
        assert!(QueryRequest::builder()
            .service_name("web")
            .end_ts(1)
            .limit(0)
            .build()
            .is_err());
    }

    #[test]
    fn micros_window_converts_ms_to_us() {
        let q = QueryRequest::builder()
            .service_name("web")
            .end_ts(10)
            .lookback(4)
            .build()
            .unwrap();
        assert_eq!(q.micros_window(), (6_000, 10_000));
    }

    #[test]
    fn service_and_span_names_are_lowercased() {
        let q = QueryRequest::builder()
            .service_name("WEB")
            .span_name("GET")
            .end_ts(1)
            .build()
            .unwrap();
        assert_eq!(q.service_name(), "web");
        assert_eq!(q.span_name(), Some("get"));
    }
}
