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

//! An in-process span store, suited to tests and development.
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use zipkin_types::{span, DependencyLink, QueryRequest, Span};

use crate::dependency_linker::link_dependencies;
use crate::merge::merge_by_id;
use crate::normalize::apply_timestamp_and_duration;
use crate::query_matcher;
use crate::skew::correct_clock_skew;
use crate::{SpanStore, StorageError};

/// A `(trace_id, timestamp)` pair ordered by timestamp descending, trace id ascending.
///
/// This is the comparator the service→trace index is keyed by: iterating a
/// `BTreeSet<TraceTimestamp>` in its natural order yields the most recent traces first, with ties
/// broken deterministically so that the set still dedupes an identical `(trace_id, timestamp)`
/// pair inserted twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TraceTimestamp {
    trace_id: i64,
    timestamp: i64,
}

impl Ord for TraceTimestamp {
    fn cmp(&self, other: &TraceTimestamp) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| self.trace_id.cmp(&other.trace_id))
    }
}

impl PartialOrd for TraceTimestamp {
    fn partial_cmp(&self, other: &TraceTimestamp) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Inner {
    trace_index: HashMap<i64, Vec<Span>>,
    service_to_traces: HashMap<String, BTreeSet<TraceTimestamp>>,
    service_to_span_names: HashMap<String, BTreeSet<String>>,
    accepted_span_count: u64,
}

/// An in-memory implementation of [`SpanStore`].
///
/// Three indexes are kept mutually consistent under a single mutex: `trace_id → spans` in
/// insertion order, `service_name → (trace_id, timestamp)` sorted with the most recent trace
/// first, and `service_name → span names`. A query never observes one index updated without the
/// others, because all three are mutated while the same lock is held.
#[derive(Default)]
pub struct InMemoryStorage {
    inner: Mutex<Inner>,
}

impl InMemoryStorage {
    /// Creates an empty store.
    pub fn new() -> InMemoryStorage {
        InMemoryStorage::default()
    }

    /// Returns the total number of spans ever passed to [`SpanStore::accept`], counting
    /// duplicates before merge.
    pub fn accepted_span_count(&self) -> u64 {
        self.inner.lock().unwrap().accepted_span_count
    }
}

#[async_trait]
impl SpanStore for InMemoryStorage {
    async fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        for span in spans {
            let span = apply_timestamp_and_duration(span);
            let trace_id = span.trace_id();
            let timestamp = span.timestamp().unwrap_or(i64::MIN);

            for service in span.service_names() {
                inner
                    .service_to_traces
                    .entry(service.to_string())
                    .or_default()
                    .insert(TraceTimestamp { trace_id, timestamp });
                if let Some(name) = span.name() {
                    if !name.is_empty() {
                        inner
                            .service_to_span_names
                            .entry(service.to_string())
                            .or_default()
                            .insert(name.to_string());
                    }
                }
            }

            inner.trace_index.entry(trace_id).or_default().push(span);
            inner.accepted_span_count += 1;
        }
        log::trace!(
            "accepted batch; {} spans accepted total",
            inner.accepted_span_count
        );
        Ok(())
    }

    async fn get_traces(&self, request: &QueryRequest) -> Result<Vec<Vec<Span>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let limit = request.limit() as usize;
        let mut results = Vec::new();
        let mut seen = std::collections::HashSet::new();

        if let Some(candidates) = inner.service_to_traces.get(request.service_name()) {
            for candidate in candidates {
                if results.len() >= limit {
                    break;
                }
                if !seen.insert(candidate.trace_id) {
                    continue;
                }
                let raw = match inner.trace_index.get(&candidate.trace_id) {
                    Some(raw) => raw.clone(),
                    None => continue,
                };
                let trace = correct_clock_skew(merge_by_id(raw));
                if query_matcher::matches(request, &trace) {
                    results.push(trace);
                }
            }
        }

        results.sort_by(|a, b| span::cmp_traces_by_root(&a[0], &b[0]));
        Ok(results)
    }

    async fn get_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .trace_index
            .get(&trace_id)
            .map(|raw| correct_clock_skew(merge_by_id(raw.clone()))))
    }

    async fn get_raw_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.trace_index.get(&trace_id).cloned())
    }

    async fn get_service_names(&self) -> Result<Vec<String>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner.service_to_traces.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get_span_names(&self, service_name: &str) -> Result<Vec<String>, StorageError> {
        let service_name = service_name.to_ascii_lowercase();
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .service_to_span_names
            .get(&service_name)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_dependencies(
        &self,
        end_ts: i64,
        lookback: Option<i64>,
    ) -> Result<Vec<DependencyLink>, StorageError> {
        let inner = self.inner.lock().unwrap();
        let end = end_ts.saturating_mul(1_000);
        let start = match lookback {
            Some(lookback) => end_ts.saturating_sub(lookback).saturating_mul(1_000),
            None => i64::MIN,
        };

        let traces: Vec<Vec<Span>> = inner
            .trace_index
            .values()
            .map(|raw| correct_clock_skew(merge_by_id(raw.clone())))
            .filter(|trace| {
                trace
                    .first()
                    .and_then(Span::timestamp)
                    .is_some_and(|ts| ts >= start && ts <= end)
            })
            .collect();

        Ok(link_dependencies(traces.iter().map(Vec::as_slice)))
    }
}
