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

//! A span store for Zipkin-style distributed traces.
//!
//! This crate defines the [`SpanStore`] trait shared by every backend and ships
//! [`InMemoryStorage`], an in-process implementation suited to tests and development. A
//! persistent, relational implementation lives in the separate `zipkin-storage-sql` crate, which
//! depends on this one with the `sql` feature enabled.
//!
//! The write path ([`SpanStore::accept`]) normalizes each span's timestamp and duration from its
//! annotations (see [`normalize`]) before indexing it. The read path reassembles a trace by
//! merging partially-reported copies of the same span ([`merge`]) and correcting for clock skew
//! between the hosts that reported it ([`skew`]). [`query_matcher`] evaluates a
//! [`zipkin_types::QueryRequest`] against a reconstructed trace, and [`dependency_linker`] derives
//! service-to-service call edges from a collection of traces.
#![warn(missing_docs)]

pub mod dependency_linker;
pub mod error;
pub mod in_memory;
pub mod merge;
pub mod normalize;
pub mod query_matcher;
pub mod skew;

#[doc(inline)]
pub use error::StorageError;
#[doc(inline)]
pub use in_memory::InMemoryStorage;

use async_trait::async_trait;
use zipkin_types::{DependencyLink, QueryRequest, Span};

/// The read and write surface shared by every span store backend.
///
/// Both [`InMemoryStorage`] and the relational store in `zipkin-storage-sql` implement this
/// trait; callers select a backend at construction time rather than through inheritance. The
/// trait is `async` because the relational backend's only suspension points are database round
/// trips; the in-memory backend's implementation never actually awaits anything; it behaves as a
/// synchronous call wrapped in an already-completed future.
#[async_trait]
pub trait SpanStore: Send + Sync {
    /// Normalizes and indexes a batch of spans.
    ///
    /// Accepts a batch of any size, including empty. Returns once every span in the batch is
    /// durably placed (committed, for the relational backend) or reports a single error
    /// describing the first failure; partial success within a batch is never exposed.
    async fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError>;

    /// Returns every stored trace matching `request`, most recent first.
    async fn get_traces(&self, request: &QueryRequest) -> Result<Vec<Vec<Span>>, StorageError>;

    /// Returns the merged, clock-skew-corrected trace for `trace_id`, or `None` if unknown.
    async fn get_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError>;

    /// Returns the unmerged spans stored for `trace_id` exactly as accepted, or `None` if unknown.
    async fn get_raw_trace(&self, trace_id: i64) -> Result<Option<Vec<Span>>, StorageError>;

    /// Returns every service name mentioned by a stored span's endpoints, ascending.
    async fn get_service_names(&self) -> Result<Vec<String>, StorageError>;

    /// Returns every span name recorded for `service_name`, ascending. The input is
    /// case-normalized before lookup.
    async fn get_span_names(&self, service_name: &str) -> Result<Vec<String>, StorageError>;

    /// Derives service dependency links from every trace whose root falls in the window
    /// `[(end_ts - lookback) * 1000, end_ts * 1000]` microseconds, or with no lower bound at all
    /// when `lookback` is `None`.
    async fn get_dependencies(
        &self,
        end_ts: i64,
        lookback: Option<i64>,
    ) -> Result<Vec<DependencyLink>, StorageError>;
}
