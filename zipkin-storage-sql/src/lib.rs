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

//! A relational (PostgreSQL) implementation of [`zipkin_storage::SpanStore`].
//!
//! [`SqlStorage`] persists spans across a two-table schema: a `spans` table holding one row per
//! `(trace_id, id)`, and an `annotations` table holding one row per annotation or binary
//! annotation, merged continuously at write time rather than on read. Trace search
//! (`get_traces`) translates a [`zipkin_types::QueryRequest`] into a dynamically constructed
//! multi-self-join query over `annotations`.
#![warn(missing_docs)]

mod config;
mod schema;
mod store;

pub use config::SqlStorageConfig;
pub use schema::{CREATE_ANNOTATIONS_TABLE, CREATE_SPANS_TABLE};
pub use store::SqlStorage;
